//! OAuth credential store for the calendar API.
//!
//! The token lifecycle has four branches, tried in order:
//! 1. stored token still valid → reuse, no disk write
//! 2. expired with a refresh token → one refresh attempt, persist on success
//! 3. refresh failed or impossible → interactive consent flow, persist
//! 4. no client-secret artifact for the consent flow → fatal, never retried
//!
//! The whole read-refresh-persist sequence runs under a mutex so two
//! consumers in one process cannot race a refresh. Persistence is
//! write-then-rename so a crash never leaves a truncated token file.

use crate::error::AuthError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Read-only calendar scope. If this changes, delete token.json.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Treat tokens expiring within this margin as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

const TOKEN_TIMEOUT_SECS: u64 = 30;

/// A persisted authorization: access token, optional refresh token, expiry,
/// plus the client identity needed to refresh without re-reading the
/// client-secret artifact.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Whether the access token is still usable at `now`.
    /// A credential without an expiry marker is assumed valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            None => true,
            Some(expiry) => expiry > now + Duration::seconds(EXPIRY_SKEW_SECS),
        }
    }

    /// Whether an expired credential can be refreshed without user action.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// The provisioned client-secret document ("Desktop app" shape).
#[derive(Debug, Deserialize)]
struct ClientSecret {
    installed: InstalledApp,
}

#[derive(Debug, Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
}

/// Response from the token endpoint (refresh or code exchange).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Persists and validates the calendar authorization token.
pub struct CredentialStore {
    credentials_path: PathBuf,
    token_path: PathBuf,
    http: reqwest::Client,
    guard: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    /// Create a store over the given artifact and token paths.
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            http,
            guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Where the token file lives.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Obtain a usable credential, refreshing or reauthorizing as needed.
    ///
    /// Never returns an expired credential. Exactly one token-file write
    /// happens per call that changed on-disk state.
    pub async fn obtain(&self) -> Result<Credential, AuthError> {
        self.obtain_at(Utc::now()).await
    }

    /// Like `obtain`, with an injectable clock for tests.
    pub async fn obtain_at(&self, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let _guard = self.guard.lock().await;

        if let Some(stored) = self.load_token() {
            if stored.is_valid_at(now) {
                return Ok(stored);
            }

            if stored.can_refresh() {
                match self.refresh(&stored, now).await {
                    Ok(fresh) => {
                        self.persist(&fresh)?;
                        info!("Refreshed calendar access token");
                        return Ok(fresh);
                    }
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed, falling back to interactive authorization");
                    }
                }
            }
        }

        let fresh = self.interactive_flow(now).await?;
        self.persist(&fresh)?;
        info!("Stored new calendar authorization");
        Ok(fresh)
    }

    /// Load the persisted token, if any. A corrupt file is treated as
    /// absent (the flow falls through to reauthorization), not as fatal.
    fn load_token(&self) -> Option<Credential> {
        if !self.token_path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&self.token_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.token_path.display(), error = %e, "Could not read token file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(cred) => Some(cred),
            Err(e) => {
                warn!(path = %self.token_path.display(), error = %e, "Token file is corrupt, reauthorizing");
                None
            }
        }
    }

    /// Write the credential atomically: temp file in the same directory,
    /// then rename over the target.
    fn persist(&self, cred: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("creating {}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string_pretty(cred)
            .map_err(|e| AuthError::Storage(format!("serializing token: {e}")))?;

        let tmp = self.token_path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| AuthError::Storage(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.token_path).map_err(|e| {
            AuthError::Storage(format!("renaming into {}: {e}", self.token_path.display()))
        })?;

        Ok(())
    }

    /// Exactly one refresh attempt against the token endpoint.
    async fn refresh(&self, cred: &Credential, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let refresh_token = cred
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Token("no refresh token".into()))?;

        let params = [
            ("client_id", cred.client_id.as_str()),
            ("client_secret", cred.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&cred.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Token(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Token(format!(
                "refresh rejected (status {status}): {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Token(format!("parsing token response: {e}")))?;

        Ok(Credential {
            access_token: token.access_token,
            // Google only returns the refresh token on first authorization
            refresh_token: token.refresh_token.or_else(|| cred.refresh_token.clone()),
            expiry: token.expires_in.map(|secs| now + Duration::seconds(secs)),
            token_uri: cred.token_uri.clone(),
            client_id: cred.client_id.clone(),
            client_secret: cred.client_secret.clone(),
            scopes: cred.scopes.clone(),
        })
    }

    fn load_client_secret(&self) -> Result<InstalledApp, AuthError> {
        if !self.credentials_path.exists() {
            return Err(AuthError::MissingClientSecret {
                path: self.credentials_path.clone(),
            });
        }

        let content = std::fs::read_to_string(&self.credentials_path).map_err(|e| {
            AuthError::Storage(format!("reading {}: {e}", self.credentials_path.display()))
        })?;

        let secret: ClientSecret = serde_json::from_str(&content).map_err(|e| {
            AuthError::Storage(format!("parsing {}: {e}", self.credentials_path.display()))
        })?;

        Ok(secret.installed)
    }

    /// Out-of-band consent flow: bind a loopback listener, print the
    /// consent URL, block until the browser redirect delivers a code, then
    /// exchange it. No timeout — this waits on a human.
    async fn interactive_flow(&self, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let app = self.load_client_secret()?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Flow(format!("binding loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Flow(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}");

        let auth_url = reqwest::Url::parse_with_params(
            &app.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", app.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", CALENDAR_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AuthError::Flow(format!("building consent URL: {e}")))?;

        eprintln!();
        eprintln!("Open this URL in your browser to authorize calendar access:");
        eprintln!();
        eprintln!("  {auth_url}");
        eprintln!();

        let code = wait_for_code(&listener).await?;

        let params = [
            ("code", code.as_str()),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&app.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Token(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Token(format!(
                "code exchange rejected (status {status}): {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Token(format!("parsing token response: {e}")))?;

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expiry: token.expires_in.map(|secs| now + Duration::seconds(secs)),
            token_uri: app.token_uri,
            client_id: app.client_id,
            client_secret: app.client_secret,
            scopes: vec![CALENDAR_SCOPE.to_string()],
        })
    }
}

/// Accept loopback connections until one carries an authorization code,
/// answer the browser, and return the code.
async fn wait_for_code(listener: &TcpListener) -> Result<String, AuthError> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| AuthError::Flow(format!("accepting redirect: {e}")))?;

        let mut buf = vec![0u8; 4096];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| AuthError::Flow(format!("reading redirect: {e}")))?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let Some(target) = request.split_whitespace().nth(1) else {
            continue;
        };

        if let Some(error) = query_param(target, "error") {
            let _ = stream
                .write_all(http_response("Authorization was denied. You may close this window.").as_bytes())
                .await;
            return Err(AuthError::Flow(format!("authorization denied: {error}")));
        }

        if let Some(code) = query_param(target, "code") {
            let _ = stream
                .write_all(http_response("Authorization complete. You may close this window.").as_bytes())
                .await;
            return Ok(code);
        }

        // Favicon probes and the like — answer and keep waiting
        let _ = stream.write_all(http_response("Waiting for authorization...").as_bytes()).await;
    }
}

fn http_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Extract and percent-decode a query parameter from a request target.
fn query_param(target: &str, name: &str) -> Option<String> {
    let query = target.split_once('?')?.1;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            return Some(percent_decode(value));
        }
    }
    None
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
