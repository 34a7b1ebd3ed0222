//! Email dispatch tool — the one capability with real-world side effects.
//!
//! The transport endpoint comes from the process environment, resolved at
//! execution time: a missing `SMTP_HOST` degrades this tool (the agent gets
//! an error result naming the variable, and can still report the problem in
//! its final text) instead of blocking the whole run. Exactly one send
//! attempt per invocation — no automatic retry, since a retried email is a
//! duplicate email.

use async_trait::async_trait;
use attache_core::tool::{Tool, ToolCall, ToolResult};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM: &str = "attache@localhost";
const SEND_TIMEOUT_SECS: u64 = 30;

/// SMTP transport settings, sourced from the process environment.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_SMTP_PORT,
            user: None,
            password: None,
            from_email: None,
        }
    }
}

impl SmtpConfig {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`, and
    /// `FROM_EMAIL` from the environment.
    pub fn from_env() -> Self {
        Self {
            host: env_nonempty("SMTP_HOST"),
            port: env_nonempty("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            user: env_nonempty("SMTP_USER"),
            password: env_nonempty("SMTP_PASSWORD"),
            from_email: env_nonempty("FROM_EMAIL"),
        }
    }

    /// The From address: explicit, else the SMTP user, else a fixed default.
    pub fn from_address(&self) -> String {
        self.from_email
            .clone()
            .or_else(|| self.user.clone())
            .unwrap_or_else(|| DEFAULT_FROM.into())
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from_email", &self.from_email)
            .finish()
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Sends an HTML email over SMTP.
pub struct EmailSendTool {
    config: SmtpConfig,
}

impl EmailSendTool {
    /// Build with transport settings from the environment.
    pub fn from_env() -> Self {
        Self::new(SmtpConfig::from_env())
    }

    /// Build with explicit settings (tests).
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for EmailSendTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send an email via SMTP. Use this to send reminder emails with formatted HTML content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Recipient email address"
                },
                "subject": {
                    "type": "string",
                    "description": "Email subject line"
                },
                "body_html": {
                    "type": "string",
                    "description": "Email body as HTML"
                }
            },
            "required": ["to", "subject", "body_html"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args = &call.arguments;
        let Some(to) = args["to"].as_str().filter(|s| !s.is_empty()) else {
            return ToolResult::error(&call.id, "Missing 'to' argument");
        };
        let Some(subject) = args["subject"].as_str() else {
            return ToolResult::error(&call.id, "Missing 'subject' argument");
        };
        let Some(body_html) = args["body_html"].as_str() else {
            return ToolResult::error(&call.id, "Missing 'body_html' argument");
        };

        // Resolve the endpoint before touching the network
        let Some(host) = self.config.host.clone() else {
            return ToolResult::error(
                &call.id,
                "SMTP configuration incomplete: SMTP_HOST is not set. \
                 Set SMTP_HOST (and SMTP_USER / SMTP_PASSWORD for an \
                 authenticated relay) in the environment.",
            );
        };

        let from = self.config.from_address();

        let message = match build_message(&from, to, subject, body_html) {
            Ok(m) => m,
            Err(reason) => return ToolResult::error(&call.id, reason),
        };

        let transport = match build_transport(&self.config, &host) {
            Ok(t) => t,
            Err(reason) => return ToolResult::error(&call.id, reason),
        };

        // One attempt, no retry
        match transport.send(message).await {
            Ok(_) => {
                info!(to, subject, "Email sent");
                ToolResult::ok(
                    &call.id,
                    format!("Email sent successfully to {to} with subject: {subject}"),
                )
            }
            Err(e) => {
                warn!(to, error = %e, "Email send failed");
                ToolResult::error(&call.id, format!("Failed to send email: {e}"))
            }
        }
    }
}

fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    body_html: &str,
) -> Result<Message, String> {
    let from_mailbox: lettre::message::Mailbox = from
        .parse()
        .map_err(|e| format!("invalid From address \"{from}\": {e}"))?;
    let to_mailbox: lettre::message::Mailbox = to
        .parse()
        .map_err(|e| format!("invalid To address \"{to}\": {e}"))?;

    Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(body_html.to_string())
        .map_err(|e| format!("failed to build MIME message: {e}"))
}

/// STARTTLS with authentication when credentials are present; plaintext
/// for unauthenticated local relays otherwise.
fn build_transport(
    config: &SmtpConfig,
    host: &str,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
    let timeout = Some(std::time::Duration::from_secs(SEND_TIMEOUT_SECS));

    match (&config.user, &config.password) {
        (Some(user), Some(password)) => {
            let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| format!("SMTP transport setup failed for {host}: {e}"))?;
            Ok(builder
                .port(config.port)
                .credentials(Credentials::new(user.clone(), password.clone()))
                .timeout(timeout)
                .build())
        }
        _ => Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(config.port)
                .timeout(timeout)
                .build(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: "send_email".into(),
            arguments: args,
        }
    }

    fn full_args() -> serde_json::Value {
        serde_json::json!({
            "to": "me@example.com",
            "subject": "Daily summary",
            "body_html": "<h1>Today</h1>"
        })
    }

    #[test]
    fn from_address_fallback_chain() {
        let explicit = SmtpConfig {
            from_email: Some("assistant@example.com".into()),
            user: Some("smtp-user@example.com".into()),
            ..Default::default()
        };
        assert_eq!(explicit.from_address(), "assistant@example.com");

        let from_user = SmtpConfig {
            user: Some("smtp-user@example.com".into()),
            ..Default::default()
        };
        assert_eq!(from_user.from_address(), "smtp-user@example.com");

        let fixed = SmtpConfig::default();
        assert_eq!(fixed.from_address(), DEFAULT_FROM);
    }

    #[test]
    fn debug_redacts_password() {
        let config = SmtpConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn missing_host_names_the_variable_without_network() {
        let tool = EmailSendTool::new(SmtpConfig::default());
        let result = tool.execute(&call(full_args())).await;

        assert!(result.is_error);
        assert!(result.output.contains("SMTP_HOST"));
    }

    #[tokio::test]
    async fn missing_arguments_are_error_results() {
        let tool = EmailSendTool::new(SmtpConfig {
            host: Some("smtp.example.com".into()),
            ..Default::default()
        });

        let result = tool
            .execute(&call(serde_json::json!({"subject": "s", "body_html": "b"})))
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("to"));

        let result = tool
            .execute(&call(serde_json::json!({"to": "me@example.com"})))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn invalid_recipient_is_error_result() {
        let tool = EmailSendTool::new(SmtpConfig {
            host: Some("smtp.example.com".into()),
            ..Default::default()
        });

        let result = tool
            .execute(&call(serde_json::json!({
                "to": "not an address",
                "subject": "s",
                "body_html": "b"
            })))
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("To address"));
    }

    #[tokio::test]
    async fn transport_failure_is_error_result_not_panic() {
        // Nothing listens on this port; the single attempt must come back
        // as an error result carrying the underlying message.
        let tool = EmailSendTool::new(SmtpConfig {
            host: Some("127.0.0.1".into()),
            port: 1,
            ..Default::default()
        });

        let result = tool.execute(&call(full_args())).await;
        assert!(result.is_error);
        assert!(result.output.contains("Failed to send email"));
    }

    #[test]
    fn schema_declares_external_names() {
        let tool = EmailSendTool::new(SmtpConfig::default());
        let schema = tool.parameters_schema();
        assert_eq!(
            schema["required"],
            serde_json::json!(["to", "subject", "body_html"])
        );
    }

    #[test]
    fn message_builds_with_html_body() {
        let message = build_message(
            "assistant@example.com",
            "me@example.com",
            "Daily summary",
            "<h1>Today</h1>",
        )
        .unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: Daily summary"));
        assert!(formatted.contains("text/html"));
    }
}
