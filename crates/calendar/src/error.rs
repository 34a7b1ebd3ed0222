//! Error types for the calendar bounded context.

use std::path::PathBuf;
use thiserror::Error;

/// Failures acquiring or refreshing the calendar credential.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provisioned client-secret artifact is absent. Fatal and never
    /// retried — the message names the artifact and where it belongs.
    #[error(
        "credentials.json not found at {path}. Set up an OAuth client \
         (Desktop app) in the Google Cloud console, download the client \
         secret JSON, and save it there."
    )]
    MissingClientSecret { path: PathBuf },

    #[error("Token endpoint request failed: {0}")]
    Token(String),

    #[error("Interactive authorization failed: {0}")]
    Flow(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Failures fetching calendar data. Callers of `fetch_window` never see
/// these — the client degrades to an empty result — but `try_fetch`
/// exposes them for tests and for distinct operator logging.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Calendar auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Calendar API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Calendar network error: {0}")]
    Network(String),

    /// The response did not have the expected shape — likely a bug or an
    /// API change, not an outage. Logged separately from the above.
    #[error("Unexpected calendar response shape: {0}")]
    Shape(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_client_secret_names_path() {
        let err = AuthError::MissingClientSecret {
            path: PathBuf::from("/home/user/.attache/credentials.json"),
        };
        let msg = err.to_string();
        assert!(msg.contains("credentials.json"));
        assert!(msg.contains("/home/user/.attache/credentials.json"));
    }

    #[test]
    fn api_error_carries_status() {
        let err = CalendarError::Api {
            status: 403,
            message: "insufficient scope".into(),
        };
        assert!(err.to_string().contains("403"));
    }
}
