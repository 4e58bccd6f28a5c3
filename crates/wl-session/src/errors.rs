use reqwest::StatusCode;
use thiserror::Error;

/// Session and API error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: StatusCode,
        body_snippet: String,
    },

    /// Access token rejected. Recovered by the refresh protocol, callers only
    /// see it from the public (unauthenticated) endpoints.
    #[error("Unauthorized - access token rejected")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Please verify your email address first")]
    EmailNotVerified,

    #[error("Your account is blocked, contact administrator")]
    AccountBlocked,

    #[error("Session expired: {0}")]
    SessionExpired(#[from] FatalSession),

    #[error("User cancelled the passphrase prompt")]
    UserCancelled,

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Credential store is corrupted or was sealed with another key")]
    CorruptedStore,

    #[error("Credential store is locked by another process")]
    LockTimeout,
}

impl SessionError {
    /// Build an `Http` error, keeping only the head of the body
    pub fn http(status: StatusCode, body: &str) -> Self {
        Self::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }

    /// True for errors that invalidated the whole session
    pub fn is_fatal_session(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::AccountBlocked)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Self::Network(e) => e.status(),
            _ => None,
        }
    }
}

/// Why a session could not be recovered.
///
/// Clonable so that every request parked behind one refresh receives a copy of
/// the same rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalSession {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    #[error("refresh rejected with status {0}")]
    RefreshRejected(StatusCode),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh response was malformed: {0}")]
    MalformedRefresh(String),

    #[error("request was still unauthorized after refreshing")]
    RetryRejected,

    #[error("session was torn down while refreshing")]
    TornDown,

    #[error("refresh was abandoned before it settled")]
    Abandoned,
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_truncates_body() {
        let body = "x".repeat(500);
        let err = SessionError::http(StatusCode::BAD_REQUEST, &body);
        match err {
            SessionError::Http { status, body_snippet } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body_snippet.len(), 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fatal_classification() {
        assert!(SessionError::from(FatalSession::RetryRejected).is_fatal_session());
        assert!(SessionError::AccountBlocked.is_fatal_session());
        assert!(!SessionError::InvalidCredentials.is_fatal_session());
        assert!(!SessionError::http(StatusCode::NOT_FOUND, "").is_fatal_session());
    }

    #[test]
    fn blocked_message_is_distinct() {
        assert_eq!(
            SessionError::AccountBlocked.to_string(),
            "Your account is blocked, contact administrator"
        );
        assert_ne!(
            SessionError::AccountBlocked.to_string(),
            SessionError::InvalidCredentials.to_string()
        );
    }
}
