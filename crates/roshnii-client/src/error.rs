use thiserror::Error;

/// Errors surfaced by the client layer.
///
/// Only `AuthExpired` is resolved internally (by the refresh coordinator);
/// every other variant reaches the caller unchanged. The type is `Clone` so
/// one de-duplicated fetch can hand the same outcome to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure, no response received
    #[error("Network error: {0}")]
    Network(String),

    /// 401 carrying the expired-token marker; the session needs renewal
    #[error("Authentication expired")]
    AuthExpired,

    /// Renewal failed, or a replayed request was rejected again
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// 401 without the expired-token marker: credentials are invalid
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// 4xx other than 401
    #[error("Request rejected (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    /// 5xx
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Success status but the body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built (bad id, bad content type)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Builds the error for a non-2xx, non-401 status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 {
            Self::Server { status, message }
        } else {
            Self::Validation { status, message }
        }
    }

    /// HTTP status behind the error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired | Self::SessionExpired | Self::Unauthorized { .. } => Some(401),
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) | Self::InvalidRequest(_) | Self::Config(_) => None,
        }
    }

    /// Errors that end the current session.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthExpired | Self::SessionExpired | Self::Unauthorized { .. }
        )
    }

    /// Eligible for a manual, user-triggered retry. Never retried silently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Network(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::AuthExpired => ErrorKind::AuthExpired,
            Self::SessionExpired | Self::Unauthorized { .. } => ErrorKind::SessionExpired,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Server { .. } => ErrorKind::Server,
            Self::Decode(_) | Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::Client,
        }
    }
}

/// Error categories for logging and user-facing classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    AuthExpired,
    SessionExpired,
    Validation,
    Server,
    Client,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Validation => "validation",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_splits_client_and_server() {
        assert!(matches!(
            ApiError::from_status(404, "not found"),
            ApiError::Validation { status: 404, .. }
        ));
        assert!(matches!(
            ApiError::from_status(503, "down"),
            ApiError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_classification() {
        assert!(ApiError::SessionExpired.is_auth_failure());
        assert!(
            ApiError::Unauthorized {
                message: "bad".into()
            }
            .is_auth_failure()
        );
        assert!(!ApiError::network("reset").is_auth_failure());

        assert!(ApiError::from_status(500, "x").is_retryable());
        assert!(!ApiError::from_status(400, "x").is_retryable());
        assert!(!ApiError::SessionExpired.is_retryable());
    }

    #[test]
    fn test_kind_and_status() {
        assert_eq!(ApiError::AuthExpired.kind(), ErrorKind::AuthExpired);
        assert_eq!(
            ApiError::Unauthorized {
                message: "x".into()
            }
            .kind(),
            ErrorKind::SessionExpired
        );
        assert_eq!(ApiError::from_status(422, "x").status(), Some(422));
        assert_eq!(ApiError::network("x").status(), None);
    }
}
