//! Session event types.
//!
//! These are the messages carried by the process-wide session channel:
//! - `AuthError` - a request failed with credentials that are invalid (not merely stale)
//! - `SessionExpired` - session renewal failed; the session is over
//! - `TokenRefreshed` - the refresh endpoint renewed the session
//! - `LoggedIn` / `LoggedOut` - explicit user actions

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// A 401 without the expired-token marker; forces logout
    AuthError,
    /// Renewal failed or a replayed request was still rejected
    SessionExpired,
    /// The session was renewed by the refresh endpoint
    TokenRefreshed,
    /// A login attempt completed
    LoggedIn,
    /// The user ended the session
    LoggedOut,
}

impl SessionEventKind {
    /// Returns the string representation of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::AuthError => "auth_error",
            SessionEventKind::SessionExpired => "session_expired",
            SessionEventKind::TokenRefreshed => "token_refreshed",
            SessionEventKind::LoggedIn => "logged_in",
            SessionEventKind::LoggedOut => "logged_out",
        }
    }

    /// Whether this event ends the current session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEventKind::AuthError | SessionEventKind::SessionExpired
        )
    }
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    /// Server-provided or local explanation, if any
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind) -> Self {
        Self {
            kind,
            reason: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn auth_error(reason: impl Into<String>) -> Self {
        Self::new(SessionEventKind::AuthError).with_reason(reason)
    }

    pub fn session_expired(reason: impl Into<String>) -> Self {
        Self::new(SessionEventKind::SessionExpired).with_reason(reason)
    }

    pub fn token_refreshed() -> Self {
        Self::new(SessionEventKind::TokenRefreshed)
    }

    pub fn logged_in() -> Self {
        Self::new(SessionEventKind::LoggedIn)
    }

    pub fn logged_out() -> Self {
        Self::new(SessionEventKind::LoggedOut)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        assert!(SessionEventKind::AuthError.is_terminal());
        assert!(SessionEventKind::SessionExpired.is_terminal());
        assert!(!SessionEventKind::TokenRefreshed.is_terminal());
        assert!(!SessionEventKind::LoggedOut.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::session_expired("refresh rejected");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "session_expired");
        assert_eq!(json["reason"], "refresh rejected");
    }
}
