//! Process-wide session event channel.
//!
//! The HTTP layer publishes here instead of calling into the session state
//! machine directly; any number of observers subscribe independently.

use tokio::sync::broadcast;

use super::types::SessionEvent;

/// Events a lagging receiver may fall behind by before it skips the oldest.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Fan-out of [`SessionEvent`]s. Clones publish into the same channel.
///
/// ```
/// use roshnii_core::events::{SessionEvent, SessionEventBroadcaster};
///
/// let events = SessionEventBroadcaster::new();
/// let _rx = events.subscribe();
/// assert_eq!(events.send(SessionEvent::auth_error("invalid token")), 1);
/// ```
#[derive(Clone)]
pub struct SessionEventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event`, returning how many receivers got it.
    pub fn send(&self, event: SessionEvent) -> usize {
        tracing::debug!(kind = %event.kind, reason = ?event.reason, "session event");
        self.sender.send(event).unwrap_or_default()
    }

    /// Receives only events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEventBroadcaster")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEventKind;

    #[test]
    fn test_send_without_receivers() {
        let events = SessionEventBroadcaster::new();
        assert_eq!(events.receiver_count(), 0);
        assert_eq!(events.send(SessionEvent::logged_out()), 0);
    }

    #[tokio::test]
    async fn test_every_receiver_sees_the_event() {
        let events = SessionEventBroadcaster::new();
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        assert_eq!(events.send(SessionEvent::session_expired("refresh failed")), 2);
        assert_eq!(first.recv().await.unwrap().kind, SessionEventKind::SessionExpired);
        assert_eq!(
            second.recv().await.unwrap().reason.as_deref(),
            Some("refresh failed")
        );
    }

    #[tokio::test]
    async fn test_lagging_receiver_skips_oldest() {
        let events = SessionEventBroadcaster::with_capacity(2);
        let mut rx = events.subscribe();
        events.send(SessionEvent::auth_error("first"));
        events.send(SessionEvent::auth_error("second"));
        events.send(SessionEvent::auth_error("third"));

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().reason.as_deref(), Some("second"));
    }

    #[test]
    fn test_clones_share_channel() {
        let events = SessionEventBroadcaster::new();
        let other = events.clone();
        let _rx = events.subscribe();
        assert_eq!(other.receiver_count(), 1);
    }
}
