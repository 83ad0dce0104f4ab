//! Session lifecycle events, broadcast to anyone watching a session (e.g. a
//! kernel-policy installer or a CLI status feed).

use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A notable change in a session's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// ModeCfg (or the Phase-1 it rides on) completed; `session_id` is now
    /// usable for Phase-2 negotiation.
    Established { session_id: u64 },
    /// The peer failed to answer within the retransmit budget.
    PeerDead { session_id: u64 },
    /// The session was torn down, whether by peer request or locally.
    Deleted { session_id: u64 },
    /// A ModeCfg exchange applied a new `InternalAddress` to the session's
    /// connection.
    ModeCfgApplied { session_id: u64 },
}

/// Thin wrapper around a `broadcast::Sender` so callers don't need to spell
/// out the channel type or handle the "no subscribers" error, which is
/// routine rather than exceptional here.
#[derive(Debug, Clone)]
pub struct SessionEventSender(broadcast::Sender<SessionEvent>);

impl SessionEventSender {
    pub fn new() -> (Self, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        (Self(tx), rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.0.subscribe()
    }

    /// Publishes `event`. A `SendError` here just means nobody is currently
    /// subscribed, which is not a failure worth propagating.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.0.send(event);
    }
}

impl Default for SessionEventSender {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let (tx, mut rx) = SessionEventSender::new();
        tx.publish(SessionEvent::Established { session_id: 1 });
        let event = rx.recv().await.unwrap();
        assert_eq!(event, SessionEvent::Established { session_id: 1 });
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let sender = SessionEventSender::default();
        sender.publish(SessionEvent::Deleted { session_id: 7 });
    }
}
