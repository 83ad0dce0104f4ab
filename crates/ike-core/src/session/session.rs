use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::collaborators::{SessionKeys, SkeyidA};
use crate::connection::Connection;
use crate::event::{SessionEvent, SessionEventSender};
use crate::modecfg::ModeCfgState;
use crate::timing::TimingPolicy;

use super::manager::Transport;
use super::retransmit::RetransmitState;
use super::state::SessionState;

/// One IKE session (spec.md §3 "Session"): the cookie pair that identifies
/// it on the wire, the connection it was matched against, and the mutable
/// state the retransmission engine and ModeCfg sub-exchange drive.
pub struct Session {
    pub id: u64,
    pub icookie: [u8; 8],
    pub rcookie: [u8; 8],
    pub connection: Arc<Connection>,
    pub(crate) transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
    modecfg_state: Mutex<ModeCfgState>,
    next_msgid: AtomicU32,
    pub(crate) retransmit: Mutex<RetransmitState>,
    last_traffic: Mutex<Instant>,
    created_at: Instant,
    keys: Mutex<Option<(SkeyidA, SessionKeys)>>,
    events: SessionEventSender,
}

impl Session {
    pub fn new(
        id: u64,
        icookie: [u8; 8],
        rcookie: [u8; 8],
        connection: Arc<Connection>,
        transport: Arc<dyn Transport>,
        events: SessionEventSender,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            icookie,
            rcookie,
            connection,
            transport,
            state: Mutex::new(SessionState::HalfOpen),
            modecfg_state: Mutex::new(ModeCfgState::Idle),
            next_msgid: AtomicU32::new(1),
            retransmit: Mutex::new(RetransmitState::default()),
            last_traffic: Mutex::new(now),
            created_at: now,
            keys: Mutex::new(None),
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn modecfg_state(&self) -> ModeCfgState {
        *self.modecfg_state.lock()
    }

    pub fn set_modecfg_state(&self, state: ModeCfgState) {
        *self.modecfg_state.lock() = state;
    }

    /// Allocates the next `message_id` for an outgoing exchange on this
    /// session (spec.md §4.4 step 1). IDs are unique per session, never
    /// reused, and never zero (reserved for Phase-1 messages).
    pub fn fresh_msgid(&self) -> u32 {
        self.next_msgid.fetch_add(1, Ordering::Relaxed)
    }

    /// Installs the session's authentication/encryption keys. Per spec.md
    /// §3 a session is half-open only while it has no authenticated keys
    /// yet, so keying it also completes Phase-1 from this session's point
    /// of view.
    pub fn set_keys(&self, skeyid_a: SkeyidA, keys: SessionKeys) {
        *self.keys.lock() = Some((skeyid_a, keys));
        self.mark_established();
    }

    pub fn keys(&self) -> Option<(SkeyidA, SessionKeys)> {
        self.keys.lock().clone()
    }

    pub fn mark_established(&self) {
        *self.state.lock() = SessionState::Established;
        self.events.publish(SessionEvent::Established { session_id: self.id });
    }

    pub fn mark_deleted(&self) {
        *self.state.lock() = SessionState::Deleted;
        self.events.publish(SessionEvent::Deleted { session_id: self.id });
    }

    pub fn mark_peer_dead(&self) {
        *self.state.lock() = SessionState::Deleted;
        self.events.publish(SessionEvent::PeerDead { session_id: self.id });
    }

    pub fn note_modecfg_applied(&self) {
        self.events
            .publish(SessionEvent::ModeCfgApplied { session_id: self.id });
    }

    /// Records inbound or outbound traffic, resetting the NAT-keepalive
    /// clock (spec.md §5).
    pub fn note_traffic(&self) {
        *self.last_traffic.lock() = Instant::now();
    }

    pub fn keepalive_due(&self, policy: &TimingPolicy) -> bool {
        self.last_traffic.lock().elapsed() >= policy.keepalive_interval()
    }

    pub fn half_open_expired(&self, policy: &TimingPolicy) -> bool {
        self.state() == SessionState::HalfOpen
            && self.created_at.elapsed() >= policy.half_open_ike_sa_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use std::net::Ipv4Addr;

    struct NullTransport;
    impl Transport for NullTransport {
        fn send(&self, _bytes: Vec<u8>) {}
    }

    fn session() -> Session {
        let (events, _rx) = SessionEventSender::new();
        let conn = Arc::new(Connection::new(
            "t",
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(2, 2, 2, 2),
        ));
        Session::new(1, [0; 8], [1; 8], conn, Arc::new(NullTransport), events)
    }

    #[test]
    fn fresh_msgid_is_monotonic_and_nonzero() {
        let s = session();
        let a = s.fresh_msgid();
        let b = s.fresh_msgid();
        assert_ne!(a, 0);
        assert!(b > a);
    }

    #[test]
    fn new_session_starts_half_open_with_idle_modecfg() {
        let s = session();
        assert_eq!(s.state(), SessionState::HalfOpen);
        assert_eq!(s.modecfg_state(), ModeCfgState::Idle);
    }

    #[test]
    fn mark_established_transitions_and_publishes() {
        let (events, mut rx) = SessionEventSender::new();
        let conn = Arc::new(Connection::new(
            "t",
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(2, 2, 2, 2),
        ));
        let s = Session::new(9, [0; 8], [1; 8], conn, Arc::new(NullTransport), events);
        s.mark_established();
        assert_eq!(s.state(), SessionState::Established);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Established { session_id: 9 }
        );
    }
}
