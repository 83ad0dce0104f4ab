//! Session Manager (C5): owns every live session and the background tasks
//! that drive retransmission, half-open reaping, and NAT keepalives
//! (spec.md §5). Each session's mutable state is behind its own lock, so
//! sessions never contend with each other; the manager's own lock only
//! ever guards the id-to-session map, not per-session work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::address::InternalAddress;
use crate::collaborators::Codec;
use crate::connection::{apply_to_connection, get_from_connection, Connection};
use crate::constants::{ISAMA_ACK, ISAMA_REPLY, ISAMA_REQUEST, ISAMA_SET};
use crate::error::{ModeCfgError, StfStatus};
use crate::event::SessionEventSender;
use crate::modecfg::{build_outgoing, dispatch, verify_and_parse, IkeHeader, ModeCfgState};
use crate::timing::TimingPolicy;

use super::retransmit::RetransmitOutcome;
use super::session::Session;
use super::state::SessionState;

/// Hands a fully built datagram to the network. The daemon binary
/// implements this over a UDP socket; `ike-core` never touches one
/// directly.
pub trait Transport: Send + Sync {
    fn send(&self, bytes: Vec<u8>);
}

const REAPER_TICK: Duration = Duration::from_secs(5);

pub struct SessionManager {
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
    events: SessionEventSender,
    policy: TimingPolicy,
}

impl SessionManager {
    pub fn new(events: SessionEventSender) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            policy: TimingPolicy,
        })
    }

    pub fn create_session(
        &self,
        icookie: [u8; 8],
        rcookie: [u8; 8],
        connection: Arc<Connection>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(
            id,
            icookie,
            rcookie,
            connection,
            transport,
            self.events.clone(),
        ));
        self.sessions.lock().insert(id, session.clone());
        info!(session_id = id, "session created");
        session
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: u64) {
        self.sessions.lock().remove(&id);
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initiator, pull mode: send REQUEST for the address kind, await
    /// REPLY. Only the address itself is requested; a bare TLV with an
    /// empty value is ModeCfg's way of asking for a kind without proposing
    /// a value.
    pub fn start_pull(&self, session: &Arc<Session>, codec: &dyn Codec) -> Result<(), ModeCfgError> {
        let mut request = InternalAddress::default();
        request.attr_set.insert(crate::address::AttrKind::Ipv4Address);
        request.attr_set.insert(crate::address::AttrKind::Ipv4Netmask);

        let msgid = session.fresh_msgid();
        let attributes = crate::modecfg::message::build_attributes(&request);
        self.send_modecfg(session, codec, ISAMA_REQUEST, msgid as u16, msgid, attributes)?;
        session.set_modecfg_state(ModeCfgState::RequestSent);
        Ok(())
    }

    /// Initiator, push mode: don't send anything yet, just start waiting
    /// for the responder's unsolicited SET.
    pub fn begin_awaiting_push(&self, session: &Arc<Session>) {
        session.set_modecfg_state(ModeCfgState::AwaitingSet);
    }

    /// Responder, pull mode: start waiting for the initiator's REQUEST.
    pub fn begin_awaiting_request(&self, session: &Arc<Session>) {
        session.set_modecfg_state(ModeCfgState::AwaitingRequest);
    }

    /// Responder, push mode: send SET built from the matched connection,
    /// await ACK.
    pub fn start_push(&self, session: &Arc<Session>, codec: &dyn Codec) -> Result<(), ModeCfgError> {
        let ia = get_from_connection(&session.connection);
        let msgid = session.fresh_msgid();
        let attributes = crate::modecfg::message::build_attributes(&ia);
        self.send_modecfg(session, codec, ISAMA_SET, msgid as u16, msgid, attributes)?;
        session.set_modecfg_state(ModeCfgState::SetSent);
        Ok(())
    }

    fn send_modecfg(
        &self,
        session: &Arc<Session>,
        codec: &dyn Codec,
        isama_type: u8,
        identifier: u16,
        msgid: u32,
        attributes: Vec<crate::modecfg::Attribute>,
    ) -> Result<(), ModeCfgError> {
        let (skeyid_a, keys) = session
            .keys()
            .ok_or_else(|| ModeCfgError::Credential("session has no keys yet".to_string()))?;

        let outgoing = build_outgoing(
            codec,
            session.icookie,
            session.rcookie,
            msgid,
            isama_type,
            identifier,
            attributes,
            &skeyid_a,
            &keys,
        )?;

        session.retransmit.lock().arm(outgoing.bytes.clone());
        session.transport.send(outgoing.bytes);
        session.note_traffic();
        Ok(())
    }

    /// Feeds one inbound datagram through HASH verification and the
    /// ModeCfg state machine, sending a reply if the exchange calls for
    /// one. Returns the resulting `StfStatus`.
    pub fn handle_inbound(&self, session: &Arc<Session>, codec: &dyn Codec, raw: &[u8]) -> StfStatus {
        let header = match IkeHeader::decode(raw) {
            Ok(h) => h,
            Err(_) => return StfStatus::Fail,
        };
        if !header.is_mode_cfg() {
            return StfStatus::Ignore;
        }

        let Some((skeyid_a, keys)) = session.keys() else {
            return StfStatus::NotFound;
        };

        let payload = match verify_and_parse(codec, raw, header.msgid, &skeyid_a, &keys) {
            Ok(p) => p,
            Err(status) => {
                if status == StfStatus::AuthFailed {
                    warn!(session_id = session.id, "ModeCfg HASH verification failed");
                }
                return status;
            }
        };

        session.note_traffic();
        let outcome = dispatch(session.modecfg_state(), &payload, &session.connection);
        session.set_modecfg_state(outcome.next_state);

        if let Some(ia) = &outcome.applied {
            apply_to_connection(&session.connection, ia);
            session.note_modecfg_applied();
        }

        if outcome.status.is_ok() || outcome.status == StfStatus::Fail {
            session.retransmit.lock().clear();
        }

        if let Some(reply) = outcome.reply {
            let reply_msgid = session.fresh_msgid();
            if let Err(err) = self.send_modecfg(
                session,
                codec,
                reply.isama_type,
                reply.identifier,
                reply_msgid,
                reply.attributes,
            ) {
                warn!(session_id = session.id, %err, "failed to send ModeCfg reply");
                return StfStatus::InternalError;
            }
            // REPLY and ACK close their exchange immediately; there is
            // nothing left to retransmit once sent.
            if reply.isama_type == ISAMA_REPLY || reply.isama_type == ISAMA_ACK {
                session.retransmit.lock().clear();
            }
        }

        outcome.status
    }

    /// Drives retransmission for one session until its exchange completes
    /// or its budget is exhausted, at which point the session is declared
    /// dead and dropped from the manager.
    pub fn spawn_retransmit_driver(self: &Arc<Self>, session: Arc<Session>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let outcome = session.retransmit.lock().poll(&manager.policy);
                match outcome {
                    RetransmitOutcome::Send(bytes, timeout) => {
                        tokio::time::sleep(timeout).await;
                        // The exchange may have completed while we slept;
                        // only resend if it's still waiting on a reply.
                        if session.retransmit.lock().is_armed() {
                            session.transport.send(bytes);
                        }
                    }
                    RetransmitOutcome::Exhausted => {
                        warn!(session_id = session.id, "retransmit budget exhausted, peer is dead");
                        session.retransmit.lock().clear();
                        session.mark_peer_dead();
                        manager.remove(session.id);
                        break;
                    }
                    RetransmitOutcome::Idle => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        if session.state() == SessionState::Deleted {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Periodically reaps half-open sessions that never completed Phase-1
    /// within the half-open timeout (spec.md §5).
    pub fn spawn_half_open_reaper(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_TICK);
            loop {
                ticker.tick().await;
                for session in manager.snapshot() {
                    if session.half_open_expired(&manager.policy) {
                        warn!(session_id = session.id, "half-open session timed out");
                        session.mark_peer_dead();
                        manager.remove(session.id);
                    }
                }
            }
        });
    }

    /// Periodically sends NAT keepalives for established sessions that
    /// have been quiet for `keepalive_interval` (spec.md §5).
    pub fn spawn_keepalive_driver(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_TICK);
            loop {
                ticker.tick().await;
                for session in manager.snapshot() {
                    if session.state() == SessionState::Established && session.keepalive_due(&manager.policy) {
                        session.transport.send(Vec::new());
                        session.note_traffic();
                    }
                }
            }
        });
    }
}
