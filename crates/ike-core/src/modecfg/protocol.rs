//! ModeCfg Sub-Protocol (C4): the four-state request/reply/set/ack exchange
//! carried inside an established IKE session (spec.md §4.4).

use tracing::{trace, warn};

use crate::address::InternalAddress;
use crate::collaborators::{Codec, SessionKeys, SkeyidA};
use crate::connection::{get_from_connection, Connection};
use crate::constants::{
    ISAMA_ACK, ISAMA_REPLY, ISAMA_REQUEST, ISAMA_SET, PAYLOAD_ATTRIBUTE,
};
use crate::error::{ModeCfgError, StfStatus};

use super::message::{build_attributes, parse_attributes, Attribute, AttributePayload, IkeHeader};

/// The four ModeCfg states plus the idle/terminal bookends of spec.md §4.5's
/// table. `Idle` covers both `MODE_CFG_I0` (before the initiator has
/// decided pull vs. push) and the terminal state after an exchange
/// completes, since both have `message_id == 0` and no exchange in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCfgState {
    /// `MODE_CFG_I0` / terminal: no exchange in flight.
    Idle,
    /// `MODE_CFG_I1`: initiator, pull mode, REQUEST sent, awaiting REPLY.
    RequestSent,
    /// `MODE_CFG_I2`: initiator, push mode, awaiting SET.
    AwaitingSet,
    /// `MODE_CFG_R0`: responder, pull mode, awaiting REQUEST.
    AwaitingRequest,
    /// `MODE_CFG_R1`: responder, push mode, SET sent, awaiting ACK.
    SetSent,
}

impl ModeCfgState {
    /// The `isama_type` this state will accept, or `None` if no exchange is
    /// in flight (`Idle`).
    fn expected_isama_type(self) -> Option<u8> {
        match self {
            ModeCfgState::Idle => None,
            ModeCfgState::RequestSent => Some(ISAMA_REPLY),
            ModeCfgState::AwaitingSet => Some(ISAMA_SET),
            ModeCfgState::AwaitingRequest => Some(ISAMA_REQUEST),
            ModeCfgState::SetSent => Some(ISAMA_ACK),
        }
    }

    pub fn is_exchange_in_flight(self) -> bool {
        self.expected_isama_type().is_some()
    }
}

/// A fully built outgoing ModeCfg message, ready to transmit and cache for
/// retransmission.
pub struct OutgoingMessage {
    pub msgid: u32,
    pub bytes: Vec<u8>,
}

/// Result of feeding one inbound ModeCfg message through the state machine.
pub struct Outcome {
    pub status: StfStatus,
    pub next_state: ModeCfgState,
    /// Set when an `InternalAddress` was parsed and should be applied to
    /// (pull initiator, push initiator) or sourced from (pull responder)
    /// the session's connection.
    pub applied: Option<InternalAddress>,
    /// Set when this inbound message requires an immediate reply
    /// (REPLY for a REQUEST, ACK for a SET).
    pub reply: Option<AttributePayload>,
}

/// Builds the outgoing bytes for a ModeCfg message (spec.md §4.4
/// "Outgoing message construction", steps 2–5; step 1, allocating a fresh
/// `message_id`, is the caller's job since it must be unique across the
/// session's in-flight exchanges).
///
/// The HASH payload covers `msgid || attribute_payload_bytes`. Rather than
/// writing the header first and coming back to patch a hash placeholder
/// in-place (the ambiguous `START_HASH_PAYLOAD` shape spec.md §9 flags as
/// possible UB in the original), this builds the attribute payload first,
/// computes the digest directly, and only then emits the header with the
/// final length: the "reserved offset" is simply never needed because
/// nothing here is written before its inputs are known.
pub fn build_outgoing(
    codec: &dyn Codec,
    icookie: [u8; 8],
    rcookie: [u8; 8],
    msgid: u32,
    isama_type: u8,
    identifier: u16,
    attributes: Vec<Attribute>,
    skeyid_a: &SkeyidA,
    keys: &SessionKeys,
) -> Result<OutgoingMessage, ModeCfgError> {
    let attribute_payload = AttributePayload {
        isama_type,
        identifier,
        attributes,
    };
    let attribute_bytes = attribute_payload.encode();

    let mut hash_input = Vec::with_capacity(4 + attribute_bytes.len());
    hash_input.extend_from_slice(&msgid.to_be_bytes());
    hash_input.extend_from_slice(&attribute_bytes);
    let digest = codec.compute_hmac(skeyid_a, &hash_input);

    let mut hash_payload = Vec::with_capacity(4 + digest.len());
    hash_payload.push(PAYLOAD_ATTRIBUTE);
    hash_payload.push(0); // reserved
    hash_payload.extend_from_slice(&((4 + digest.len()) as u16).to_be_bytes());
    hash_payload.extend_from_slice(&digest);

    let mut header = IkeHeader::new_mode_cfg(icookie, rcookie, msgid);
    let mut body = hash_payload;
    body.extend_from_slice(&attribute_bytes);
    header.length = (super::message::HEADER_LEN_BYTES + body.len()) as u32;

    let mut out = header.encode().to_vec();
    out.extend_from_slice(&body);

    let header_len = super::message::HEADER_LEN_BYTES;
    let mut post_header = out.split_off(header_len);
    codec
        .encrypt(&mut post_header, keys)
        .map_err(|_| ModeCfgError::Truncated)?;
    out.extend_from_slice(&post_header);

    Ok(OutgoingMessage { msgid, bytes: out })
}

/// Decrypts, verifies the HASH, and decodes the Attribute payload of an
/// inbound ModeCfg datagram.
pub fn verify_and_parse(
    codec: &dyn Codec,
    raw: &[u8],
    msgid: u32,
    skeyid_a: &SkeyidA,
    keys: &SessionKeys,
) -> Result<AttributePayload, StfStatus> {
    let header_len = super::message::HEADER_LEN_BYTES;
    if raw.len() < header_len + 4 {
        return Err(StfStatus::Fail);
    }

    let mut post_header = raw[header_len..].to_vec();
    codec
        .decrypt(&mut post_header, keys)
        .map_err(|_| StfStatus::Fail)?;

    if post_header.len() < 4 {
        return Err(StfStatus::Fail);
    }
    let hash_len = u16::from_be_bytes([post_header[2], post_header[3]]) as usize;
    if hash_len < 4 || post_header.len() < hash_len {
        return Err(StfStatus::Fail);
    }
    let digest = &post_header[4..hash_len];
    let attribute_bytes = &post_header[hash_len..];

    let mut hash_input = Vec::with_capacity(4 + attribute_bytes.len());
    hash_input.extend_from_slice(&msgid.to_be_bytes());
    hash_input.extend_from_slice(attribute_bytes);
    let expected = codec.compute_hmac(skeyid_a, &hash_input);

    if expected.len() != digest.len() || !constant_time_eq(&expected, digest) {
        return Err(StfStatus::AuthFailed);
    }

    AttributePayload::decode(attribute_bytes).map_err(|_| StfStatus::Fail)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Feeds one already-HASH-verified Attribute payload through the state
/// machine for `state`. Payloads whose `isama_type` doesn't match the
/// expected kind are parsed anyway for side effects (spec.md's observed
/// "permissive" behavior) but their result is discarded.
pub fn dispatch(state: ModeCfgState, payload: &AttributePayload, connection: &Connection) -> Outcome {
    let Some(expected) = state.expected_isama_type() else {
        trace!(isama_type = payload.isama_type, "no exchange in flight, ignoring");
        return Outcome {
            status: StfStatus::Ignore,
            next_state: state,
            applied: None,
            reply: None,
        };
    };

    let parsed = parse_attributes(&payload.attributes, |kind| {
        warn!(kind, "unknown ModeCfg attribute kind, ignoring");
    });

    let ia = match parsed {
        Ok(ia) => ia,
        Err(_) => {
            return Outcome {
                status: StfStatus::Fail,
                next_state: state,
                applied: None,
                reply: None,
            };
        }
    };

    if payload.isama_type != expected {
        warn!(
            got = payload.isama_type,
            want = expected,
            "unexpected isama_type for current ModeCfg state, discarding parse result"
        );
        return Outcome {
            status: StfStatus::Ignore,
            next_state: state,
            applied: None,
            reply: None,
        };
    }

    match state {
        ModeCfgState::RequestSent => Outcome {
            status: StfStatus::Ok,
            next_state: ModeCfgState::Idle,
            applied: Some(ia),
            reply: None,
        },
        ModeCfgState::AwaitingSet => {
            let ack = AttributePayload {
                isama_type: ISAMA_ACK,
                identifier: payload.identifier,
                attributes: ia
                    .attr_set
                    .iter()
                    .map(|kind| Attribute {
                        kind: kind.wire_value(),
                        value: Vec::new(),
                    })
                    .collect(),
            };
            Outcome {
                status: StfStatus::Ok,
                next_state: ModeCfgState::Idle,
                applied: Some(ia),
                reply: Some(ack),
            }
        }
        ModeCfgState::AwaitingRequest => {
            // The request's own attributes are just kind markers; the
            // responder answers from its own connection, not from `ia`.
            let offer = get_from_connection(connection);
            Outcome {
                status: StfStatus::Ok,
                next_state: ModeCfgState::Idle,
                applied: None,
                reply: Some(AttributePayload {
                    isama_type: ISAMA_REPLY,
                    identifier: payload.identifier,
                    attributes: build_attributes(&offer),
                }),
            }
        }
        ModeCfgState::SetSent => Outcome {
            status: StfStatus::Ok,
            next_state: ModeCfgState::Idle,
            applied: None,
            reply: None,
        },
        ModeCfgState::Idle => unreachable!("Idle has no expected_isama_type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn connection() -> Connection {
        Connection::new("t", Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2))
    }

    #[test]
    fn idle_state_ignores_any_message() {
        let payload = AttributePayload {
            isama_type: ISAMA_REPLY,
            identifier: 1,
            attributes: Vec::new(),
        };
        let outcome = dispatch(ModeCfgState::Idle, &payload, &connection());
        assert_eq!(outcome.status, StfStatus::Ignore);
        assert_eq!(outcome.next_state, ModeCfgState::Idle);
    }

    #[test]
    fn mismatched_isama_type_is_ignored_but_still_parsed() {
        let payload = AttributePayload {
            isama_type: ISAMA_SET, // RequestSent expects REPLY
            identifier: 1,
            attributes: Vec::new(),
        };
        let outcome = dispatch(ModeCfgState::RequestSent, &payload, &connection());
        assert_eq!(outcome.status, StfStatus::Ignore);
        assert_eq!(outcome.next_state, ModeCfgState::RequestSent);
    }

    #[test]
    fn reply_in_request_sent_state_applies_and_terminates() {
        let payload = AttributePayload {
            isama_type: ISAMA_REPLY,
            identifier: 1,
            attributes: Vec::new(),
        };
        let outcome = dispatch(ModeCfgState::RequestSent, &payload, &connection());
        assert_eq!(outcome.status, StfStatus::Ok);
        assert_eq!(outcome.next_state, ModeCfgState::Idle);
        assert!(outcome.applied.is_some());
    }

    #[test]
    fn awaiting_request_answers_from_connection_not_from_payload() {
        let conn = connection().with_host_srcip(Ipv4Addr::new(10, 1, 2, 3));
        let payload = AttributePayload {
            isama_type: ISAMA_REQUEST,
            identifier: 5,
            attributes: Vec::new(),
        };
        let outcome = dispatch(ModeCfgState::AwaitingRequest, &payload, &conn);
        let reply = outcome.reply.expect("expected a REPLY");
        assert_eq!(reply.isama_type, ISAMA_REPLY);
        assert!(!reply.attributes.is_empty());
    }
}
