//! ModeCfg sub-exchange (C4): wire format plus the pull/push state machine
//! that rides on top of an established IKE session.

pub mod message;
pub mod protocol;

pub use message::{Attribute, AttributePayload, IkeHeader};
pub use protocol::{build_outgoing, dispatch, verify_and_parse, ModeCfgState, Outcome, OutgoingMessage};
