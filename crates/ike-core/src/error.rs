//! Error taxonomy (spec.md §7).
//!
//! `StfStatus` is the protocol-level outcome of a state-transition function:
//! it is not a Rust error in the usual sense (`IGNORE` and `OK` are
//! successes), so it never flows through `?`. Genuinely exceptional
//! failures (I/O, malformed config, lookup misses outside of a
//! state-transition context) use the `thiserror` enums below instead.

use std::fmt;

/// Outcome of feeding one inbound message into a state-transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StfStatus {
    /// Processed normally.
    Ok,
    /// Buffer overrun, impossible branch, or other programmer-visible bug.
    InternalError,
    /// Malformed attribute payload; the exchange is abandoned.
    Fail,
    /// Message did not match the expected kind for the current state;
    /// silently dropped.
    Ignore,
    /// HASH verification failed; the message is dropped without a reply.
    AuthFailed,
    /// A referenced connection or credential could not be found.
    NotFound,
    /// Retransmit budget exhausted; the peer is declared dead.
    Timeout,
}

impl fmt::Display for StfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StfStatus::Ok => "OK",
            StfStatus::InternalError => "INTERNAL_ERROR",
            StfStatus::Fail => "FAIL",
            StfStatus::Ignore => "IGNORE",
            StfStatus::AuthFailed => "AUTH_FAILED",
            StfStatus::NotFound => "NOT_FOUND",
            StfStatus::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

impl StfStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, StfStatus::Ok)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionStoreError {
    #[error("no connection named {0:?}")]
    NotFound(String),

    #[error("no connection matches local={local} remote={remote}")]
    NoHostMatch {
        local: std::net::IpAddr,
        remote: std::net::IpAddr,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ModeCfgError {
    #[error("attribute payload truncated")]
    Truncated,

    #[error("attribute {0} has invalid length {1}")]
    InvalidAttributeLength(u16, usize),

    #[error("HASH payload verification failed")]
    AuthenticationFailed,

    #[error("no attribute payload matched the expected exchange kind")]
    NoMatchingPayload,

    #[error("credential error: {0}")]
    Credential(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("an exchange is already in flight for this session")]
    ExchangeInFlight,

    #[error("message id {expected} expected, got {actual}")]
    UnexpectedMessageId { expected: u32, actual: u32 },

    #[error("mode config error: {0}")]
    ModeCfg(#[from] ModeCfgError),

    #[error("session {0} is gone")]
    Gone(u64),
}
