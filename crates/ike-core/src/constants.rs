//! Protocol constants for the ModeCfg sub-exchange (spec.md §6).

use std::time::Duration;

/// `exchange` field value for a Mode Config exchange.
pub const EXCHANGE_MODE_CFG: u8 = 0x06;

/// Payload type that precedes an Attribute payload: HASH.
pub const PAYLOAD_HASH: u8 = 8;

/// Payload type for the Attribute payload itself.
pub const PAYLOAD_ATTRIBUTE: u8 = 14;

/// Terminal "no more payloads" marker.
pub const PAYLOAD_NONE: u8 = 0;

/// ModeCfg message kinds (the `isama_type` field of the Attribute payload).
pub const ISAMA_REQUEST: u8 = 1;
pub const ISAMA_REPLY: u8 = 2;
pub const ISAMA_SET: u8 = 3;
pub const ISAMA_ACK: u8 = 4;

pub const INITIAL_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(4000);
pub const RETRANSMIT_BASE: f64 = 1.8;
pub const RETRANSMIT_TRIES: u32 = 5;
pub const HALF_OPEN_IKE_SA_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);
pub const RETRY_BASE_INTERVAL: Duration = Duration::from_secs(30);
pub const RETRY_JITTER: Duration = Duration::from_secs(20);
