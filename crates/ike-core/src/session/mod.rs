//! IKE sessions (C5): the per-peer state the retransmission engine and
//! ModeCfg sub-exchange operate on.

pub mod manager;
pub mod retransmit;
pub mod session;
pub mod state;

pub use manager::{SessionManager, Transport};
pub use session::Session;
pub use state::SessionState;
