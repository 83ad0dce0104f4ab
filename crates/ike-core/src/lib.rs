pub mod address;
pub mod collaborators;
pub mod connection;
pub mod constants;
pub mod error;
pub mod event;
pub mod modecfg;
pub mod session;
pub mod timing;

pub use address::{AttrKind, AttrSet, InternalAddress};
pub use collaborators::{Codec, Credential, Kernel};
pub use connection::{Connection, ConnectionStore};
pub use error::StfStatus;
pub use event::{SessionEvent, SessionEventSender};
pub use session::{Session, SessionManager, SessionState, Transport};
pub use timing::TimingPolicy;
