//! The sync protocol: keeps two independently-ticking scenes consistent
//! over an unreliable socket link.
//!
//! Layering, transport up:
//!
//! - `transport` — newline-framed TCP, decode-once at the boundary
//! - `message` — the tagged wire vocabulary
//! - `chunk` — snapshot splitting and bounded reassembly
//! - `session` — roles, replication, heartbeats, retries

mod chunk;
mod message;
mod session;
mod transport;

pub use chunk::{split_snapshot, SnapshotAssembler};
pub use message::Message;
pub use session::{PeerSession, SessionRole};
pub use transport::{spawn_listener, CancelToken, ChannelTransport, TcpTransport, Transport};
