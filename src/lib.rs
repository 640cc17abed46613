//! # cellbridge
//!
//! The simulation and synchronization core of a real-time territory-control
//! game: players own cells that accrue points and build directed bridges
//! that stream point-flow between cells, converting or draining the
//! opponent's territory.
//!
//! ## Design Principles
//!
//! 1. **One owning actor**: the [`runtime::Runtime`] exclusively owns the
//!    cell/bridge graph; renderer, network, and advisor interact through its
//!    command surface, never through shared references.
//!
//! 2. **Deterministic economy**: integer points, fixed per-tick deltas.
//!    Two peers ticking the same state stay convergent, which is what lets
//!    the sync protocol run both simulations optimistically and reconcile
//!    with periodic snapshots.
//!
//! 3. **Stable identities**: every wire message names cells by index
//!    assigned at creation; nothing is matched by coordinates.
//!
//! ## Modules
//!
//! - `core`: cells, bridges, factions, configuration, deterministic RNG
//! - `scene`: the economy engine — production, dot flow, capture, conflict
//! - `turn`: the turn-coordination state machine for local and networked play
//! - `net`: the sync protocol — framing, snapshots, heartbeats, reliability
//! - `advisor`: Monte Carlo Tree Search move recommendation
//! - `replay`: the durable replay/persistence contract
//! - `runtime`: the owning simulation actor and its control surface

pub mod advisor;
pub mod core;
pub mod error;
pub mod net;
pub mod replay;
pub mod runtime;
pub mod scene;
pub mod turn;

// Re-export commonly used types
pub use crate::core::{Bridge, Cell, CellId, Faction, NetConfig, SimConfig, SimRng};

pub use crate::scene::{
    BridgeRecord, CellRecord, Move, Outcome, Scene, SceneSnapshot, TickReport, TurnRecord,
};

pub use crate::turn::{TurnCoordinator, TurnEvent, TurnMode, TurnState};

pub use crate::net::{
    spawn_listener, CancelToken, ChannelTransport, Message, PeerSession, SessionRole,
    SnapshotAssembler, TcpTransport, Transport,
};

pub use crate::advisor::{Advice, AdvisorConfig, MoveAdvisor, SearchStats};

pub use crate::replay::{ReplayCategory, ReplayEntry, ReplayLog, ReplayRecord};

pub use crate::runtime::{Command, Runtime, RuntimeHandle, ViewHints};

pub use crate::error::{NetError, PersistError, ProtocolError};
