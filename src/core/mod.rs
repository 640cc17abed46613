//! Core data model: cells, bridges, factions, configuration, RNG.
//!
//! These are the value types the rest of the crate is built on. They carry
//! no tick behavior; the economy lives in [`crate::scene`].

mod bridge;
mod cell;
mod config;
mod rng;

pub use bridge::Bridge;
pub use cell::{Cell, CellId, Faction};
pub use config::{NetConfig, SimConfig};
pub use rng::{SimRng, SimRngState};
