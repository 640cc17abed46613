//! Simulation and network tunables.
//!
//! All timing constants live here so both peers of a networked session run
//! identical economies. The per-tick deltas default to dyadic fractions so
//! repeated f32 accumulation stays exact and both simulations complete a dot
//! or a conflict drain on the same tick.

use serde::{Deserialize, Serialize};

/// Economy and turn tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Fixed simulation rate in ticks per second.
    pub tick_hz: u32,

    /// Seconds between production pulses (+1 point per eligible cell).
    pub production_interval: f32,

    /// Seconds between dot emissions per active bridge.
    pub emission_interval: f32,

    /// Per-tick progress added to every in-flight dot.
    pub dot_delta: f32,

    /// Per-tick progress added to a conflicted bridge's decay counter.
    pub conflict_delta: f32,

    /// Point ceiling for any single cell.
    pub max_points: u32,

    /// Distance covered by one point of bridge cost.
    pub distance_unit: f32,

    /// Turn countdown duration in seconds.
    pub turn_seconds: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_hz: 32,
            production_interval: 1.0,
            emission_interval: 0.5,
            // 32 ticks per crossing, 64 per conflict drain; dyadic, see above
            dot_delta: 1.0 / 32.0,
            conflict_delta: 1.0 / 64.0,
            max_points: 50,
            distance_unit: 40.0,
            turn_seconds: 30,
        }
    }
}

impl SimConfig {
    /// Seconds per tick.
    #[must_use]
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    /// Override the dot delta.
    #[must_use]
    pub fn with_dot_delta(mut self, delta: f32) -> Self {
        self.dot_delta = delta;
        self
    }

    /// Override the conflict delta.
    #[must_use]
    pub fn with_conflict_delta(mut self, delta: f32) -> Self {
        self.conflict_delta = delta;
        self
    }

    /// Override the point ceiling.
    #[must_use]
    pub fn with_max_points(mut self, max: u32) -> Self {
        self.max_points = max;
        self
    }

    /// Override the distance unit.
    #[must_use]
    pub fn with_distance_unit(mut self, unit: f32) -> Self {
        self.distance_unit = unit;
        self
    }

    /// Override the turn duration.
    #[must_use]
    pub fn with_turn_seconds(mut self, seconds: u32) -> Self {
        self.turn_seconds = seconds;
        self
    }
}

/// Sync-protocol timing and sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Handshake finalizes locally after this long even without an ack.
    pub handshake_finalize_ms: u64,

    /// Handshake aborts to `Disconnected` after this long with no traffic.
    pub handshake_abort_ms: u64,

    /// Interval between outbound heartbeats.
    pub heartbeat_interval_ms: u64,

    /// Link is dead if no heartbeat ack arrives within this window.
    pub heartbeat_window_ms: u64,

    /// Base step for linear retry backoff on priority messages.
    pub retry_backoff_ms: u64,

    /// Bounded retry count for priority messages.
    pub max_retries: u32,

    /// Connect/write timeout for one outbound send.
    pub send_timeout_ms: u64,

    /// Payload bytes per snapshot chunk.
    pub chunk_bytes: usize,

    /// Partial snapshots older than this are dropped as recoverable loss.
    pub chunk_retention_ms: u64,

    /// Interval between full-snapshot resyncs while it is the local turn.
    pub resync_interval_ms: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            handshake_finalize_ms: 500,
            handshake_abort_ms: 8_000,
            heartbeat_interval_ms: 2_000,
            heartbeat_window_ms: 6_000,
            retry_backoff_ms: 250,
            max_retries: 4,
            send_timeout_ms: 2_000,
            chunk_bytes: 900,
            chunk_retention_ms: 10_000,
            resync_interval_ms: 3_000,
        }
    }
}
