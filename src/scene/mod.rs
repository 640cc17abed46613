//! The scene: exclusive owner of the cell/bridge graph.
//!
//! ## Ownership discipline
//!
//! The scene is only ever mutated from the simulation domain. The renderer
//! reads it, the move advisor reads a projection of it, and the network layer
//! goes through the turn coordinator's mutators — nobody else holds a live
//! reference.
//!
//! ## Determinism
//!
//! All point arithmetic is integer and all progress counters advance by fixed
//! per-tick deltas, so two scenes ticked at the same rate from the same state
//! stay identical. The sync protocol's optimistic execution depends on this.
//!
//! The cell list is an `im::Vector` so the advisor's per-search clone is O(1).

mod reach;
mod snapshot;
mod tick;

pub use reach::Move;
pub use snapshot::{BridgeRecord, CellRecord, SceneSnapshot, TurnRecord};
pub use tick::TickReport;

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::core::{Bridge, Cell, CellId, Faction, SimConfig};

/// Terminal condition of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ongoing,
    PlayerEliminated,
    EnemyEliminated,
}

impl Outcome {
    /// Whether the game has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }

    /// The surviving faction, if any.
    #[must_use]
    pub const fn winner(self) -> Option<Faction> {
        match self {
            Outcome::PlayerEliminated => Some(Faction::Enemy),
            Outcome::EnemyEliminated => Some(Faction::Player),
            Outcome::Ongoing => None,
        }
    }

    /// Wire token used in `game_over` frames.
    #[must_use]
    pub const fn wire_token(self) -> &'static str {
        match self {
            Outcome::Ongoing => "ongoing",
            Outcome::PlayerEliminated => "player_eliminated",
            Outcome::EnemyEliminated => "enemy_eliminated",
        }
    }

    /// Parse a wire token back into an outcome.
    #[must_use]
    pub fn from_wire_token(token: &str) -> Option<Self> {
        match token {
            "ongoing" => Some(Outcome::Ongoing),
            "player_eliminated" => Some(Outcome::PlayerEliminated),
            "enemy_eliminated" => Some(Outcome::EnemyEliminated),
            _ => None,
        }
    }
}

/// The live cell/bridge graph plus the simulation clock.
#[derive(Clone, Debug)]
pub struct Scene {
    config: SimConfig,
    cells: Vector<Cell>,
    bridges: Vec<Bridge>,
    tick_count: u64,
    production_acc: f32,
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            cells: Vector::new(),
            bridges: Vec::new(),
            tick_count: 0,
            production_acc: 0.0,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Milliseconds of simulated time since session start.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.tick_count * 1000 / u64::from(self.config.tick_hz)
    }

    /// Ticks elapsed since session start.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // === Cells ===

    /// Add a cell at a fixed position, returning its stable id.
    ///
    /// Cells are created at scene init or by the copy-cell power-up and are
    /// never destroyed until the scene is torn down.
    pub fn add_cell(&mut self, x: f32, y: f32, faction: Faction, points: u32) -> CellId {
        let id = CellId::new(self.cells.len() as u16);
        self.cells.push_back(Cell::new(id, x, y, faction, points));
        id
    }

    /// Get a cell by id.
    #[must_use]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.index())
    }

    /// Iterate over all cells in id order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Number of cells in the scene.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id.index())
    }

    /// Deduct a quoted cost from a cell; the "pay" half of quote-then-pay.
    ///
    /// Returns false when the cell is unknown or cannot cover the cost.
    pub fn deduct_points(&mut self, id: CellId, cost: u32) -> bool {
        match self.cells.get_mut(id.index()) {
            Some(cell) if cell.points >= cost => {
                cell.points -= cost;
                true
            }
            _ => false,
        }
    }

    /// Overwrite a cell's mutable fields (the `sync_cell` apply path).
    ///
    /// `frozen_ms` is remaining freeze time; zero clears the freeze.
    /// Identity and position are untouched.
    pub fn set_cell_status(&mut self, id: CellId, faction: Faction, points: u32, frozen_ms: u64) {
        let now = self.now_ms();
        if let Some(cell) = self.cells.get_mut(id.index()) {
            cell.faction = faction;
            cell.points = points;
            cell.frozen_until = (frozen_ms > 0).then(|| now + frozen_ms);
        }
    }

    /// Freeze a cell for a duration (freeze power-up).
    pub fn freeze_cell(&mut self, id: CellId, duration_ms: u64) {
        let until = self.now_ms() + duration_ms;
        if let Some(cell) = self.cells.get_mut(id.index()) {
            cell.frozen_until = Some(until);
        }
    }

    /// Copy-cell power-up: split a cell into a new one at `(x, y)`.
    ///
    /// Half the source's points move into the copy. Returns the new id, or
    /// `None` for an unknown or neutral source.
    pub fn copy_cell(&mut self, id: CellId, x: f32, y: f32) -> Option<CellId> {
        let (faction, moved) = {
            let cell = self.cells.get(id.index())?;
            if !cell.faction.is_playable() {
                return None;
            }
            (cell.faction, cell.points / 2)
        };
        if let Some(cell) = self.cells.get_mut(id.index()) {
            cell.points -= moved;
        }
        Some(self.add_cell(x, y, faction, moved))
    }

    // === Bridges ===

    /// All bridges, in creation order.
    #[must_use]
    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    /// Find a same-faction bridge joining the unordered pair, if any.
    #[must_use]
    pub fn bridge_between(&self, a: CellId, b: CellId, faction: Faction) -> Option<&Bridge> {
        self.bridges
            .iter()
            .find(|bridge| bridge.faction == faction && bridge.joins(a, b))
    }

    /// Find the bridge running exactly `source → target`, if any.
    #[must_use]
    pub fn bridge_connecting(&self, source: CellId, target: CellId) -> Option<&Bridge> {
        self.bridges.iter().find(|b| b.connects(source, target))
    }

    /// Count a cell's outgoing bridges. Bounded by the cell's strength.
    #[must_use]
    pub fn outgoing_count(&self, id: CellId) -> usize {
        self.bridges.iter().filter(|b| b.source == id).count()
    }

    /// Record a new bridge.
    ///
    /// Fails silently (returns `None`) when the pair already carries a bridge
    /// of the same faction, or when the endpoints are invalid. An opposing
    /// bridge on the reverse direction marks both bridges in-conflict instead
    /// of being replaced. The cost is **not** deducted here — callers quote,
    /// then pay, then record.
    pub fn create_bridge(
        &mut self,
        source: CellId,
        target: CellId,
        faction: Faction,
        cost: u32,
    ) -> Option<&Bridge> {
        if source == target
            || source.index() >= self.cells.len()
            || target.index() >= self.cells.len()
        {
            return None;
        }
        if self.bridge_between(source, target, faction).is_some() {
            return None;
        }

        let mut bridge = Bridge::new(source, target, faction, cost);
        for other in &mut self.bridges {
            if other.is_reverse_of(source, target) && other.faction != faction {
                other.conflict = true;
                bridge.conflict = true;
            }
        }
        self.bridges.push(bridge);
        self.bridges.last()
    }

    /// Manually retract the bridge running `source → target`.
    ///
    /// Idempotent: removing an absent bridge is a no-op returning false.
    pub fn remove_bridge(&mut self, source: CellId, target: CellId) -> bool {
        let Some(pos) = self.bridges.iter().position(|b| b.connects(source, target)) else {
            return false;
        };
        self.bridges.remove(pos);
        self.refresh_conflicts();
        true
    }

    pub(crate) fn replace_bridges(&mut self, bridges: Vec<Bridge>) {
        self.bridges = bridges;
        self.refresh_conflicts();
    }

    /// Recompute conflict flags from surviving pairs.
    pub(crate) fn refresh_conflicts(&mut self) {
        for i in 0..self.bridges.len() {
            let (source, target, faction) = {
                let b = &self.bridges[i];
                (b.source, b.target, b.faction)
            };
            let opposed = self
                .bridges
                .iter()
                .any(|o| o.is_reverse_of(source, target) && o.faction != faction);
            let bridge = &mut self.bridges[i];
            if bridge.conflict != opposed {
                bridge.conflict = opposed;
                bridge.conflict_progress = 0.0;
            }
        }
    }

    // === Outcome ===

    /// Terminal check over counts of point-holding cells per faction.
    ///
    /// Terminal for both live play and advisor rollouts.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        let mut player = 0usize;
        let mut enemy = 0usize;
        for cell in self.cells.iter() {
            if cell.points == 0 {
                continue;
            }
            match cell.faction {
                Faction::Player => player += 1,
                Faction::Enemy => enemy += 1,
                Faction::Neutral => {}
            }
        }
        if player == 0 {
            Outcome::PlayerEliminated
        } else if enemy == 0 {
            Outcome::EnemyEliminated
        } else {
            Outcome::Ongoing
        }
    }
}
