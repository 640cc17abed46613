//! The advisor's lightweight game model.
//!
//! An isolated projection of the scene: cells only, bridges collapsed. A
//! move resolves as an immediate point transfer instead of an animated dot
//! stream — pay the quote, then half the source's remaining points land on
//! the target in one step, with the engine's capture semantics. Rollouts
//! interleave moves with production pulses.
//!
//! The projection is `im`-backed, so per-iteration clones share structure
//! with the root.

use std::hash::{Hash, Hasher};

use im::Vector;
use rustc_hash::FxHasher;

use crate::core::Faction;
use crate::scene::{Move, Outcome, Scene};

/// A cell as the search sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct LightCell {
    pub x: f32,
    pub y: f32,
    pub faction: Faction,
    pub points: u32,
}

/// The whole search state.
#[derive(Clone, Debug)]
pub struct LightState {
    cells: Vector<LightCell>,
    max_points: u32,
    distance_unit: f32,
}

impl LightState {
    /// Project the live scene. Never holds a reference back into it.
    #[must_use]
    pub fn from_scene(scene: &Scene) -> Self {
        let cells = scene
            .cells()
            .map(|cell| LightCell {
                x: cell.x(),
                y: cell.y(),
                faction: cell.faction,
                points: cell.points,
            })
            .collect();
        Self {
            cells,
            max_points: scene.config().max_points,
            distance_unit: scene.config().distance_unit,
        }
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn cell(&self, index: usize) -> Option<&LightCell> {
        self.cells.get(index)
    }

    /// Legal `(source, target, cost)` triples for a faction.
    ///
    /// The cost rule matches the live reachability quote; the
    /// duplicate-bridge rule has nothing to bind to here since bridges
    /// resolve instantly.
    #[must_use]
    pub fn legal_moves(&self, faction: Faction) -> Vec<Move> {
        let mut moves = Vec::new();
        if !faction.is_playable() {
            return moves;
        }
        for (i, source) in self.cells.iter().enumerate() {
            if source.faction != faction {
                continue;
            }
            for (j, target) in self.cells.iter().enumerate() {
                if i == j {
                    continue;
                }
                let dx = source.x - target.x;
                let dy = source.y - target.y;
                let cost = ((dx * dx + dy * dy).sqrt() / self.distance_unit) as u32;
                if cost <= source.points {
                    moves.push(Move {
                        source: crate::core::CellId::new(i as u16),
                        target: crate::core::CellId::new(j as u16),
                        cost,
                    });
                }
            }
        }
        moves
    }

    /// Resolve a move as an immediate transfer.
    pub fn apply_move(&mut self, faction: Faction, mv: &Move) {
        let source = mv.source.index();
        let target = mv.target.index();
        if source >= self.cells.len() || target >= self.cells.len() || source == target {
            return;
        }

        let send = {
            let src = &mut self.cells[source];
            src.points = src.points.saturating_sub(mv.cost);
            let send = src.points / 2;
            src.points -= send;
            send
        };

        let max_points = self.max_points;
        let tgt = &mut self.cells[target];
        if tgt.faction == faction {
            tgt.points = (tgt.points + send).min(max_points);
        } else if send >= tgt.points {
            tgt.faction = faction;
            tgt.points = 1;
        } else {
            tgt.points -= send;
        }
    }

    /// One production pulse: every playable cell gains a point.
    pub fn grow(&mut self) {
        let max_points = self.max_points;
        for cell in self.cells.iter_mut() {
            if cell.faction.is_playable() {
                cell.points = (cell.points + 1).min(max_points);
            }
        }
    }

    /// Same terminal rule as the live engine.
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

    /// Fraction of all cells owned by a faction; the depth-capped reward.
    #[must_use]
    pub fn share(&self, faction: Faction) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        let owned = self.cells.iter().filter(|c| c.faction == faction).count();
        owned as f64 / self.cells.len() as f64
    }

    /// Hash of the multiset of `(x, y, faction, points)` across all cells.
    ///
    /// Order-independent accumulation, so permuted-but-equal states land in
    /// the same transposition bucket.
    #[must_use]
    pub fn hash_key(&self) -> u64 {
        self.cells
            .iter()
            .map(|cell| {
                let mut hasher = FxHasher::default();
                cell.x.to_bits().hash(&mut hasher);
                cell.y.to_bits().hash(&mut hasher);
                cell.faction.hash(&mut hasher);
                cell.points.hash(&mut hasher);
                hasher.finish()
            })
            .fold(0u64, u64::wrapping_add)
    }
}
