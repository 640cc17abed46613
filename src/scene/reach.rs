//! Reachability: which cells a source could legally bridge to right now.
//!
//! A pure query, recomputed on demand — the answer shifts with every
//! production pulse and every bridge change, so nothing here is cached.

use serde::{Deserialize, Serialize};

use super::Scene;
use crate::core::{CellId, Faction};

/// A candidate bridge as `(source, target, quoted cost)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub source: CellId,
    pub target: CellId,
    pub cost: u32,
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} (cost {})", self.source, self.target, self.cost)
    }
}

impl Scene {
    /// Quote the cost of bridging `source → target`:
    /// `floor(distance / distance_unit)`.
    #[must_use]
    pub fn quote_cost(&self, source: CellId, target: CellId) -> Option<u32> {
        if source == target {
            return None;
        }
        let from = self.cell(source)?;
        let to = self.cell(target)?;
        Some((from.distance_to(to) / self.config.distance_unit) as u32)
    }

    /// Whether `target` is reachable from `source` right now; returns the
    /// quoted cost if so.
    ///
    /// Reachable iff: not the source itself, no same-faction bridge already
    /// joins the pair, the cost is covered by the source's points, and the
    /// source still has outgoing capacity (bounded by its strength).
    #[must_use]
    pub fn can_reach(&self, source: CellId, target: CellId) -> Option<u32> {
        let cost = self.quote_cost(source, target)?;
        let src = self.cell(source)?;

        if self.bridge_between(source, target, src.faction).is_some() {
            return None;
        }
        if cost > src.points {
            return None;
        }
        if self.outgoing_count(source) >= src.strength() as usize {
            return None;
        }
        Some(cost)
    }

    /// All cells reachable from `source` right now.
    #[must_use]
    pub fn reachable_targets(&self, source: CellId) -> Vec<CellId> {
        self.cells()
            .filter(|cell| self.can_reach(source, cell.id).is_some())
            .map(|cell| cell.id)
            .collect()
    }

    /// Every legal `(source, target, cost)` for a faction right now.
    #[must_use]
    pub fn legal_moves(&self, faction: Faction) -> Vec<Move> {
        let mut moves = Vec::new();
        if !faction.is_playable() {
            return moves;
        }
        for source in self.cells() {
            if source.faction != faction {
                continue;
            }
            for target in self.cells() {
                if let Some(cost) = self.can_reach(source.id, target.id) {
                    moves.push(Move {
                        source: source.id,
                        target: target.id,
                        cost,
                    });
                }
            }
        }
        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SimConfig;

    fn scene() -> Scene {
        // distance_unit 40: cells 80 apart quote cost 2.
        Scene::new(SimConfig::default())
    }

    #[test]
    fn test_cost_quote_scales_with_distance() {
        let mut s = scene();
        let a = s.add_cell(0.0, 0.0, Faction::Player, 20);
        let b = s.add_cell(80.0, 0.0, Faction::Enemy, 5);
        let c = s.add_cell(0.0, 130.0, Faction::Enemy, 5);

        assert_eq!(s.quote_cost(a, b), Some(2));
        assert_eq!(s.quote_cost(a, c), Some(3));
        assert_eq!(s.quote_cost(a, a), None);
    }

    #[test]
    fn test_reach_requires_points() {
        let mut s = scene();
        let a = s.add_cell(0.0, 0.0, Faction::Player, 1);
        let b = s.add_cell(80.0, 0.0, Faction::Enemy, 5);

        assert_eq!(s.can_reach(a, b), None);

        s.cell_mut(a).unwrap().points = 2;
        assert_eq!(s.can_reach(a, b), Some(2));
    }

    #[test]
    fn test_reach_excludes_pairs_already_bridged() {
        let mut s = scene();
        let a = s.add_cell(0.0, 0.0, Faction::Player, 20);
        let b = s.add_cell(80.0, 0.0, Faction::Player, 20);

        assert!(s.can_reach(a, b).is_some());
        s.create_bridge(a, b, Faction::Player, 2);
        assert_eq!(s.can_reach(a, b), None);
        // The reverse direction is the same unordered pair.
        assert_eq!(s.can_reach(b, a), None);
    }

    #[test]
    fn test_outgoing_capacity_bounded_by_strength() {
        let mut s = scene();
        // 5 points: strength 1, so one outgoing bridge at most.
        let a = s.add_cell(0.0, 0.0, Faction::Player, 5);
        let b = s.add_cell(40.0, 0.0, Faction::Enemy, 5);
        let c = s.add_cell(0.0, 40.0, Faction::Enemy, 5);

        assert!(s.can_reach(a, b).is_some());
        s.create_bridge(a, b, Faction::Player, 1);
        assert_eq!(s.can_reach(a, c), None);
    }

    #[test]
    fn test_legal_moves_restricted_to_faction() {
        let mut s = scene();
        let a = s.add_cell(0.0, 0.0, Faction::Player, 20);
        let b = s.add_cell(80.0, 0.0, Faction::Enemy, 20);
        let n = s.add_cell(40.0, 0.0, Faction::Neutral, 0);

        let moves = s.legal_moves(Faction::Player);
        assert!(moves.iter().all(|m| m.source == a));
        assert!(moves.iter().any(|m| m.target == b));
        assert!(moves.iter().any(|m| m.target == n));

        // Neutral territory never moves.
        assert!(s.legal_moves(Faction::Neutral).iter().all(|m| m.source != n));
    }
}
