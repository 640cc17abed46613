//! The whole-scene projection used for network resync and persistence.
//!
//! A snapshot is a value type. Applying one overwrites mutable fields by
//! cell index and replaces the bridge set; it never creates or destroys
//! cells and never moves them. Freeze times travel as remaining durations so
//! the two peers' independent sim clocks don't matter.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::warn;

use super::Scene;
use crate::core::{Bridge, CellId, Faction};

/// One cell's mutable state plus its fixed identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub index: u16,
    pub x: f32,
    pub y: f32,
    pub faction: Faction,
    pub points: u32,
    /// Remaining freeze time in ms; 0 = not frozen.
    pub frozen_ms: u64,
}

/// One bridge, endpoints referenced by cell index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeRecord {
    pub source: u16,
    pub target: u16,
    pub faction: Faction,
    pub cost: u32,
    pub dots: Vec<f32>,
}

/// Current-turn identity and remaining turn time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Faction whose turn it is; `None` outside active play.
    pub active: Option<Faction>,
    pub remaining_seconds: u32,
}

/// The full projection: ordered cells, ordered bridges, turn state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub cells: Vec<CellRecord>,
    pub bridges: Vec<BridgeRecord>,
    pub turn: TurnRecord,
}

impl SceneSnapshot {
    /// Project the live scene into a value.
    #[must_use]
    pub fn capture(scene: &Scene, turn: TurnRecord) -> Self {
        let now = scene.now_ms();
        let cells = scene
            .cells()
            .map(|cell| CellRecord {
                index: cell.id.raw(),
                x: cell.x(),
                y: cell.y(),
                faction: cell.faction,
                points: cell.points,
                frozen_ms: cell.frozen_until.map_or(0, |until| until.saturating_sub(now)),
            })
            .collect();
        let bridges = scene
            .bridges()
            .iter()
            .map(|bridge| BridgeRecord {
                source: bridge.source.raw(),
                target: bridge.target.raw(),
                faction: bridge.faction,
                cost: bridge.cost,
                dots: bridge.dots.to_vec(),
            })
            .collect();
        Self {
            cells,
            bridges,
            turn,
        }
    }

    /// Overwrite the scene's mutable state from this snapshot.
    ///
    /// Returns the turn record for the coordinator to adopt. Records for
    /// unknown cell indices are skipped with a diagnostic; identity and
    /// position are never touched.
    pub fn apply(&self, scene: &mut Scene) -> TurnRecord {
        if self.cells.len() != scene.cell_count() {
            warn!(
                snapshot = self.cells.len(),
                scene = scene.cell_count(),
                "snapshot cell count mismatch; applying common prefix"
            );
        }

        let now = scene.now_ms();
        for record in &self.cells {
            let Some(cell) = scene.cell_mut(CellId::new(record.index)) else {
                continue;
            };
            cell.faction = record.faction;
            cell.points = record.points;
            cell.frozen_until = (record.frozen_ms > 0).then(|| now + record.frozen_ms);
        }

        let cell_count = scene.cell_count() as u16;
        let bridges = self
            .bridges
            .iter()
            .filter(|record| {
                let ok = record.source < cell_count
                    && record.target < cell_count
                    && record.source != record.target;
                if !ok {
                    warn!(source = record.source, target = record.target, "snapshot bridge endpoints out of range; dropped");
                }
                ok
            })
            .map(|record| {
                let mut bridge = Bridge::new(
                    CellId::new(record.source),
                    CellId::new(record.target),
                    record.faction,
                    record.cost,
                );
                bridge.dots = SmallVec::from_vec(record.dots.clone());
                bridge
            })
            .collect();
        scene.replace_bridges(bridges);

        self.turn
    }

    /// Serialize to the compact JSON used on the wire and on disk.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a snapshot back from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SimConfig;

    fn populated_scene() -> Scene {
        let mut scene = Scene::new(SimConfig::default());
        let a = scene.add_cell(0.0, 0.0, Faction::Player, 30);
        let b = scene.add_cell(80.0, 0.0, Faction::Enemy, 12);
        let c = scene.add_cell(0.0, 80.0, Faction::Neutral, 0);
        scene.create_bridge(a, b, Faction::Player, 2);
        scene.create_bridge(a, c, Faction::Player, 2);
        scene.freeze_cell(b, 4_000);
        scene
    }

    fn turn() -> TurnRecord {
        TurnRecord {
            active: Some(Faction::Player),
            remaining_seconds: 17,
        }
    }

    #[test]
    fn test_round_trip_reproduces_state() {
        let scene = populated_scene();
        let snapshot = SceneSnapshot::capture(&scene, turn());

        let mut restored = populated_scene();
        // Disturb mutable state before applying.
        restored.set_cell_status(CellId::new(0), Faction::Enemy, 1, 0);
        restored.remove_bridge(CellId::new(0), CellId::new(1));

        let applied_turn = snapshot.apply(&mut restored);

        assert_eq!(applied_turn, turn());
        for (before, after) in scene.cells().zip(restored.cells()) {
            assert_eq!(before.faction, after.faction);
            assert_eq!(before.points, after.points);
        }
        assert_eq!(scene.bridges().len(), restored.bridges().len());
    }

    #[test]
    fn test_json_round_trip() {
        let scene = populated_scene();
        let snapshot = SceneSnapshot::capture(&scene, turn());

        let json = snapshot.to_json().unwrap();
        let back = SceneSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn test_apply_never_moves_cells() {
        let scene = populated_scene();
        let mut snapshot = SceneSnapshot::capture(&scene, turn());
        for record in &mut snapshot.cells {
            record.x += 500.0;
        }

        let mut restored = populated_scene();
        snapshot.apply(&mut restored);
        assert_eq!(restored.cell(CellId::new(0)).unwrap().x(), 0.0);
    }

    #[test]
    fn test_apply_drops_out_of_range_bridges() {
        let scene = populated_scene();
        let mut snapshot = SceneSnapshot::capture(&scene, turn());
        snapshot.bridges.push(BridgeRecord {
            source: 0,
            target: 99,
            faction: Faction::Player,
            cost: 1,
            dots: vec![],
        });

        let mut restored = populated_scene();
        snapshot.apply(&mut restored);
        assert_eq!(restored.bridges().len(), scene.bridges().len());
    }

    #[test]
    fn test_freeze_travels_as_remaining_duration() {
        let scene = populated_scene();
        let snapshot = SceneSnapshot::capture(&scene, turn());
        let frozen = &snapshot.cells[1];
        assert!(frozen.frozen_ms > 0 && frozen.frozen_ms <= 4_000);
    }
}
