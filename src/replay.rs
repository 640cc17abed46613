//! Replay persistence: the only externally durable format.
//!
//! Consumers replay sessions from this record, so its field names and the
//! four event categories are a contract: `bridge_created`, `bridge_removed`,
//! `point_status`, `final_result`. Timestamps are monotonic milliseconds on
//! the sim clock; descriptions are human-readable.
//!
//! Quicksave captures the live scene into this format; quickload restores
//! mutable state through the same apply path snapshots use.

use std::path::Path;

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::core::{CellId, Faction};
use crate::error::PersistError;
use crate::scene::{
    BridgeRecord, CellRecord, Move, Outcome, Scene, SceneSnapshot, TurnRecord,
};

/// The four event categories replay consumers depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayCategory {
    BridgeCreated,
    BridgeRemoved,
    PointStatus,
    FinalResult,
}

/// One logged event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub timestamp_ms: u64,
    pub category: ReplayCategory,
    pub description: String,
}

/// Append-only event log for the running session.
#[derive(Clone, Debug, Default)]
pub struct ReplayLog {
    entries: Vector<ReplayEntry>,
}

impl ReplayLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Timestamps are forced monotonic.
    pub fn record(&mut self, timestamp_ms: u64, category: ReplayCategory, description: String) {
        let timestamp_ms = self
            .entries
            .back()
            .map_or(timestamp_ms, |last| last.timestamp_ms.max(timestamp_ms));
        self.entries.push_back(ReplayEntry {
            timestamp_ms,
            category,
            description,
        });
    }

    /// A bridge went up.
    pub fn log_bridge_created(&mut self, now_ms: u64, faction: Faction, mv: &Move) {
        self.record(
            now_ms,
            ReplayCategory::BridgeCreated,
            format!(
                "{} bridge {} -> {} (cost {})",
                faction,
                mv.source.raw(),
                mv.target.raw(),
                mv.cost
            ),
        );
    }

    /// A bridge came down.
    pub fn log_bridge_removed(
        &mut self,
        now_ms: u64,
        faction: Faction,
        source: CellId,
        target: CellId,
    ) {
        self.record(
            now_ms,
            ReplayCategory::BridgeRemoved,
            format!("{} bridge {} -> {} removed", faction, source.raw(), target.raw()),
        );
    }

    /// Periodic points-per-faction status line.
    pub fn log_point_status(&mut self, now_ms: u64, scene: &Scene) {
        let mut player = 0u32;
        let mut enemy = 0u32;
        for cell in scene.cells() {
            match cell.faction {
                Faction::Player => player += cell.points,
                Faction::Enemy => enemy += cell.points,
                Faction::Neutral => {}
            }
        }
        self.record(
            now_ms,
            ReplayCategory::PointStatus,
            format!("points: player {player}, enemy {enemy}"),
        );
    }

    /// Terminal result line.
    pub fn log_final(&mut self, now_ms: u64, outcome: Outcome) {
        let description = match outcome {
            Outcome::PlayerEliminated => "player eliminated; enemy wins".to_string(),
            Outcome::EnemyEliminated => "enemy eliminated; player wins".to_string(),
            Outcome::Ongoing => "session ended while ongoing".to_string(),
        };
        self.record(now_ms, ReplayCategory::FinalResult, description);
    }

    /// Iterate over entries in order.
    pub fn entries(&self) -> impl Iterator<Item = &ReplayEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The durable record: ordered cells, ordered bridges by endpoint index,
/// turn state, and the event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub cells: Vec<CellRecord>,
    pub bridges: Vec<BridgeRecord>,
    pub turn: TurnRecord,
    pub log: Vec<ReplayEntry>,
}

impl ReplayRecord {
    /// Capture the live session.
    #[must_use]
    pub fn capture(scene: &Scene, turn: TurnRecord, log: &ReplayLog) -> Self {
        let snapshot = SceneSnapshot::capture(scene, turn);
        Self {
            cells: snapshot.cells,
            bridges: snapshot.bridges,
            turn,
            log: log.entries().cloned().collect(),
        }
    }

    /// Restore mutable scene state. Fails if the record references a cell
    /// the scene doesn't have; the scene is untouched in that case.
    pub fn restore(&self, scene: &mut Scene) -> Result<TurnRecord, PersistError> {
        let cell_count = scene.cell_count() as u16;
        if let Some(bad) = self.cells.iter().find(|record| record.index >= cell_count) {
            return Err(PersistError::UnknownCell(bad.index));
        }
        let snapshot = SceneSnapshot {
            cells: self.cells.clone(),
            bridges: self.bridges.clone(),
            turn: self.turn,
        };
        Ok(snapshot.apply(scene))
    }

    /// Serialize to the durable JSON form.
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record back.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the record to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), PersistError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a record from disk.
    pub fn load_from(path: &Path) -> Result<Self, PersistError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SimConfig;

    fn session() -> (Scene, ReplayLog) {
        let mut scene = Scene::new(SimConfig::default());
        let a = scene.add_cell(0.0, 0.0, Faction::Player, 30);
        let b = scene.add_cell(80.0, 0.0, Faction::Enemy, 12);
        scene.create_bridge(a, b, Faction::Player, 2);

        let mut log = ReplayLog::new();
        log.log_bridge_created(
            1_000,
            Faction::Player,
            &Move {
                source: a,
                target: b,
                cost: 2,
            },
        );
        log.log_point_status(2_000, &scene);
        (scene, log)
    }

    #[test]
    fn test_category_names_are_the_contract() {
        let names: Vec<String> = [
            ReplayCategory::BridgeCreated,
            ReplayCategory::BridgeRemoved,
            ReplayCategory::PointStatus,
            ReplayCategory::FinalResult,
        ]
        .iter()
        .map(|category| serde_json::to_string(category).unwrap())
        .collect();

        assert_eq!(
            names,
            vec![
                "\"bridge_created\"",
                "\"bridge_removed\"",
                "\"point_status\"",
                "\"final_result\""
            ]
        );
    }

    #[test]
    fn test_timestamps_forced_monotonic() {
        let mut log = ReplayLog::new();
        log.record(500, ReplayCategory::PointStatus, "a".to_string());
        log.record(200, ReplayCategory::PointStatus, "b".to_string());

        let stamps: Vec<u64> = log.entries().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![500, 500]);
    }

    #[test]
    fn test_descriptions_are_readable() {
        let (_, log) = session();
        let descriptions: Vec<&str> = log.entries().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions[0], "player bridge 0 -> 1 (cost 2)");
        assert_eq!(descriptions[1], "points: player 30, enemy 12");
    }

    #[test]
    fn test_record_round_trip() {
        let (scene, log) = session();
        let turn = TurnRecord {
            active: Some(Faction::Player),
            remaining_seconds: 21,
        };

        let record = ReplayRecord::capture(&scene, turn, &log);
        let json = record.to_json().unwrap();
        let back = ReplayRecord::from_json(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_restore_rebuilds_scene_state() {
        let (scene, log) = session();
        let turn = TurnRecord {
            active: Some(Faction::Enemy),
            remaining_seconds: 9,
        };
        let record = ReplayRecord::capture(&scene, turn, &log);

        // Same layout, different mutable state.
        let mut target = Scene::new(SimConfig::default());
        target.add_cell(0.0, 0.0, Faction::Enemy, 1);
        target.add_cell(80.0, 0.0, Faction::Enemy, 1);

        let restored_turn = record.restore(&mut target).unwrap();
        assert_eq!(restored_turn, turn);
        assert_eq!(target.cell(CellId::new(0)).unwrap().points, 30);
        assert_eq!(target.cell(CellId::new(0)).unwrap().faction, Faction::Player);
        assert_eq!(target.bridges().len(), 1);
    }

    #[test]
    fn test_restore_rejects_unknown_cells() {
        let (scene, log) = session();
        let record = ReplayRecord::capture(
            &scene,
            TurnRecord {
                active: None,
                remaining_seconds: 0,
            },
            &log,
        );

        let mut tiny = Scene::new(SimConfig::default());
        tiny.add_cell(0.0, 0.0, Faction::Player, 5);

        assert!(matches!(
            record.restore(&mut tiny),
            Err(PersistError::UnknownCell(1))
        ));
    }

    #[test]
    fn test_final_result_wording() {
        let mut log = ReplayLog::new();
        log.log_final(9_000, Outcome::EnemyEliminated);
        let entry = log.entries().next().unwrap();
        assert_eq!(entry.category, ReplayCategory::FinalResult);
        assert_eq!(entry.description, "enemy eliminated; player wins");
    }
}
