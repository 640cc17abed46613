//! Snapshot chunking and reassembly.
//!
//! A serialized snapshot can exceed a single frame's practical size, so it is
//! serialized once and split into numbered parts. The receiver buffers parts
//! by index until the set is complete, then reassembles atomically.
//!
//! Partial sets are retained only for a bounded window — an abandoned
//! snapshot is a recoverable loss (the next resync replaces it), not a leak.
//! Chunks for an id at or below the completed watermark arrive after their
//! set was already applied and are dropped with a diagnostic.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::message::Message;

/// Split one serialized snapshot into wire messages.
///
/// Small snapshots travel as a single `snapshot_full`; anything larger
/// becomes a `snapshot_part` sequence. Chunks break on char boundaries so
/// the payload stays valid UTF-8.
#[must_use]
pub fn split_snapshot(id: u32, json: &str, chunk_bytes: usize) -> Vec<Message> {
    let chunk_bytes = chunk_bytes.max(1);
    if json.len() <= chunk_bytes {
        return vec![Message::SnapshotFull {
            id,
            payload: json.to_string(),
        }];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::with_capacity(chunk_bytes);
    for ch in json.chars() {
        if current.len() + ch.len_utf8() > chunk_bytes {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let total = chunks.len() as u16;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, payload)| Message::SnapshotPart {
            id,
            index: index as u16,
            total,
            payload,
        })
        .collect()
}

#[derive(Debug)]
struct PartialSnapshot {
    total: u16,
    parts: FxHashMap<u16, String>,
    first_seen_ms: u64,
}

/// Buffers snapshot parts until each set completes.
#[derive(Debug)]
pub struct SnapshotAssembler {
    retention_ms: u64,
    partial: FxHashMap<u32, PartialSnapshot>,
    completed_watermark: Option<u32>,
}

impl SnapshotAssembler {
    /// Create an assembler with the given partial-set retention window.
    #[must_use]
    pub fn new(retention_ms: u64) -> Self {
        Self {
            retention_ms,
            partial: FxHashMap::default(),
            completed_watermark: None,
        }
    }

    fn is_stale(&self, id: u32) -> bool {
        self.completed_watermark.is_some_and(|mark| id <= mark)
    }

    fn mark_completed(&mut self, id: u32) {
        self.completed_watermark = Some(self.completed_watermark.map_or(id, |mark| mark.max(id)));
        self.partial.remove(&id);
    }

    /// Accept an unsplit snapshot. Returns the payload unless it is stale.
    pub fn accept_full(&mut self, id: u32, payload: String) -> Option<String> {
        if self.is_stale(id) {
            warn!(id, "snapshot arrived after a newer set completed; dropped");
            return None;
        }
        self.mark_completed(id);
        Some(payload)
    }

    /// Accept one part; returns the reassembled payload on completion.
    ///
    /// Order doesn't matter and duplicate parts are harmless. Parts that
    /// contradict the set's advertised total, or belong to an
    /// already-completed set, are dropped with a diagnostic.
    pub fn accept_part(
        &mut self,
        id: u32,
        index: u16,
        total: u16,
        payload: String,
        now_ms: u64,
    ) -> Option<String> {
        if self.is_stale(id) {
            warn!(id, index, "chunk for completed snapshot; dropped");
            return None;
        }
        if total == 0 || index >= total {
            warn!(id, index, total, "chunk indices out of range; dropped");
            return None;
        }

        let entry = self.partial.entry(id).or_insert_with(|| PartialSnapshot {
            total,
            parts: FxHashMap::default(),
            first_seen_ms: now_ms,
        });
        if entry.total != total {
            warn!(id, "chunk contradicts the set's advertised total; dropped");
            return None;
        }
        entry.parts.insert(index, payload);

        if entry.parts.len() < total as usize {
            return None;
        }

        let Some(mut set) = self.partial.remove(&id) else {
            return None;
        };
        let mut assembled = String::new();
        for index in 0..total {
            assembled.push_str(&set.parts.remove(&index)?);
        }
        debug!(id, total, "snapshot reassembled");
        self.mark_completed(id);
        Some(assembled)
    }

    /// Drop partial sets older than the retention window. Returns how many
    /// were abandoned.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let retention = self.retention_ms;
        let before = self.partial.len();
        self.partial.retain(|id, set| {
            let keep = now_ms.saturating_sub(set.first_seen_ms) < retention;
            if !keep {
                warn!(id, "partial snapshot abandoned after retention window");
            }
            keep
        });
        before - self.partial.len()
    }

    /// Number of in-flight partial sets.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts_of(messages: Vec<Message>) -> Vec<(u32, u16, u16, String)> {
        messages
            .into_iter()
            .map(|msg| match msg {
                Message::SnapshotPart {
                    id,
                    index,
                    total,
                    payload,
                } => (id, index, total, payload),
                other => panic!("expected part, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_small_snapshot_travels_whole() {
        let messages = split_snapshot(1, "tiny", 100);
        assert_eq!(
            messages,
            vec![Message::SnapshotFull {
                id: 1,
                payload: "tiny".to_string()
            }]
        );
    }

    #[test]
    fn test_split_and_reassemble() {
        let json = "x".repeat(2_500);
        let messages = split_snapshot(7, &json, 900);
        let parts = parts_of(messages);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|(_, _, total, _)| *total == 3));

        let mut assembler = SnapshotAssembler::new(10_000);
        let mut result = None;
        for (id, index, total, payload) in parts {
            result = assembler.accept_part(id, index, total, payload, 0);
        }
        assert_eq!(result.unwrap(), json);
    }

    #[test]
    fn test_out_of_order_parts_reassemble() {
        let json: String = ('a'..='z').cycle().take(2_000).collect();
        let mut parts = parts_of(split_snapshot(3, &json, 700));
        // Deliver 3-of-3 first, then 1, then 2.
        parts.rotate_left(2);

        let mut assembler = SnapshotAssembler::new(10_000);
        let mut result = None;
        for (id, index, total, payload) in parts {
            result = assembler.accept_part(id, index, total, payload, 0);
        }
        assert_eq!(result.unwrap(), json);
    }

    #[test]
    fn test_late_chunk_for_completed_set_dropped() {
        let json = "y".repeat(1_500);
        let parts = parts_of(split_snapshot(5, &json, 900));

        let mut assembler = SnapshotAssembler::new(10_000);
        for (id, index, total, payload) in parts.clone() {
            assembler.accept_part(id, index, total, payload, 0);
        }

        // A straggler duplicate of part 0 must not resurrect the set.
        let (id, index, total, payload) = parts[0].clone();
        assert!(assembler.accept_part(id, index, total, payload, 0).is_none());
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_partial_set_expires() {
        let json = "z".repeat(1_500);
        let parts = parts_of(split_snapshot(9, &json, 900));

        let mut assembler = SnapshotAssembler::new(1_000);
        let (id, index, total, payload) = parts[0].clone();
        assembler.accept_part(id, index, total, payload, 0);
        assert_eq!(assembler.pending(), 1);

        assert_eq!(assembler.expire(500), 0);
        assert_eq!(assembler.expire(1_200), 1);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_contradictory_total_dropped() {
        let mut assembler = SnapshotAssembler::new(10_000);
        assembler.accept_part(1, 0, 3, "a".to_string(), 0);
        assert!(assembler.accept_part(1, 1, 4, "b".to_string(), 0).is_none());
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_duplicate_part_is_harmless() {
        let json = "q".repeat(1_500);
        let parts = parts_of(split_snapshot(2, &json, 900));

        let mut assembler = SnapshotAssembler::new(10_000);
        let (id, index, total, payload) = parts[0].clone();
        assembler.accept_part(id, index, total, payload.clone(), 0);
        assembler.accept_part(id, index, total, payload, 0);
        assert_eq!(assembler.pending(), 1);

        let (id, index, total, payload) = parts[1].clone();
        let result = assembler.accept_part(id, index, total, payload, 0);
        assert_eq!(result.unwrap(), json);
    }
}
