//! The committed turn record of a session.
//!
//! Turns are keyed by their server-assigned sequence index. Commits are
//! idempotent (first writer wins) and snapshots are always ordered by index,
//! whatever order the commits arrived in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable committed utterance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    #[serde(rename = "seq_index", alias = "sequence_index")]
    pub sequence_index: u64,
    pub speaker_name: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Turn {
    pub fn new(sequence_index: u64, speaker_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sequence_index,
            speaker_name: speaker_name.into(),
            text: text.into(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TurnLog {
    turns: BTreeMap<u64, Turn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a turn. Returns `false` (and changes nothing) when a turn with
    /// the same sequence index is already recorded.
    pub fn commit(&mut self, turn: Turn) -> bool {
        if self.turns.contains_key(&turn.sequence_index) {
            return false;
        }
        self.turns.insert(turn.sequence_index, turn);
        true
    }

    pub fn has(&self, sequence_index: u64) -> bool {
        self.turns.contains_key(&sequence_index)
    }

    /// All committed turns, ascending by sequence index.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Highest committed sequence index.
    pub fn last_index(&self) -> Option<u64> {
        self.turns.keys().next_back().copied()
    }
}

impl FromIterator<Turn> for TurnLog {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        let mut log = TurnLog::new();
        for turn in iter {
            log.commit(turn);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(log: &TurnLog) -> Vec<u64> {
        log.snapshot().iter().map(|t| t.sequence_index).collect()
    }

    #[test]
    fn test_snapshot_sorted_regardless_of_commit_order() {
        let mut log = TurnLog::new();
        for i in [4, 0, 3, 1, 2] {
            assert!(log.commit(Turn::new(i, "Pro", format!("turn {}", i))));
        }
        assert_eq!(indices(&log), vec![0, 1, 2, 3, 4]);
        assert_eq!(log.last_index(), Some(4));
    }

    #[test]
    fn test_duplicate_commit_is_noop() {
        let mut log = TurnLog::new();
        assert!(log.commit(Turn::new(0, "Pro", "same")));
        let before = log.snapshot();
        assert!(!log.commit(Turn::new(0, "Pro", "same")));
        assert_eq!(log.snapshot(), before);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut log = TurnLog::new();
        log.commit(Turn::new(0, "Pro", "first"));
        log.commit(Turn::new(0, "Con", "second"));
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "first");
        assert_eq!(snapshot[0].speaker_name, "Pro");
    }

    #[test]
    fn test_shuffled_duplicates_keep_each_index_once() {
        let deliveries = [5, 2, 2, 9, 0, 5, 1, 9, 0, 3];
        let log: TurnLog = deliveries.iter().map(|&i| Turn::new(i, "S", "t")).collect();
        assert_eq!(indices(&log), vec![0, 1, 2, 3, 5, 9]);
        assert!(log.has(9));
        assert!(!log.has(4));
    }

    #[test]
    fn test_turn_accepts_both_index_spellings() {
        let a: Turn = serde_json::from_str(r#"{"seq_index":3,"speaker_name":"Pro","text":"x"}"#).unwrap();
        let b: Turn =
            serde_json::from_str(r#"{"sequence_index":3,"speaker_name":"Pro","text":"x","created_at":"2025-01-01T00:00:00"}"#)
                .unwrap();
        assert_eq!(a.sequence_index, 3);
        assert_eq!(b.sequence_index, 3);
        assert_eq!(b.created_at.as_deref(), Some("2025-01-01T00:00:00"));
    }
}
