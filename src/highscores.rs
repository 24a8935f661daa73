//! High score table
//!
//! Persisted through the key/value store, tracks the top 10 scores per script.

use serde::{Deserialize, Serialize};

use crate::persistence::{KeyValueStore, StoreError, load_json, save_json};

/// Maximum number of high scores to keep
pub const MAX_HIGH_SCORES: usize = 10;

/// A single high score entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighScoreEntry {
    pub score: i32,
    /// Levels cleared
    pub levels: u32,
    /// Total misses over the game
    pub misses: u32,
    /// Game time in ms
    pub time_ms: u64,
}

/// High score table for one script
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HighScores {
    pub entries: Vec<HighScoreEntry>,
}

impl HighScores {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn storage_key(script: &str) -> String {
        format!("highscores.{script}")
    }

    /// Check if a score qualifies for the table
    pub fn qualifies(&self, score: i32) -> bool {
        if score <= 0 {
            return false;
        }
        if self.entries.len() < MAX_HIGH_SCORES {
            return true;
        }
        self.entries.last().is_none_or(|e| score > e.score)
    }

    /// Rank a score would achieve (1-indexed, None if it doesn't qualify)
    pub fn potential_rank(&self, score: i32) -> Option<usize> {
        if !self.qualifies(score) {
            return None;
        }
        let rank = self.entries.iter().position(|e| score > e.score);
        Some(rank.unwrap_or(self.entries.len()) + 1)
    }

    /// Insert an entry if it qualifies. Returns the rank achieved.
    pub fn add(&mut self, entry: HighScoreEntry) -> Option<usize> {
        let rank = self.potential_rank(entry.score)?;
        self.entries.insert(rank - 1, entry);
        self.entries.truncate(MAX_HIGH_SCORES);
        Some(rank)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top_score(&self) -> Option<i32> {
        self.entries.first().map(|e| e.score)
    }

    pub fn load(store: &impl KeyValueStore, script: &str) -> Self {
        match load_json::<HighScores>(store, &Self::storage_key(script)) {
            Some(scores) => {
                log::info!("Loaded {} high scores for '{script}'", scores.entries.len());
                scores
            }
            None => Self::new(),
        }
    }

    pub fn save(&self, store: &mut impl KeyValueStore, script: &str) -> Result<(), StoreError> {
        save_json(store, &Self::storage_key(script), self)?;
        log::info!("High scores saved ({} entries)", self.entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use proptest::prelude::*;

    fn entry(score: i32) -> HighScoreEntry {
        HighScoreEntry {
            score,
            levels: 1,
            misses: 0,
            time_ms: 1000,
        }
    }

    #[test]
    fn test_zero_never_qualifies() {
        let scores = HighScores::new();
        assert!(!scores.qualifies(0));
        assert!(scores.qualifies(1));
    }

    #[test]
    fn test_full_table_rejects_low_score() {
        let mut scores = HighScores::new();
        for s in 1..=10 {
            scores.add(entry(s * 10));
        }
        assert_eq!(scores.add(entry(5)), None);
        assert_eq!(scores.add(entry(55)), Some(6));
        assert_eq!(scores.entries.len(), MAX_HIGH_SCORES);
        assert_eq!(scores.entries.last().map(|e| e.score), Some(20));
    }

    #[test]
    fn test_tables_are_per_script() {
        let mut store = MemoryStore::new();
        let mut scores = HighScores::new();
        scores.add(entry(300));
        scores.save(&mut store, "demo").unwrap();

        assert_eq!(HighScores::load(&store, "demo").top_score(), Some(300));
        assert!(HighScores::load(&store, "other").is_empty());
    }

    proptest! {
        #[test]
        fn test_entries_stay_sorted(values in prop::collection::vec(1i32..10_000, 0..30)) {
            let mut scores = HighScores::new();
            for v in values {
                scores.add(entry(v));
            }
            prop_assert!(scores.entries.len() <= MAX_HIGH_SCORES);
            prop_assert!(scores.entries.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}
