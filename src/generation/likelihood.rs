//! Log-likelihood extraction for augmentation candidates.
//!
//! The initial round decodes the gold test set plus the candidate pool. The
//! candidates' hypothesis scores are cached here so later rounds can select
//! from them without re-reading the log.

use super::GenerationLog;
use crate::models::{AugmentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Persisted id → confidence mapping for the candidate pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLikelihoods {
    /// Language the scores were extracted for
    pub language: String,

    /// Ids below this belong to the gold test set
    pub gold_count: usize,

    /// Candidate id → hypothesis log-likelihood
    pub scores: BTreeMap<usize, f64>,

    pub extracted_at: DateTime<Utc>,
}

impl LogLikelihoods {
    /// Extract candidate scores from a generation log.
    ///
    /// Fails with `CountMismatch` unless exactly `expected_pool` candidates
    /// are present, and with `InvalidInput` on non-finite scores.
    pub fn extract(
        language: &str,
        log: &GenerationLog,
        gold_count: usize,
        expected_pool: usize,
    ) -> Result<Self> {
        let mut scores = BTreeMap::new();
        for record in log.candidates(gold_count) {
            if !record.confidence.is_finite() {
                return Err(AugmentError::InvalidInput(format!(
                    "non-finite log-likelihood {} for example {}",
                    record.confidence, record.id
                )));
            }
            scores.insert(record.id, record.confidence);
        }

        if scores.len() != expected_pool {
            return Err(AugmentError::count_mismatch(
                "augmentation candidates in initial generation log",
                expected_pool,
                scores.len(),
            ));
        }

        info!(language, candidates = scores.len(), "Extracted log-likelihoods");
        Ok(Self {
            language: language.to_string(),
            gold_count,
            scores,
            extracted_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Save as JSON (write to temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AugmentError::io("creating log-likelihood cache dir", e))?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| {
            AugmentError::Internal(format!("Serializing log-likelihoods: {e}"))
        })?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .map_err(|e| AugmentError::io("writing log-likelihood cache", e))?;
        fs::rename(&temp_path, path)
            .map_err(|e| AugmentError::io("renaming log-likelihood cache", e))?;

        info!(path = %path.display(), "Saved log-likelihood cache");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AugmentError::io(
                format!("reading log-likelihood cache {}", path.display()),
                e,
            )
        })?;
        serde_json::from_str(&content)
            .map_err(|e| AugmentError::ParseError(format!("Invalid log-likelihood cache: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::test_fixtures::{block, log_of};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn log(gold: usize, pool: usize) -> GenerationLog {
        let blocks: Vec<String> = (0..gold + pool)
            .map(|id| block(id, "ab", "ab", -(id as f64) * 0.25))
            .collect();
        GenerationLog::from_reader(Cursor::new(log_of(&blocks))).unwrap()
    }

    #[test]
    fn test_extract_full_pool() {
        let cache = LogLikelihoods::extract("kat", &log(3, 10_000), 3, 10_000).unwrap();
        assert_eq!(cache.len(), 10_000);
        assert!(!cache.scores.contains_key(&2));
        assert_eq!(cache.scores.get(&3), Some(&-0.75));
    }

    #[test]
    fn test_extract_short_pool_fails() {
        let err = LogLikelihoods::extract("kat", &log(3, 9_999), 3, 10_000).unwrap_err();
        assert!(matches!(
            err,
            AugmentError::CountMismatch {
                expected: 10_000,
                actual: 9_999,
                ..
            }
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("initial").join("kat_log_likelihoods.json");
        let cache = LogLikelihoods::extract("kat", &log(2, 3), 2, 3).unwrap();

        cache.save(&path).unwrap();
        let loaded = LogLikelihoods::load(&path).unwrap();
        assert_eq!(loaded, cache);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
