//! Augmentation pool and selected subsets.

use crate::generation::LogLikelihoods;
use crate::models::{AugmentError, Example, Result, Split};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One augmentation candidate: a generated example with its model score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Generation id (row index in the initial generation frame)
    pub id: usize,

    /// Model log-likelihood; lower means more surprising to the model
    pub confidence: f64,

    /// The example materialized from the generation frame
    pub example: Example,
}

/// Candidates available for selection, ordered by id.
///
/// Ids are unique and all at or above the gold test count.
#[derive(Debug, Clone)]
pub struct AugmentationPool {
    candidates: Vec<Candidate>,
}

impl AugmentationPool {
    /// Build a pool, validating ids and scores.
    pub fn new(mut candidates: Vec<Candidate>, gold_count: usize) -> Result<Self> {
        let mut seen = HashSet::with_capacity(candidates.len());
        for candidate in &candidates {
            if candidate.id < gold_count {
                return Err(AugmentError::InvalidInput(format!(
                    "candidate id {} belongs to the gold test set (< {gold_count})",
                    candidate.id
                )));
            }
            if !seen.insert(candidate.id) {
                return Err(AugmentError::InvalidInput(format!(
                    "duplicate candidate id {}",
                    candidate.id
                )));
            }
            if !candidate.confidence.is_finite() {
                return Err(AugmentError::InvalidInput(format!(
                    "non-finite confidence for candidate {}",
                    candidate.id
                )));
            }
        }
        candidates.sort_by_key(|c| c.id);
        Ok(Self { candidates })
    }

    /// Join cached scores with the generation frame they were decoded from.
    ///
    /// `frame` must be the initial round's `test` split (gold test rows, then
    /// the candidate pool) and `gold_count` the current gold test size.
    pub fn from_log_likelihoods(
        cache: &LogLikelihoods,
        frame: &Split,
        gold_count: usize,
    ) -> Result<Self> {
        if cache.gold_count != gold_count {
            return Err(AugmentError::count_mismatch(
                "gold test examples (cache vs corpus)",
                gold_count,
                cache.gold_count,
            ));
        }
        let expected_rows = gold_count + cache.len();
        if frame.len() != expected_rows {
            return Err(AugmentError::count_mismatch(
                "generation frame rows",
                expected_rows,
                frame.len(),
            ));
        }

        let candidates = cache
            .scores
            .iter()
            .map(|(&id, &confidence)| {
                let example = frame.examples.get(id).cloned().ok_or_else(|| {
                    AugmentError::InvalidInput(format!(
                        "cached id {id} is outside the generation frame ({} rows)",
                        frame.len()
                    ))
                })?;
                Ok(Candidate {
                    id,
                    confidence,
                    example,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(candidates, gold_count)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Candidates chosen for one augmentation round, in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSubset {
    strategy: &'static str,
    candidates: Vec<Candidate>,
}

impl SelectedSubset {
    /// Wrap selected candidates; fails on duplicate ids.
    pub fn new(strategy: &'static str, candidates: Vec<Candidate>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(candidates.len());
        if let Some(dup) = candidates.iter().find(|c| !seen.insert(c.id)) {
            return Err(AugmentError::Internal(format!(
                "strategy '{strategy}' selected id {} twice",
                dup.id
            )));
        }
        Ok(Self {
            strategy,
            candidates,
        })
    }

    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn ids(&self) -> Vec<usize> {
        self.candidates.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The selected examples, ready to append to `train-low`.
    pub fn into_examples(self) -> Vec<Example> {
        self.candidates.into_iter().map(|c| c.example).collect()
    }
}
