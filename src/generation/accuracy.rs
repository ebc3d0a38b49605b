//! Exact-match accuracy over the gold evaluation set.

use super::GenerationLog;
use crate::models::{AugmentError, Result};
use serde::{Deserialize, Serialize};

/// Accuracy of one evaluated round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Hypotheses identical to their gold form
    pub correct: usize,

    /// Gold examples evaluated
    pub total: usize,

    /// `correct / total` (0.0 when nothing was evaluated)
    pub accuracy: f64,
}

/// Exact-string-match accuracy over `(hypothesis, gold)` pairs.
///
/// Fails with `CountMismatch` unless exactly `expected_total` pairs are given.
pub fn exact_match_accuracy<'a, I>(pairs: I, expected_total: usize) -> Result<AccuracyReport>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let (correct, total) = pairs
        .into_iter()
        .fold((0usize, 0usize), |(correct, total), (hypothesis, gold)| {
            (correct + usize::from(hypothesis == gold), total + 1)
        });

    if total != expected_total {
        return Err(AugmentError::count_mismatch(
            "evaluated gold examples",
            expected_total,
            total,
        ));
    }

    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };
    Ok(AccuracyReport {
        correct,
        total,
        accuracy,
    })
}

/// Accuracy of a generation log over its first `gold_count` ids.
pub fn log_accuracy(log: &GenerationLog, gold_count: usize) -> Result<AccuracyReport> {
    let gold = log.gold(gold_count)?;
    exact_match_accuracy(
        gold.iter()
            .map(|r| (r.hypothesis.as_str(), r.gold.as_str())),
        gold_count,
    )
}
