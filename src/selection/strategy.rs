//! Subset selection strategies.
//!
//! Every strategy ranks the pool by its own rule and returns at most `k`
//! distinct candidates. Callers go through [`select_subset`], which applies
//! the configured policy for pools smaller than `k`, so strategies can be
//! swapped without touching call sites.

use super::{AugmentationPool, Candidate, SelectedSubset};
use crate::models::{AugmentError, PoolShortfall, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// A rule for choosing `k` candidates from a pool.
pub trait SubsetSelector {
    /// Strategy name recorded alongside the selection.
    fn name(&self) -> &'static str;

    /// Choose `min(k, pool.len())` distinct candidates.
    fn select(&self, pool: &AugmentationPool, k: usize) -> Result<SelectedSubset>;
}

/// Lowest confidence first, ties by ascending id.
fn hardest_first(a: &Candidate, b: &Candidate) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| a.id.cmp(&b.id))
}

fn ranked_subset(
    name: &'static str,
    pool: &AugmentationPool,
    k: usize,
    cmp: impl FnMut(&&Candidate, &&Candidate) -> Ordering,
) -> Result<SelectedSubset> {
    let mut ranked: Vec<&Candidate> = pool.candidates().iter().collect();
    ranked.sort_by(cmp);
    SelectedSubset::new(name, ranked.into_iter().take(k).cloned().collect())
}

/// Candidates the model is least sure about: the highest-loss examples are
/// presumed the most informative additions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestLoss;

impl SubsetSelector for HighestLoss {
    fn name(&self) -> &'static str {
        "highest_loss"
    }

    fn select(&self, pool: &AugmentationPool, k: usize) -> Result<SelectedSubset> {
        ranked_subset(self.name(), pool, k, |a, b| hardest_first(a, b))
    }
}

/// Candidates the model finds most natural (highest confidence).
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestLoss;

impl SubsetSelector for LowestLoss {
    fn name(&self) -> &'static str {
        "lowest_loss"
    }

    fn select(&self, pool: &AugmentationPool, k: usize) -> Result<SelectedSubset> {
        ranked_subset(self.name(), pool, k, |a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
        })
    }
}

/// Uniform sample without replacement, reproducible from the seed.
#[derive(Debug, Clone, Copy)]
pub struct RandomSample {
    pub seed: u64,
}

impl SubsetSelector for RandomSample {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, pool: &AugmentationPool, k: usize) -> Result<SelectedSubset> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let chosen = pool
            .candidates()
            .choose_multiple(&mut rng, k)
            .cloned()
            .collect();
        SelectedSubset::new(self.name(), chosen)
    }
}

/// Round-robin over morphological tags, hardest candidate of each tag first.
///
/// Keeps rare paradigm cells represented instead of letting one tag with
/// many low-confidence candidates fill the subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct StratifiedByTag;

impl SubsetSelector for StratifiedByTag {
    fn name(&self) -> &'static str {
        "stratified"
    }

    fn select(&self, pool: &AugmentationPool, k: usize) -> Result<SelectedSubset> {
        let mut by_tag: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
        for candidate in pool.candidates() {
            by_tag
                .entry(candidate.example.tag.as_str())
                .or_default()
                .push(candidate);
        }

        let mut queues: Vec<std::vec::IntoIter<&Candidate>> = by_tag
            .into_values()
            .map(|mut group| {
                group.sort_by(|a, b| hardest_first(a, b));
                group.into_iter()
            })
            .collect();

        let target = k.min(pool.len());
        let mut chosen = Vec::with_capacity(target);
        while chosen.len() < target {
            for queue in queues.iter_mut() {
                if chosen.len() == target {
                    break;
                }
                if let Some(candidate) = queue.next() {
                    chosen.push(candidate.clone());
                }
            }
        }

        SelectedSubset::new(self.name(), chosen)
    }
}

/// Named strategies, resolved from the round's augmentation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    HighestLoss,
    LowestLoss,
    Random,
    Stratified,
}

impl SelectionStrategy {
    pub const ALL: [SelectionStrategy; 4] = [
        Self::HighestLoss,
        Self::LowestLoss,
        Self::Random,
        Self::Stratified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighestLoss => "highest_loss",
            Self::LowestLoss => "lowest_loss",
            Self::Random => "random",
            Self::Stratified => "stratified",
        }
    }

    /// Build the selector for this strategy.
    pub fn selector(&self, seed: u64) -> Box<dyn SubsetSelector> {
        match self {
            Self::HighestLoss => Box::new(HighestLoss),
            Self::LowestLoss => Box::new(LowestLoss),
            Self::Random => Box::new(RandomSample { seed }),
            Self::Stratified => Box::new(StratifiedByTag),
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = AugmentError;

    /// Accepts `highest_loss` or `highest-loss` style names.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| AugmentError::UnknownStrategy(s.to_string()))
    }
}

/// Select `k` candidates, applying the shortfall policy when the pool is
/// smaller than `k`.
pub fn select_subset(
    selector: &dyn SubsetSelector,
    pool: &AugmentationPool,
    k: usize,
    on_small_pool: PoolShortfall,
) -> Result<SelectedSubset> {
    if pool.len() < k {
        match on_small_pool {
            PoolShortfall::Error => {
                return Err(AugmentError::InsufficientPool {
                    requested: k,
                    available: pool.len(),
                })
            }
            PoolShortfall::Shrink => warn!(
                requested = k,
                available = pool.len(),
                "Augmentation pool smaller than requested subset, selecting whole pool"
            ),
        }
    }

    let subset = selector.select(pool, k)?;
    let expected = k.min(pool.len());
    if subset.len() != expected {
        return Err(AugmentError::count_mismatch(
            format!("candidates selected by '{}'", selector.name()),
            expected,
            subset.len(),
        ));
    }

    info!(
        strategy = selector.name(),
        requested = k,
        selected = subset.len(),
        pool = pool.len(),
        "Selected augmentation subset"
    );
    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Example, Provenance};
    use std::collections::HashSet;

    fn candidate(id: usize, confidence: f64, tag: &str) -> Candidate {
        Candidate {
            id,
            confidence,
            example: Example::new(format!("s{id}"), format!("t{id}"), tag, Provenance::Hallucinated),
        }
    }

    fn pool(entries: &[(usize, f64)]) -> AugmentationPool {
        let candidates = entries
            .iter()
            .map(|&(id, confidence)| candidate(id, confidence, "V;PST"))
            .collect();
        AugmentationPool::new(candidates, 10).unwrap()
    }

    #[test]
    fn test_highest_loss_takes_lowest_confidence() {
        let pool = pool(&[(10, -5.0), (11, -1.0), (12, -9.0)]);
        let subset = select_subset(&HighestLoss, &pool, 2, PoolShortfall::Shrink).unwrap();

        assert_eq!(subset.ids(), vec![12, 10]);
        assert_eq!(subset.strategy(), "highest_loss");
    }

    #[test]
    fn test_highest_loss_ties_break_by_ascending_id() {
        let pool = pool(&[(14, -2.0), (11, -2.0), (13, -2.0), (12, -0.5)]);
        let subset = HighestLoss.select(&pool, 2).unwrap();
        assert_eq!(subset.ids(), vec![11, 13]);
    }

    #[test]
    fn test_lowest_loss_takes_highest_confidence() {
        let pool = pool(&[(10, -5.0), (11, -1.0), (12, -9.0)]);
        let subset = LowestLoss.select(&pool, 2).unwrap();
        assert_eq!(subset.ids(), vec![11, 10]);
    }

    #[test]
    fn test_random_is_reproducible_and_distinct() {
        let entries: Vec<(usize, f64)> = (10..60).map(|id| (id, -(id as f64))).collect();
        let pool = pool(&entries);

        let first = RandomSample { seed: 7 }.select(&pool, 20).unwrap();
        let second = RandomSample { seed: 7 }.select(&pool, 20).unwrap();
        assert_eq!(first.ids(), second.ids());

        let unique: HashSet<usize> = first.ids().into_iter().collect();
        assert_eq!(unique.len(), 20);
        assert!(unique.iter().all(|id| (10..60).contains(id)));
    }

    #[test]
    fn test_stratified_round_robins_tags() {
        let candidates = vec![
            candidate(10, -9.0, "V;PST"),
            candidate(11, -8.0, "V;PST"),
            candidate(12, -7.0, "V;PST"),
            candidate(13, -1.0, "N;PL"),
            candidate(14, -0.5, "ADJ;CMPR"),
        ];
        let pool = AugmentationPool::new(candidates, 10).unwrap();
        let subset = StratifiedByTag.select(&pool, 4).unwrap();

        // Tags in order: ADJ;CMPR, N;PL, V;PST
        assert_eq!(subset.ids(), vec![14, 13, 10, 11]);
    }

    #[test]
    fn test_small_pool_shrinks() {
        let pool = pool(&[(10, -5.0), (11, -1.0)]);
        for strategy in SelectionStrategy::ALL {
            let selector = strategy.selector(0);
            let subset = select_subset(selector.as_ref(), &pool, 128, PoolShortfall::Shrink).unwrap();
            assert_eq!(subset.len(), 2, "strategy {strategy}");
        }
    }

    #[test]
    fn test_small_pool_errors_when_configured() {
        let pool = pool(&[(10, -5.0)]);
        let err = select_subset(&HighestLoss, &pool, 2, PoolShortfall::Error).unwrap_err();
        assert!(matches!(
            err,
            AugmentError::InsufficientPool {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn test_empty_pool_shrinks_to_empty() {
        let pool = AugmentationPool::new(Vec::new(), 10).unwrap();
        let subset = select_subset(&StratifiedByTag, &pool, 3, PoolShortfall::Shrink).unwrap();
        assert!(subset.is_empty());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "highest-loss".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::HighestLoss
        );
        assert_eq!(
            "Stratified".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::Stratified
        );
        assert!(matches!(
            "initial".parse::<SelectionStrategy>(),
            Err(AugmentError::UnknownStrategy(_))
        ));
    }
}
