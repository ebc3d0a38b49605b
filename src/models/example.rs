//! Example, split and generation record types.
//!
//! These types are the data flowing between pipeline stages. They are
//! immutable once built and passed by value from one stage to the next.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an example came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Human-annotated corpus row
    Gold,
    /// Synthetic row produced for augmentation; may not be linguistically valid
    Hallucinated,
}

/// One inflection triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Lemma / source form
    pub source: String,

    /// Inflected target form
    pub target: String,

    /// Morphological tag, features joined by `;` (e.g. `V;PST;3;SG`)
    pub tag: String,

    /// Gold or hallucinated
    pub provenance: Provenance,
}

impl Example {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        tag: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            tag: tag.into(),
            provenance,
        }
    }

    /// Tag features in order.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.tag.split(';')
    }
}

/// Name of a dataset split as written to the scratch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitName {
    TrainLow,
    Valid,
    Test,
}

impl SplitName {
    /// File stem used in `{lang}-{split}.src` / `.tgt`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrainLow => "train-low",
            Self::Valid => "valid",
            Self::Test => "test",
        }
    }

    /// Suffix of the gold corpus file this split is read from.
    pub fn corpus_suffix(&self) -> &'static str {
        match self {
            Self::TrainLow => "train-low",
            Self::Valid => "dev",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, ordered collection of examples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub name: SplitName,
    pub examples: Vec<Example>,
}

impl Split {
    pub fn new(name: SplitName, examples: Vec<Example>) -> Self {
        Self { name, examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Append examples, keeping existing order first.
    pub fn extended(mut self, extra: impl IntoIterator<Item = Example>) -> Self {
        self.examples.extend(extra);
        self
    }
}

/// The three gold splits of one language.
#[derive(Debug, Clone)]
pub struct GoldSplits {
    pub train: Split,
    pub valid: Split,
    pub test: Split,
}

/// One decoded hypothesis from the external generation log.
///
/// Ids below the gold test count belong to the gold evaluation set; the
/// rest are augmentation candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Row index into the generated `test` split
    pub id: usize,

    /// Reference output, de-tokenized
    pub gold: String,

    /// Model hypothesis, de-tokenized
    pub hypothesis: String,

    /// Model log-likelihood of the hypothesis (lower is more surprising)
    pub confidence: f64,
}

impl GenerationRecord {
    /// Whether this record belongs to the gold evaluation set.
    pub fn is_gold(&self, gold_count: usize) -> bool {
        self.id < gold_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_split_on_semicolon() {
        let example = Example::new("walk", "walked", "V;PST", Provenance::Gold);
        assert_eq!(example.features().collect::<Vec<_>>(), vec!["V", "PST"]);
    }

    #[test]
    fn test_split_name_files() {
        assert_eq!(SplitName::TrainLow.as_str(), "train-low");
        assert_eq!(SplitName::Valid.as_str(), "valid");
        assert_eq!(SplitName::Valid.corpus_suffix(), "dev");
        assert_eq!(SplitName::Test.to_string(), "test");
    }

    #[test]
    fn test_record_partition() {
        let record = GenerationRecord {
            id: 3,
            gold: "abc".to_string(),
            hypothesis: "abc".to_string(),
            confidence: -0.2,
        };
        assert!(record.is_gold(4));
        assert!(!record.is_gold(3));
    }
}
