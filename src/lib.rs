//! inflect-augment - data augmentation rounds for low-resource morphological
//! inflection.
//!
//! ## Rounds
//!
//! - **initial**: train on the gold `train-low` split and decode the gold test
//!   set together with a pool of hallucinated candidates
//! - **augmented**: append a subset of candidates, chosen from the initial
//!   round's log-likelihoods, to `train-low` and train again
//!
//! ## Components
//!
//! - `corpus`: tab-separated gold corpora in, tokenized `.src`/`.tgt` splits out
//! - `external`: the opaque binarize/train/generate scripts
//! - `generation`: generation log parsing, accuracy, log-likelihood caching
//! - `selection`: candidate pool and swappable subset strategies
//! - `probe`: encoder states grouped by source token
//! - `checkpoint`: per-round manifest of completed stages
//! - `pipeline`: the stages the CLI runs

pub mod checkpoint;
pub mod corpus;
pub mod external;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod selection;

// Re-exports for convenience
pub use checkpoint::{ManifestStore, RoundManifest, RoundStage};
pub use corpus::{CorpusLoader, SplitWriter};
pub use external::{ExternalPipeline, PipelineStep, ScriptPipeline, StepOutcome};
pub use generation::{AccuracyReport, GenerationLog, LogLikelihoods};
pub use models::{AugmentError, Config, Example, GenerationRecord, Result, Split, SplitName};
pub use pipeline::RoundPipeline;
pub use selection::{AugmentationPool, SelectedSubset, SelectionStrategy, SubsetSelector};
