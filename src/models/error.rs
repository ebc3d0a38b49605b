//! Error types for inflect-augment.
//!
//! Taxonomy:
//! - Expected failures: malformed corpus rows, unknown strategies, bad input
//! - Infrastructure failures: external steps exiting non-zero or timing out, IO
//! - Invariant violations: misaligned generation logs, count mismatches

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::external::PipelineStep;

/// Top-level error type for inflect-augment.
#[derive(Debug, Error)]
pub enum AugmentError {
    // ═══════════════════════════════════════════════════════════════════
    // EXPECTED FAILURES: bad input, bad configuration
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Malformed corpus row in {path}:{line}: {reason}")]
    CorpusFormat {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Unknown selection strategy: '{0}'")]
    UnknownStrategy(String),

    #[error("Augmentation pool has {available} candidates, {requested} requested")]
    InsufficientPool { requested: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // INFRASTRUCTURE FAILURES: external processes and the filesystem
    // ═══════════════════════════════════════════════════════════════════

    #[error("External step '{step}' failed (exit code {}): {stderr}", display_exit_code(.exit_code))]
    PipelineStep {
        step: PipelineStep,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("External step '{step}' timed out after {timeout:?}")]
    StepTimeout { step: PipelineStep, timeout: Duration },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // INVARIANT VIOLATIONS: misaligned ids or counts
    // ═══════════════════════════════════════════════════════════════════

    #[error("Generation log misaligned at line {line}: {reason}")]
    ParseAlignment { line: usize, reason: String },

    #[error("Count mismatch for {what}: expected {expected}, found {actual}")]
    CountMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AugmentError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a count mismatch error.
    pub fn count_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::CountMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Whether this error signals misaligned ids or counts.
    ///
    /// These are never recoverable mid-pipeline: downstream accuracy and
    /// selection would be computed over the wrong examples.
    pub fn is_alignment_error(&self) -> bool {
        matches!(
            self,
            Self::ParseAlignment { .. } | Self::CountMismatch { .. }
        )
    }
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Result type alias for inflect-augment.
pub type Result<T> = std::result::Result<T, AugmentError>;
