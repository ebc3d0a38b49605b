//! Selection module - choosing which generated examples to train on next.
//!
//! Pipeline flow:
//! Cached log-likelihoods + generation frame → AugmentationPool →
//! SubsetSelector → SelectedSubset → appended to `train-low`

mod pool;
mod strategy;

pub use pool::*;
pub use strategy::*;
