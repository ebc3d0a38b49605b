//! Checkpoint module for tracking round progress on disk.
//!
//! Provides:
//! - `RoundManifest`: stages, selection and accuracy of one round
//! - `ManifestStore`: atomic persistence of the manifest

mod manifest;

pub use manifest::*;
