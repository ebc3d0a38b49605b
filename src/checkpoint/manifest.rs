//! Round manifest: what has been done to one round directory.
//!
//! - Each round directory carries `manifest.json`
//! - Stages are appended as they complete, with timestamps
//! - The selection and latest accuracy are recorded for later comparison
//! - Saves are atomic (write-then-rename); the previous copy is kept as a backup

use crate::external::PipelineStep;
use crate::generation::AccuracyReport;
use crate::models::{AugmentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// A completed stage of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStage {
    /// Tokenized splits written
    Prepared,
    /// External binarization finished
    Binarized,
    /// External training finished
    Trained,
    /// Generation log written
    Generated,
    /// Accuracy computed from the generation log
    Evaluated,
    /// Candidate log-likelihoods cached
    LikelihoodsExtracted,
    /// Encoder states grouped by token
    Probed,
}

impl From<PipelineStep> for RoundStage {
    fn from(step: PipelineStep) -> Self {
        match step {
            PipelineStep::Binarize => Self::Binarized,
            PipelineStep::Train => Self::Trained,
            PipelineStep::Generate => Self::Generated,
        }
    }
}

/// Stage completion entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: RoundStage,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Subset chosen for an augmentation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub strategy: String,
    pub requested: usize,
    pub selected_ids: Vec<usize>,
    /// `train-low` size after appending the subset
    pub train_size: usize,
}

/// Manifest state for one language/round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundManifest {
    pub run_id: Uuid,
    pub language: String,
    pub round: String,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<AccuracyReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoundManifest {
    pub fn new(language: &str, round: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            language: language.to_string(),
            round: round.to_string(),
            stages: Vec::new(),
            selection: None,
            accuracy: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_stage(&mut self, stage: RoundStage, detail: Option<String>) {
        let now = Utc::now();
        self.stages.push(StageRecord {
            stage,
            completed_at: now,
            detail,
        });
        self.updated_at = now;
    }

    pub fn has_completed(&self, stage: RoundStage) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }

    /// Most recently completed stage.
    pub fn last_stage(&self) -> Option<RoundStage> {
        self.stages.last().map(|s| s.stage)
    }
}

/// Loads and persists the manifest of one round directory.
pub struct ManifestStore {
    dir: PathBuf,
    manifest_path: PathBuf,
    backup_path: PathBuf,
}

impl ManifestStore {
    pub fn new(round_dir: &Path) -> Self {
        Self {
            dir: round_dir.to_path_buf(),
            manifest_path: round_dir.join("manifest.json"),
            backup_path: round_dir.join("manifest.backup.json"),
        }
    }

    pub fn exists(&self) -> bool {
        self.manifest_path.exists()
    }

    /// Load the existing manifest or start a new one.
    pub fn load_or_new(&self, language: &str, round: &str) -> Result<RoundManifest> {
        if self.exists() {
            let manifest = self.load()?;
            debug!(
                round = %manifest.round,
                stages = manifest.stages.len(),
                "Loaded round manifest"
            );
            Ok(manifest)
        } else {
            info!(language, round, "Starting new round manifest");
            Ok(RoundManifest::new(language, round))
        }
    }

    pub fn load(&self) -> Result<RoundManifest> {
        let file = File::open(&self.manifest_path)
            .map_err(|e| AugmentError::io("opening round manifest", e))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| AugmentError::ParseError(format!("Invalid round manifest: {e}")))
    }

    /// Save atomically, keeping the previous manifest as a backup.
    pub fn save(&self, manifest: &RoundManifest) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AugmentError::io("creating round directory", e))?;

        if self.manifest_path.exists() {
            fs::copy(&self.manifest_path, &self.backup_path)
                .map_err(|e| AugmentError::io("backing up round manifest", e))?;
        }

        let temp_path = self.dir.join("manifest.tmp.json");
        let file = File::create(&temp_path)
            .map_err(|e| AugmentError::io("creating temp manifest", e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, manifest)
            .map_err(|e| AugmentError::Internal(format!("Serializing round manifest: {e}")))?;

        fs::rename(&temp_path, &self.manifest_path)
            .map_err(|e| AugmentError::io("renaming round manifest", e))?;

        debug!(path = %self.manifest_path.display(), "Round manifest saved");
        Ok(())
    }

    /// Load, record a stage, save.
    pub fn record_stage(
        &self,
        language: &str,
        round: &str,
        stage: RoundStage,
        detail: Option<String>,
    ) -> Result<RoundManifest> {
        let mut manifest = self.load_or_new(language, round)?;
        manifest.record_stage(stage, detail);
        self.save(&manifest)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_manifest_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let manifest = store.load_or_new("kat", "initial").unwrap();

        assert!(!store.exists());
        assert!(manifest.stages.is_empty());
        assert_eq!(manifest.round, "initial");
    }

    #[test]
    fn test_stages_accumulate_across_saves() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        let first = store
            .record_stage("kat", "initial", RoundStage::Prepared, None)
            .unwrap();
        let second = store
            .record_stage(
                "kat",
                "initial",
                PipelineStep::Binarize.into(),
                Some("exit 0".to_string()),
            )
            .unwrap();

        assert_eq!(first.run_id, second.run_id);
        assert_eq!(second.stages.len(), 2);
        assert!(second.has_completed(RoundStage::Prepared));
        assert_eq!(second.last_stage(), Some(RoundStage::Binarized));
        assert!(dir.path().join("manifest.backup.json").exists());
        assert!(!dir.path().join("manifest.tmp.json").exists());
    }

    #[test]
    fn test_selection_and_accuracy_persist() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        let mut manifest = RoundManifest::new("kat", "highest_loss");
        manifest.selection = Some(SelectionRecord {
            strategy: "highest_loss".to_string(),
            requested: 2,
            selected_ids: vec![12, 10],
            train_size: 102,
        });
        manifest.accuracy = Some(AccuracyReport {
            correct: 1,
            total: 2,
            accuracy: 0.5,
        });
        store.save(&manifest).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.selection, manifest.selection);
        assert_eq!(loaded.accuracy, manifest.accuracy);
    }

    #[test]
    fn test_corrupt_manifest_is_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.json"), "{not json").unwrap();
        let err = ManifestStore::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, AugmentError::ParseError(_)));
    }
}
