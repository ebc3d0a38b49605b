//! Round orchestration.
//!
//! Pipeline flow for one language:
//! `initial`: gold splits + candidate pool → binarize → train → generate →
//! accuracy, log-likelihood cache, probing
//! `<strategy>`: cache + generation frame → selected subset → augmented
//! `train-low` → binarize → train → generate → accuracy
//!
//! Each round owns `{scratch_root}/{lang}/{round}`; the manifest in that
//! directory records what has been done to it.

use crate::checkpoint::{ManifestStore, RoundManifest, RoundStage, SelectionRecord};
use crate::corpus::{CorpusLoader, SplitWriter, WrittenSplit};
use crate::external::{ExternalPipeline, PipelineStep, StepOutcome};
use crate::generation::{log_accuracy, AccuracyReport, GenerationLog, LogLikelihoods};
use crate::models::{AugmentError, Config, Result, Split, SplitName, INITIAL_ROUND};
use crate::probe::{self, ProbeSummary};
use crate::selection::{select_subset, AugmentationPool, SelectionStrategy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives the stages of augmentation rounds for the CLI.
pub struct RoundPipeline {
    config: Config,
    loader: CorpusLoader,
    external: Arc<dyn ExternalPipeline>,
}

impl RoundPipeline {
    pub fn new(config: Config, external: Arc<dyn ExternalPipeline>) -> Self {
        let loader = CorpusLoader::from_config(&config);
        Self {
            config,
            loader,
            external,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn round_dir(&self, language: &str, round: &str) -> PathBuf {
        self.config.round_dir(language, round)
    }

    fn manifest(&self, language: &str, round: &str) -> ManifestStore {
        ManifestStore::new(&self.round_dir(language, round))
    }

    fn update_manifest(
        &self,
        language: &str,
        round: &str,
        update: impl FnOnce(&mut RoundManifest),
    ) -> Result<()> {
        let store = self.manifest(language, round);
        let mut manifest = store.load_or_new(language, round)?;
        update(&mut manifest);
        store.save(&manifest)
    }

    /// Write the unaugmented round: gold `train-low` and `valid`, and a
    /// `test` split holding the gold test set followed by the candidate pool.
    pub fn prepare_initial(&self, language: &str, round: &str) -> Result<Vec<WrittenSplit>> {
        if round != INITIAL_ROUND {
            warn!(
                round,
                "Preparing an unaugmented round outside the '{INITIAL_ROUND}' directory; \
                 later rounds read their candidates from '{INITIAL_ROUND}'"
            );
        }

        let gold = self.loader.load_gold_splits(language)?;
        let frame = self.loader.load_generation_frame(language)?;

        let writer = SplitWriter::new(self.round_dir(language, round));
        let written = writer.write_all(language, [&gold.train, &gold.valid, &frame])?;

        self.update_manifest(language, round, |m| {
            m.record_stage(
                RoundStage::Prepared,
                Some(format!(
                    "{} gold test + {} candidates",
                    gold.test.len(),
                    frame.len() - gold.test.len()
                )),
            )
        })?;
        Ok(written)
    }

    /// Write an augmented round: `train-low` extended with the subset chosen
    /// by the strategy named `round`, plus the gold `valid` and `test`.
    pub fn prepare_augment(&self, language: &str, round: &str) -> Result<SelectionRecord> {
        let strategy: SelectionStrategy = round.parse()?;
        let augmentation = &self.config.augmentation;

        let cache = LogLikelihoods::load(&self.config.log_likelihood_path(language))?;
        if cache.language != language {
            return Err(AugmentError::InvalidInput(format!(
                "log-likelihood cache was extracted for '{}', not '{language}'",
                cache.language
            )));
        }

        let gold = self.loader.load_gold_splits(language)?;
        let gold_count = gold.test.len();
        let frame = self.loader.load_generation_frame(language)?;
        let pool = AugmentationPool::from_log_likelihoods(&cache, &frame, gold_count)?;

        let selector = strategy.selector(augmentation.seed);
        let subset = select_subset(
            selector.as_ref(),
            &pool,
            augmentation.subset_size,
            augmentation.on_small_pool,
        )?;
        let selected_ids = subset.ids();

        let train = gold.train.extended(subset.into_examples());
        let test = Split::new(SplitName::Test, gold.test.examples);

        let writer = SplitWriter::new(self.round_dir(language, round));
        writer.write_all(language, [&train, &gold.valid, &test])?;

        let record = SelectionRecord {
            strategy: strategy.to_string(),
            requested: augmentation.subset_size,
            selected_ids,
            train_size: train.len(),
        };
        info!(
            language,
            strategy = %strategy,
            selected = record.selected_ids.len(),
            train = record.train_size,
            "Prepared augmented round"
        );

        self.update_manifest(language, round, |m| {
            m.selection = Some(record.clone());
            m.record_stage(RoundStage::Prepared, Some(format!("strategy {strategy}")));
        })?;
        Ok(record)
    }

    /// Run one external step over the round directory.
    pub async fn run_step(
        &self,
        step: PipelineStep,
        language: &str,
        round: &str,
    ) -> Result<StepOutcome> {
        let round_dir = self.round_dir(language, round);
        let outcome = self.external.run_step(step, &round_dir, language).await?;

        self.update_manifest(language, round, |m| {
            m.record_stage(
                step.into(),
                Some(format!(
                    "exit {} after {:.1}s",
                    outcome.exit_code,
                    outcome.elapsed.as_secs_f64()
                )),
            )
        })?;
        Ok(outcome)
    }

    pub async fn binarize(&self, language: &str, round: &str) -> Result<StepOutcome> {
        self.run_step(PipelineStep::Binarize, language, round).await
    }

    pub async fn train(&self, language: &str, round: &str) -> Result<StepOutcome> {
        self.run_step(PipelineStep::Train, language, round).await
    }

    pub async fn generate(&self, language: &str, round: &str) -> Result<StepOutcome> {
        self.run_step(PipelineStep::Generate, language, round).await
    }

    /// Exact-match accuracy of the round's generation log on the gold test set.
    pub fn report_accuracy(&self, language: &str, round: &str) -> Result<AccuracyReport> {
        let gold_count = self.loader.gold_test_count(language)?;
        let log = GenerationLog::read(&self.config.results_path(language, round))?;
        let report = log_accuracy(&log, gold_count)?;

        info!(
            language,
            round,
            correct = report.correct,
            total = report.total,
            accuracy = report.accuracy,
            "Evaluated round"
        );

        self.update_manifest(language, round, |m| {
            m.accuracy = Some(report);
            m.record_stage(RoundStage::Evaluated, None);
        })?;
        Ok(report)
    }

    /// Cache the candidates' log-likelihoods from the initial round's log.
    pub fn extract_log_likelihoods(&self, language: &str) -> Result<LogLikelihoods> {
        let gold_count = self.loader.gold_test_count(language)?;
        let log = GenerationLog::read(&self.config.results_path(language, INITIAL_ROUND))?;
        let cache = LogLikelihoods::extract(
            language,
            &log,
            gold_count,
            self.config.augmentation.pool_size,
        )?;
        cache.save(&self.config.log_likelihood_path(language))?;

        self.update_manifest(language, INITIAL_ROUND, |m| {
            m.record_stage(
                RoundStage::LikelihoodsExtracted,
                Some(format!("{} candidates", cache.len())),
            )
        })?;
        Ok(cache)
    }

    /// Group the initial round's encoder states by source token.
    pub fn probe_representations(&self, language: &str) -> Result<ProbeSummary> {
        let gold_count = self.loader.gold_test_count(language)?;
        let round_dir = self.round_dir(language, INITIAL_ROUND);
        let summary = probe::probe_representations(&round_dir, language, gold_count)?;

        self.update_manifest(language, INITIAL_ROUND, |m| {
            m.record_stage(
                RoundStage::Probed,
                Some(format!("{} tokens", summary.tokens)),
            )
        })?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::test_fixtures::{block, log_of};
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoopPipeline;

    #[async_trait]
    impl ExternalPipeline for NoopPipeline {
        async fn run_step(
            &self,
            step: PipelineStep,
            _round_dir: &Path,
            _language: &str,
        ) -> Result<StepOutcome> {
            Ok(StepOutcome {
                step,
                exit_code: 0,
                elapsed: Duration::ZERO,
            })
        }
    }

    fn fixture(pool_size: usize) -> (TempDir, RoundPipeline) {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("kat-train-low"), "a\taa\tV\nb\tbb\tV\n").unwrap();
        fs::write(data.join("kat-dev"), "c\tcc\tV\n").unwrap();
        fs::write(data.join("kat-test"), "d\tdd\tV\ne\tee\tN\n").unwrap();
        fs::write(data.join("kat-hall"), "f\tff\tV\ng\tgg\tN\nh\thh\tV\n").unwrap();

        let mut config = Config::default();
        config.paths.data_root = data;
        config.paths.scratch_root = dir.path().join("scratch");
        config.augmentation.pool_size = pool_size;
        config.augmentation.subset_size = 2;

        let pipeline = RoundPipeline::new(config, Arc::new(NoopPipeline));
        (dir, pipeline)
    }

    fn initial_log() -> String {
        log_of(&[
            block(0, "dd", "dd", -0.1),
            block(1, "ee", "ex", -0.4),
            block(2, "ff", "ff", -3.0),
            block(3, "gg", "gg", -0.2),
            block(4, "hh", "hh", -7.5),
        ])
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn test_prepare_initial_writes_generation_frame() {
        let (_dir, pipeline) = fixture(3);
        let written = pipeline.prepare_initial("kat", INITIAL_ROUND).unwrap();

        assert_eq!(written.len(), 3);
        let round_dir = pipeline.round_dir("kat", INITIAL_ROUND);
        assert_eq!(line_count(&round_dir.join("kat-test.src")), 5);
        assert_eq!(line_count(&round_dir.join("kat-train-low.tgt")), 2);

        let manifest = ManifestStore::new(&round_dir).load().unwrap();
        assert!(manifest.has_completed(RoundStage::Prepared));
    }

    #[test]
    fn test_extract_then_prepare_augment() {
        let (_dir, pipeline) = fixture(3);
        pipeline.prepare_initial("kat", INITIAL_ROUND).unwrap();
        fs::write(
            pipeline.config().results_path("kat", INITIAL_ROUND),
            initial_log(),
        )
        .unwrap();

        let cache = pipeline.extract_log_likelihoods("kat").unwrap();
        assert_eq!(cache.len(), 3);

        let record = pipeline.prepare_augment("kat", "highest_loss").unwrap();
        assert_eq!(record.selected_ids, vec![4, 2]);
        assert_eq!(record.train_size, 4);

        let round_dir = pipeline.round_dir("kat", "highest_loss");
        let train = fs::read_to_string(round_dir.join("kat-train-low.src")).unwrap();
        assert_eq!(train.lines().nth(2), Some("h V"));
        assert_eq!(train.lines().nth(3), Some("f V"));
        assert_eq!(line_count(&round_dir.join("kat-test.tgt")), 2);
    }

    #[test]
    fn test_extract_rejects_wrong_pool_size() {
        let (_dir, pipeline) = fixture(4);
        pipeline.prepare_initial("kat", INITIAL_ROUND).unwrap();
        fs::write(
            pipeline.config().results_path("kat", INITIAL_ROUND),
            initial_log(),
        )
        .unwrap();

        let err = pipeline.extract_log_likelihoods("kat").unwrap_err();
        assert!(err.is_alignment_error());
        assert!(!pipeline.config().log_likelihood_path("kat").exists());
    }

    #[test]
    fn test_prepare_augment_rejects_cache_of_other_language() {
        let (_dir, pipeline) = fixture(3);
        pipeline.prepare_initial("kat", INITIAL_ROUND).unwrap();
        fs::write(
            pipeline.config().results_path("kat", INITIAL_ROUND),
            initial_log(),
        )
        .unwrap();
        let mut cache = pipeline.extract_log_likelihoods("kat").unwrap();
        cache.language = "hye".to_string();
        cache
            .save(&pipeline.config().log_likelihood_path("kat"))
            .unwrap();

        let err = pipeline.prepare_augment("kat", "highest_loss").unwrap_err();
        assert!(matches!(err, AugmentError::InvalidInput(_)));
        assert!(!pipeline
            .round_dir("kat", "highest_loss")
            .join("kat-train-low.src")
            .exists());
    }

    #[test]
    fn test_prepare_augment_rejects_unknown_strategy() {
        let (_dir, pipeline) = fixture(3);
        let err = pipeline.prepare_augment("kat", INITIAL_ROUND).unwrap_err();
        assert!(matches!(err, AugmentError::UnknownStrategy(_)));
    }

    #[tokio::test]
    async fn test_steps_are_recorded() {
        let (_dir, pipeline) = fixture(3);
        pipeline.prepare_initial("kat", INITIAL_ROUND).unwrap();
        pipeline.binarize("kat", INITIAL_ROUND).await.unwrap();
        pipeline.train("kat", INITIAL_ROUND).await.unwrap();

        let manifest = ManifestStore::new(&pipeline.round_dir("kat", INITIAL_ROUND))
            .load()
            .unwrap();
        assert_eq!(manifest.stages.len(), 3);
        assert_eq!(manifest.last_stage(), Some(RoundStage::Trained));
    }
}
