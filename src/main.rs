//! inflect-augment CLI - one stage of an augmentation round per invocation.

use anyhow::{Context, Result};
use clap::{Args, Parser};
use inflect_augment::{Config, RoundPipeline, ScriptPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "inflect-augment")]
#[command(version)]
#[command(about = "Data augmentation rounds for low-resource morphological inflection")]
struct Cli {
    /// Language code, as used in corpus file names (e.g. `kat`)
    language: String,

    /// Round name: `initial`, or the selection strategy of an augmented
    /// round (`highest_loss`, `lowest_loss`, `random`, `stratified`)
    augmentation_type: String,

    #[command(flatten)]
    mode: Mode,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Exactly one stage per run.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Mode {
    /// Write gold splits plus the candidate pool as the test split
    #[arg(long)]
    prepare_initial: bool,

    /// Select a subset from the initial round and write the augmented splits
    #[arg(long)]
    prepare_augment: bool,

    /// Run the external preprocessing script
    #[arg(long)]
    binarize: bool,

    /// Run the external training script
    #[arg(long)]
    train: bool,

    /// Run the external generation script
    #[arg(long)]
    generate: bool,

    /// Compute exact-match accuracy from the generation log
    #[arg(long)]
    report_accuracy: bool,

    /// Group the initial round's encoder states by source token
    #[arg(long)]
    probe_representations: bool,

    /// Cache candidate log-likelihoods from the initial round
    #[arg(long)]
    extract_log_likelihoods: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let config = load_config(&cli.config)?;
    let external = Arc::new(ScriptPipeline::new(
        config.paths.scripts_root.clone(),
        &config.pipeline,
    ));
    let pipeline = RoundPipeline::new(config, external);

    let language = cli.language.as_str();
    let round = cli.augmentation_type.as_str();
    let mode = cli.mode;

    if mode.prepare_initial {
        let written = pipeline
            .prepare_initial(language, round)
            .context("prepare-initial failed")?;
        for split in &written {
            info!(path = %split.src_path.display(), lines = split.lines, "Prepared split");
        }
    } else if mode.prepare_augment {
        let selection = pipeline
            .prepare_augment(language, round)
            .context("prepare-augment failed")?;
        println!(
            "Selected {} of {} requested examples with strategy {}; train-low now has {} examples",
            selection.selected_ids.len(),
            selection.requested,
            selection.strategy,
            selection.train_size
        );
    } else if mode.binarize {
        pipeline
            .binarize(language, round)
            .await
            .context("binarize failed")?;
    } else if mode.train {
        pipeline
            .train(language, round)
            .await
            .context("train failed")?;
    } else if mode.generate {
        pipeline
            .generate(language, round)
            .await
            .context("generate failed")?;
    } else if mode.report_accuracy {
        let report = pipeline
            .report_accuracy(language, round)
            .context("report-accuracy failed")?;
        println!(
            "For language {language}, we obtain an accuracy of {:.4} ({}/{}) when using augmentation strategy {round}",
            report.accuracy, report.correct, report.total
        );
    } else if mode.probe_representations {
        let summary = pipeline
            .probe_representations(language)
            .context("probe-representations failed")?;
        println!(
            "Grouped {} vectors under {} token ids from {} gold test items: {}",
            summary.vectors,
            summary.tokens,
            summary.items,
            summary.output.display()
        );
    } else if mode.extract_log_likelihoods {
        let cache = pipeline
            .extract_log_likelihoods(language)
            .context("extract-log-likelihoods failed")?;
        println!(
            "Cached log-likelihoods for {} candidates: {}",
            cache.len(),
            pipeline.config().log_likelihood_path(language).display()
        );
    }

    Ok(())
}
