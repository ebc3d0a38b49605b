//! External pipeline driver.
//!
//! The sequence model is trained and decoded by opaque scripts, each invoked
//! as `<script> <round_dir> <language>`. Steps are awaited to completion
//! before anything downstream reads their output; a non-zero exit, a spawn
//! failure or a timeout aborts the step with the captured stderr tail.

use crate::models::{AugmentError, PipelineConfig, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Bytes of stderr kept in step errors.
const STDERR_TAIL_BYTES: usize = 4096;

/// One step of the external pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    /// Build the binarized dataset from `.src`/`.tgt` files
    Binarize,
    /// Train the model on the binarized dataset
    Train,
    /// Decode the `test` split and write the generation log
    Generate,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binarize => "binarize",
            Self::Train => "train",
            Self::Generate => "generate",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: PipelineStep,
    pub exit_code: i32,
    pub elapsed: Duration,
}

/// Capability interface over the external training toolkit.
///
/// Only the file-based contract matters to callers: after `generate`
/// returns, `{round_dir}/{language}_results.txt` holds the generation log.
#[async_trait]
pub trait ExternalPipeline: Send + Sync {
    /// Run one step over a prepared round directory and wait for it.
    async fn run_step(
        &self,
        step: PipelineStep,
        round_dir: &Path,
        language: &str,
    ) -> Result<StepOutcome>;

    async fn binarize(&self, round_dir: &Path, language: &str) -> Result<StepOutcome> {
        self.run_step(PipelineStep::Binarize, round_dir, language)
            .await
    }

    async fn train(&self, round_dir: &Path, language: &str) -> Result<StepOutcome> {
        self.run_step(PipelineStep::Train, round_dir, language).await
    }

    async fn generate(&self, round_dir: &Path, language: &str) -> Result<StepOutcome> {
        self.run_step(PipelineStep::Generate, round_dir, language)
            .await
    }
}

/// Runs the toolkit's shell scripts as subprocesses.
#[derive(Debug, Clone)]
pub struct ScriptPipeline {
    scripts_root: PathBuf,
    preprocess_script: PathBuf,
    train_script: PathBuf,
    generate_script: PathBuf,
    interpreter: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ScriptPipeline {
    pub fn new(scripts_root: impl Into<PathBuf>, config: &PipelineConfig) -> Self {
        Self {
            scripts_root: scripts_root.into(),
            preprocess_script: config.preprocess_script.clone(),
            train_script: config.train_script.clone(),
            generate_script: config.generate_script.clone(),
            interpreter: config.interpreter.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Override the per-step timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute or root-relative path of the script for a step.
    pub fn script_path(&self, step: PipelineStep) -> PathBuf {
        let script = match step {
            PipelineStep::Binarize => &self.preprocess_script,
            PipelineStep::Train => &self.train_script,
            PipelineStep::Generate => &self.generate_script,
        };
        self.scripts_root.join(script)
    }

    fn command(&self, script: &Path, round_dir: &Path, language: &str) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(script);
                c
            }
            None => Command::new(script),
        };
        command
            .arg(round_dir)
            .arg(language)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ExternalPipeline for ScriptPipeline {
    async fn run_step(
        &self,
        step: PipelineStep,
        round_dir: &Path,
        language: &str,
    ) -> Result<StepOutcome> {
        if !round_dir.is_dir() {
            return Err(AugmentError::InvalidInput(format!(
                "round directory {} does not exist; prepare the round before '{step}'",
                round_dir.display()
            )));
        }

        let script = self.script_path(step);
        info!(
            step = %step,
            script = %script.display(),
            round_dir = %round_dir.display(),
            language,
            "Starting external step"
        );

        let child = self
            .command(&script, round_dir, language)
            .spawn()
            .map_err(|e| {
                AugmentError::io(format!("spawning {step} script {}", script.display()), e)
            })?;

        let spinner = step_spinner(step);
        let start = Instant::now();

        let waited = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // Dropping the future drops the child, which kills it.
                    spinner.abandon_with_message(format!("{step} timed out"));
                    warn!(step = %step, ?timeout, "External step timed out");
                    return Err(AugmentError::StepTimeout { step, timeout });
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| AugmentError::io(format!("waiting for {step}"), e))?;
        let elapsed = start.elapsed();
        let stderr = stderr_tail(&output.stderr);

        if !output.status.success() {
            spinner.abandon_with_message(format!("{step} failed"));
            warn!(
                step = %step,
                exit_code = ?output.status.code(),
                "External step failed"
            );
            return Err(AugmentError::PipelineStep {
                step,
                exit_code: output.status.code(),
                stderr,
            });
        }

        spinner.finish_with_message(format!("{step} done"));
        if !stderr.is_empty() {
            debug!(step = %step, stderr = %stderr, "External step stderr");
        }
        info!(
            step = %step,
            elapsed_secs = elapsed.as_secs_f64(),
            "External step complete"
        );

        Ok(StepOutcome {
            step,
            exit_code: output.status.code().unwrap_or(0),
            elapsed,
        })
    }
}

fn step_spinner(step: PipelineStep) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("running {step}"));
    spinner.enable_steady_tick(Duration::from_millis(200));
    spinner
}

/// Last `STDERR_TAIL_BYTES` of stderr, trimmed, cut on a char boundary.
fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
