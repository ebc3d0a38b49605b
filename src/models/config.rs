//! Configuration models for inflect-augment.
//!
//! Path roots, external script names and augmentation parameters are all
//! explicit here and passed into each component; nothing is read from
//! ambient process state apart from `${VAR}` expansion in paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for inflect-augment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem roots
    #[serde(default)]
    pub paths: PathsConfig,

    /// External pipeline invocation
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Subset selection parameters
    #[serde(default)]
    pub augmentation: AugmentationConfig,
}

/// Filesystem roots.
///
/// Values may contain `${VAR}` placeholders, expanded at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the gold corpus files (`{lang}-train-low`, ...)
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Directory under which per-language, per-round datasets are written
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,

    /// Directory holding the external preprocess/train/generate scripts
    #[serde(default = "default_scripts_root")]
    pub scripts_root: PathBuf,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_scratch_root() -> PathBuf {
    PathBuf::from("scratch")
}

fn default_scripts_root() -> PathBuf {
    PathBuf::from("scripts")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            scratch_root: default_scratch_root(),
            scripts_root: default_scripts_root(),
        }
    }
}

/// External pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Binarization script, relative to `scripts_root`
    #[serde(default = "default_preprocess_script")]
    pub preprocess_script: PathBuf,

    /// Training script, relative to `scripts_root`
    #[serde(default = "default_train_script")]
    pub train_script: PathBuf,

    /// Generation script, relative to `scripts_root`
    #[serde(default = "default_generate_script")]
    pub generate_script: PathBuf,

    /// Interpreter used to run the scripts (e.g. "bash").
    /// When absent the scripts are executed directly.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,

    /// Per-step timeout in seconds; no timeout when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_preprocess_script() -> PathBuf {
    PathBuf::from("preprocess.sh")
}

fn default_train_script() -> PathBuf {
    PathBuf::from("train_model.sh")
}

fn default_generate_script() -> PathBuf {
    PathBuf::from("generate.sh")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess_script: default_preprocess_script(),
            train_script: default_train_script(),
            generate_script: default_generate_script(),
            interpreter: None,
            timeout_secs: None,
        }
    }
}

/// What to do when the augmentation pool holds fewer candidates than requested.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolShortfall {
    /// Return the whole pool and log a warning
    #[default]
    Shrink,
    /// Fail with `InsufficientPool`
    Error,
}

/// Augmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Number of candidates appended to `train-low` per round
    #[serde(default = "default_subset_size")]
    pub subset_size: usize,

    /// Expected number of augmentation candidates in the initial generation
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Corpus file suffix of the hallucinated candidate pool (`{lang}-{suffix}`)
    #[serde(default = "default_pool_suffix")]
    pub pool_suffix: String,

    /// Seed for randomized strategies
    #[serde(default)]
    pub seed: u64,

    /// Behaviour when the pool is smaller than `subset_size`
    #[serde(default)]
    pub on_small_pool: PoolShortfall,
}

fn default_subset_size() -> usize {
    128
}

fn default_pool_size() -> usize {
    10_000
}

fn default_pool_suffix() -> String {
    "hall".to_string()
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            subset_size: default_subset_size(),
            pool_size: default_pool_size(),
            pool_suffix: default_pool_suffix(),
            seed: 0,
            on_small_pool: PoolShortfall::default(),
        }
    }
}

/// Name of the round whose generation log feeds subset selection.
pub const INITIAL_ROUND: &str = "initial";

impl Config {
    /// Load configuration from a TOML file, expanding `${VAR}` in paths.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.augmentation.subset_size == 0 {
            return Err(ConfigError::Invalid(
                "augmentation.subset_size must be positive".to_string(),
            ));
        }
        if self.augmentation.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "augmentation.pool_size must be positive".to_string(),
            ));
        }
        if self.augmentation.pool_suffix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "augmentation.pool_suffix must not be empty".to_string(),
            ));
        }
        if self.pipeline.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "pipeline.timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        for path in [
            &mut self.paths.data_root,
            &mut self.paths.scratch_root,
            &mut self.paths.scripts_root,
        ] {
            *path = PathBuf::from(expand_env_vars(&path.to_string_lossy()));
        }
        if let Some(interpreter) = &mut self.pipeline.interpreter {
            *interpreter = PathBuf::from(expand_env_vars(&interpreter.to_string_lossy()));
        }
    }

    /// Scratch directory for one language and augmentation round.
    pub fn round_dir(&self, language: &str, round: &str) -> PathBuf {
        self.paths.scratch_root.join(language).join(round)
    }

    /// Generation log written by the external generate step.
    pub fn results_path(&self, language: &str, round: &str) -> PathBuf {
        self.round_dir(language, round)
            .join(format!("{language}_results.txt"))
    }

    /// Persisted log-likelihood cache of the initial round.
    pub fn log_likelihood_path(&self, language: &str) -> PathBuf {
        self.round_dir(language, INITIAL_ROUND)
            .join(format!("{language}_log_likelihoods.json"))
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
