//! Configuration for data loading, parameter storage and training.
//!
//! Every field has a documented default so an empty TOML file (or no file at
//! all) reproduces the classic run: 10 features, 100 iterations, `λ = 1`,
//! step `6e-4`, tolerance `1e-4`, 444-wide records in `y.txt` / `r.txt`.
//!
//! ```
//! use rusket_mf::TrainConfig;
//!
//! let config = TrainConfig::default()
//!     .with_features(4)
//!     .with_lambda(0.1);
//! assert!(config.validate().is_ok());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MfError, Result};

/// Top-level configuration, typically read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub train: TrainConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.train.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| MfError::io(path, e))?;
        Self::from_toml_str(&text)
    }
}

/// Where the ratings and mask come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Ratings matrix `Y`, one record per user.
    pub ratings: PathBuf,
    /// Observation mask `R`, same layout as `ratings`.
    pub mask: PathBuf,
    /// Values per record; `None` treats every line as one record.
    pub width: Option<usize>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            ratings: PathBuf::from("y.txt"),
            mask: PathBuf::from("r.txt"),
            width: Some(444),
        }
    }
}

/// Directory holding `w.param`, `x.param` and `b.param`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

/// Initial values for feature vectors when no saved state is resumed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Init {
    /// All features zero (user coordinate 0 still pinned to 1).
    #[default]
    Zeros,
    /// Uniform in `[-scale, scale]` from a seeded XorShift64 stream.
    Uniform { scale: f32, seed: u64 },
}

impl Init {
    /// Uniform init when a scale is given, zeros otherwise.
    #[must_use]
    pub const fn from_scale(scale: Option<f32>, seed: u64) -> Self {
        match scale {
            Some(scale) => Self::Uniform { scale, seed },
            None => Self::Zeros,
        }
    }
}

/// Hyperparameters of a training run. Immutable once a model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Feature count `k`, including the pinned bias coordinate.
    pub features: usize,
    pub max_iterations: usize,
    /// Regularization strength `λ`.
    pub lambda: f32,
    /// Fixed gradient step `η`.
    pub learning_rate: f32,
    /// Stop once `|cost| < tolerance`.
    pub tolerance: f64,
    /// Reload persisted parameters before training.
    pub resume: bool,
    pub init: Init,
    /// Print the per-iteration table on stdout.
    pub verbose: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            features: 10,
            max_iterations: 100,
            lambda: 1.0,
            learning_rate: 6e-4,
            tolerance: 1e-4,
            resume: true,
            init: Init::Zeros,
            verbose: false,
        }
    }
}

impl TrainConfig {
    #[must_use]
    pub const fn with_features(mut self, features: usize) -> Self {
        self.features = features;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub const fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.features == 0 {
            return Err(MfError::InvalidConfig("features must be >= 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(MfError::InvalidConfig(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(MfError::InvalidConfig(format!(
                "lambda must be >= 0, got {}",
                self.lambda
            )));
        }
        if !(self.tolerance >= 0.0) {
            return Err(MfError::InvalidConfig(format!(
                "tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }
        if let Init::Uniform { scale, .. } = self.init {
            if !(scale.is_finite() && scale >= 0.0) {
                return Err(MfError::InvalidConfig(format!(
                    "init scale must be >= 0, got {scale}"
                )));
            }
        }
        Ok(())
    }
}
