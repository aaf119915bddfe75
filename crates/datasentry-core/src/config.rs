//! Configuration types for the detection ensemble.
//!
//! This module provides configuration options using the builder pattern.
//! Every threshold the detectors use lives here so a run is fully described
//! by a [`DetectionConfig`] and a [`DetectionMode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DetectionError;

/// Which detector families the ensemble runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Column-type and learned detectors plus the insertion, deletion and
    /// update rule families.
    #[default]
    Sql,
    /// Column-type and learned detectors only.
    Ml,
}

impl DetectionMode {
    /// Whether the mutation rule families run in this mode.
    pub fn runs_mutation_rules(self) -> bool {
        matches!(self, DetectionMode::Sql)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::Sql => "sql",
            DetectionMode::Ml => "ml",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(DetectionMode::Sql),
            "ml" => Ok(DetectionMode::Ml),
            other => Err(DetectionError::InvalidMode(other.to_string())),
        }
    }
}

/// Parameters for the learned pattern detector.
///
/// The defaults reproduce a small LightGBM binary classifier: 100 rounds,
/// 31 leaves, learning rate 0.05, with row bagging every 5 rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedConfig {
    /// Fraction of rows labelled as synthetic anomalies.
    /// Default: 0.1
    pub contamination: f64,

    /// Probability above which a row is flagged.
    /// Default: 0.5
    pub threshold: f64,

    /// Number of boosting rounds.
    /// Default: 100
    pub num_iterations: usize,

    /// Shrinkage applied to every leaf value.
    /// Default: 0.05
    pub learning_rate: f64,

    /// Maximum leaves per tree.
    /// Default: 31
    pub num_leaves: usize,

    /// Minimum number of rows in a leaf.
    /// Default: 20
    pub min_data_in_leaf: usize,

    /// Minimum hessian sum in a leaf.
    /// Default: 1e-3
    pub min_sum_hessian: f64,

    /// Fraction of features sampled per tree.
    /// Default: 0.9
    pub feature_fraction: f64,

    /// Fraction of rows sampled when bagging.
    /// Default: 0.8
    pub bagging_fraction: f64,

    /// Re-draw the bag every N rounds; 0 disables bagging.
    /// Default: 5
    pub bagging_freq: usize,

    /// Maximum histogram bins per feature.
    /// Default: 255
    pub max_bin: usize,

    /// Held-out share of rows in the stratified split.
    /// Default: 0.2
    pub test_fraction: f64,

    /// L2 regularisation on leaf values.
    /// Default: 0.0
    pub lambda_l2: f64,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            threshold: 0.5,
            num_iterations: 100,
            learning_rate: 0.05,
            num_leaves: 31,
            min_data_in_leaf: 20,
            min_sum_hessian: 1e-3,
            feature_fraction: 0.9,
            bagging_fraction: 0.8,
            bagging_freq: 5,
            max_bin: 255,
            test_fraction: 0.2,
            lambda_l2: 0.0,
        }
    }
}

/// Configuration for a detection run.
///
/// Use [`DetectionConfig::builder()`] for a validated configuration.
///
/// # Example
///
/// ```rust,ignore
/// use datasentry_core::config::DetectionConfig;
///
/// let config = DetectionConfig::builder()
///     .contamination(0.05)
///     .min_confidence(0.5)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Absolute z-score above which a numeric value is an outlier.
    /// Default: 3.0
    pub z_threshold: f64,

    /// Relative frequency below which a category is rare.
    /// Default: 0.01
    pub min_category_frequency: f64,

    /// Scored findings below this confidence are dropped.
    /// Default: 0.3
    pub min_confidence: f64,

    /// Seed for every pseudo-random draw in a run.
    /// Default: 42
    pub seed: u64,

    /// Columns compared by the duplicate-record rule. Empty compares
    /// whole rows.
    /// Default: empty
    #[serde(default)]
    pub duplicate_subset: Vec<String>,

    /// Learned detector parameters.
    pub learned: LearnedConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            min_category_frequency: 0.01,
            min_confidence: 0.3,
            seed: 42,
            duplicate_subset: Vec::new(),
            learned: LearnedConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DetectionConfigBuilder {
        DetectionConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(ConfigValidationError::InvalidPositive {
                field: "z_threshold".to_string(),
                value: self.z_threshold,
            });
        }

        let fractions = [
            ("min_category_frequency", self.min_category_frequency),
            ("min_confidence", self.min_confidence),
            ("contamination", self.learned.contamination),
            ("threshold", self.learned.threshold),
            ("feature_fraction", self.learned.feature_fraction),
            ("bagging_fraction", self.learned.bagging_fraction),
        ];
        for (field, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if !(self.learned.test_fraction > 0.0 && self.learned.test_fraction < 1.0) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "test_fraction".to_string(),
                value: self.learned.test_fraction,
            });
        }

        if !(self.learned.learning_rate > 0.0) {
            return Err(ConfigValidationError::InvalidPositive {
                field: "learning_rate".to_string(),
                value: self.learned.learning_rate,
            });
        }

        if self.learned.lambda_l2 < 0.0 {
            return Err(ConfigValidationError::InvalidPositive {
                field: "lambda_l2".to_string(),
                value: self.learned.lambda_l2,
            });
        }

        if self.learned.num_iterations == 0 {
            return Err(ConfigValidationError::InvalidCount {
                field: "num_iterations".to_string(),
                value: 0,
            });
        }

        if self.learned.num_leaves < 2 {
            return Err(ConfigValidationError::InvalidCount {
                field: "num_leaves".to_string(),
                value: self.learned.num_leaves,
            });
        }

        if self.learned.max_bin < 2 {
            return Err(ConfigValidationError::InvalidCount {
                field: "max_bin".to_string(),
                value: self.learned.max_bin,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid value for '{field}': {value} (must be positive)")]
    InvalidPositive { field: String, value: f64 },

    #[error("Invalid count for '{field}': {value}")]
    InvalidCount { field: String, value: usize },
}

impl From<ConfigValidationError> for DetectionError {
    fn from(err: ConfigValidationError) -> Self {
        DetectionError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`DetectionConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct DetectionConfigBuilder {
    z_threshold: Option<f64>,
    min_category_frequency: Option<f64>,
    min_confidence: Option<f64>,
    seed: Option<u64>,
    duplicate_subset: Option<Vec<String>>,
    learned: Option<LearnedConfig>,
    contamination: Option<f64>,
}

impl DetectionConfigBuilder {
    /// Set the z-score threshold for numeric outliers.
    pub fn z_threshold(mut self, threshold: f64) -> Self {
        self.z_threshold = Some(threshold);
        self
    }

    /// Set the relative frequency below which a category is rare.
    pub fn min_category_frequency(mut self, frequency: f64) -> Self {
        self.min_category_frequency = Some(frequency);
        self
    }

    /// Set the minimum confidence a scored finding needs to be kept.
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = Some(confidence);
        self
    }

    /// Set the seed used for label synthesis, splitting and bagging.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the columns the duplicate-record rule compares.
    pub fn duplicate_subset<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.duplicate_subset = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the learned detector parameters wholesale.
    pub fn learned(mut self, learned: LearnedConfig) -> Self {
        self.learned = Some(learned);
        self
    }

    /// Set the synthetic anomaly fraction.
    ///
    /// Applied after [`learned`](Self::learned), so it wins over the value
    /// inside a replaced [`LearnedConfig`].
    pub fn contamination(mut self, contamination: f64) -> Self {
        self.contamination = Some(contamination);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `DetectionConfig` or an error if validation fails.
    pub fn build(self) -> Result<DetectionConfig, ConfigValidationError> {
        let mut learned = self.learned.unwrap_or_default();
        if let Some(contamination) = self.contamination {
            learned.contamination = contamination;
        }

        let config = DetectionConfig {
            z_threshold: self.z_threshold.unwrap_or(3.0),
            min_category_frequency: self.min_category_frequency.unwrap_or(0.01),
            min_confidence: self.min_confidence.unwrap_or(0.3),
            seed: self.seed.unwrap_or(42),
            duplicate_subset: self.duplicate_subset.unwrap_or_default(),
            learned,
        };

        config.validate()?;
        Ok(config)
    }
}
