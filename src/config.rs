//! Pipeline configuration with per-variant presets.

use crate::data::balance::BalanceConfig;
use crate::data::preprocessing::MissingValueStrategy;
use crate::data::{Schema, SplitConfig};
use crate::error::PipelineError;
use crate::model::BoosterConfig;
use crate::predict::{OutputShape, PredictionConfig};
use crate::utils::validation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Pipeline variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Median imputation, SMOTE balancing, fixed 14 features, aggregated output
    #[default]
    Outbreak,
    /// Zero imputation with standardization, inferred features, ranked output
    Disease,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Outbreak => write!(f, "outbreak"),
            Variant::Disease => write!(f, "disease"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub missing_strategy: MissingValueStrategy,
    pub standardize: bool,
}

/// Complete configuration of a training or inference run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub variant: Variant,
    pub schema: Schema,
    pub preprocessing: PreprocessingConfig,
    pub split: SplitConfig,
    /// Oversampling of the training partition; `None` disables it
    pub balance: Option<BalanceConfig>,
    pub booster: BoosterConfig,
    pub prediction: PredictionConfig,
}

impl PipelineConfig {
    /// Balancing variant
    pub fn outbreak() -> Self {
        Self {
            variant: Variant::Outbreak,
            schema: Schema::outbreak(),
            preprocessing: PreprocessingConfig {
                missing_strategy: MissingValueStrategy::Median,
                standardize: false,
            },
            split: SplitConfig::default(),
            balance: Some(BalanceConfig::default()),
            booster: BoosterConfig::outbreak_default(),
            prediction: PredictionConfig {
                shape: OutputShape::Aggregated,
                ..PredictionConfig::default()
            },
        }
    }

    /// Simple variant
    pub fn disease() -> Self {
        Self {
            variant: Variant::Disease,
            schema: Schema::disease(),
            preprocessing: PreprocessingConfig {
                missing_strategy: MissingValueStrategy::Zero,
                standardize: true,
            },
            split: SplitConfig::default(),
            balance: None,
            booster: BoosterConfig::disease_default(),
            prediction: PredictionConfig::default(),
        }
    }

    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Outbreak => Self::outbreak(),
            Variant::Disease => Self::disease(),
        }
    }

    /// Parse JSON; fields left out take the preset of the named variant
    pub fn from_json_str(json: &str) -> Result<Self> {
        let overrides: Value = serde_json::from_str(json).context("Failed to parse config JSON")?;
        let variant = match overrides.get("variant") {
            Some(v) => serde_json::from_value(v.clone()).context("Invalid variant")?,
            None => Variant::default(),
        };
        let mut merged = serde_json::to_value(Self::for_variant(variant))?;
        merge(&mut merged, overrides);
        let config: Self = serde_json::from_value(merged).context("Invalid pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_json_str(&json).with_context(|| format!("Failed to load config {:?}", path))
    }

    /// Check ranges and counts
    pub fn validate(&self) -> Result<()> {
        let b = &self.booster;
        let checks = [
            validation::in_range(self.split.test_ratio, 0.0, 0.9, "split.test_ratio"),
            validation::positive(b.n_estimators, "booster.n_estimators"),
            validation::positive(b.learning_rate, "booster.learning_rate"),
            validation::in_range(b.subsample, f32::MIN_POSITIVE, 1.0, "booster.subsample"),
            validation::in_range(b.colsample_bytree, f32::MIN_POSITIVE, 1.0, "booster.colsample_bytree"),
            validation::in_range(b.reg_alpha, 0.0, f32::MAX, "booster.reg_alpha"),
            validation::in_range(b.reg_lambda, 0.0, f32::MAX, "booster.reg_lambda"),
            validation::in_range(b.gamma, 0.0, f32::MAX, "booster.gamma"),
            validation::in_range(b.min_child_weight, 0.0, f32::MAX, "booster.min_child_weight"),
            validation::in_range(b.max_bins, 2, u16::MAX as usize, "booster.max_bins"),
            validation::in_range(self.prediction.threshold, 0.0, 1.0, "prediction.threshold"),
        ];
        for check in checks {
            check.map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        }
        if let Some(balance) = &self.balance {
            validation::positive(balance.target_count, "balance.target_count")
                .and(validation::positive(balance.k_neighbors, "balance.k_neighbors"))
                .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::outbreak()
    }
}

/// Recursively overlay `patch` onto `base`; objects merge, everything else replaces
fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
