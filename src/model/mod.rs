pub mod checkpoint;
pub mod gbdt;
pub mod histogram;
pub mod objective;
pub mod tree;

use serde::{Deserialize, Serialize};

/// Objective reported in metadata: softmax class probabilities
pub const OBJECTIVE: &str = "multi:softprob";

/// Metric monitored on the held-out partition
pub const EVAL_METRIC: &str = "mlogloss";

/// Split finding method
pub const TREE_METHOD: &str = "hist";

/// Gradient-boosted tree hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterConfig {
    /// Maximum number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf
    pub learning_rate: f32,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Row fraction sampled per round
    pub subsample: f32,
    /// Column fraction sampled per tree
    pub colsample_bytree: f32,
    /// L1 regularization on leaf weights
    pub reg_alpha: f32,
    /// L2 regularization on leaf weights
    pub reg_lambda: f32,
    /// Minimum loss reduction required to split
    pub gamma: f32,
    /// Minimum hessian sum per child
    pub min_child_weight: f32,
    /// Maximum histogram bins per feature
    pub max_bins: usize,
    /// Rounds without held-out improvement before stopping (0 = disabled)
    pub early_stopping_rounds: usize,
    /// Random seed
    pub seed: u64,
}

impl BoosterConfig {
    /// Hyperparameters of the outbreak (balancing) variant
    pub fn outbreak_default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 6,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_alpha: 0.1,
            reg_lambda: 1.0,
            gamma: 0.1,
            min_child_weight: 1.0,
            max_bins: 256,
            early_stopping_rounds: 20,
            seed: 42,
        }
    }

    /// Hyperparameters of the disease variant
    pub fn disease_default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_bins: 256,
            early_stopping_rounds: 10,
            seed: 42,
        }
    }

    /// Create a small configuration for fast tests
    pub fn quick_test() -> Self {
        Self {
            n_estimators: 20,
            max_depth: 3,
            early_stopping_rounds: 5,
            ..Self::outbreak_default()
        }
    }
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self::outbreak_default()
    }
}
