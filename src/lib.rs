//! # outbreak: disease outbreak classification
//!
//! Trains a multiclass gradient-boosted tree classifier on tabular
//! epidemiological data and predicts the most likely disease, or the
//! outbreak severity, for new rows.
//!
//! ## Features
//!
//! - CSV/TSV loading (optionally gzipped) with schema checks
//! - Stratified train/test split, imputation and optional standardization
//! - SMOTE oversampling of minority classes
//! - Histogram-based softmax boosting with early stopping
//! - Versioned, fingerprinted artifacts shared by training and inference
//! - Ranked per-row or aggregated JSON output
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use outbreak::config::PipelineConfig;
//! use outbreak::pipeline;
//! use outbreak::predict::predictor::Predictor;
//!
//! let config = PipelineConfig::outbreak();
//! let outcome = pipeline::train_and_save("outbreaks.csv", "artifacts", &config, true).unwrap();
//! println!("{}", outcome.report);
//!
//! let predictor = Predictor::from_dir("artifacts", config.schema.clone(), config.prediction).unwrap();
//! let output = predictor.predict_file("new_cases.csv").unwrap();
//! println!("{}", serde_json::to_string(&output).unwrap());
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod pipeline;
pub mod predict;
pub mod training;
pub mod utils;

/// Re-export commonly used types
pub use config::{PipelineConfig, Variant};
pub use data::loader::DataLoader;
pub use data::{Dataset, FeatureVector, Record, Schema, Table};
pub use error::PipelineError;
pub use evaluate::ClassificationReport;
pub use model::checkpoint::{ArtifactStore, TrainedArtifacts};
pub use model::gbdt::GradientBoostedClassifier;
pub use predict::predictor::Predictor;
pub use predict::{DiseasePrediction, OutputShape, PredictionOutput};
pub use training::TrainingResult;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{} - disease outbreak classifier", NAME, VERSION)
}
