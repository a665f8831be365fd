use crate::data::FeatureVector;
use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Missing value handling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingValueStrategy {
    /// Use mean imputation
    Mean,
    /// Use median imputation
    #[default]
    Median,
    /// Use zero imputation
    Zero,
}

/// Per-column statistics over observed (non-missing) values
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    /// Mean value for each feature
    pub means: Vec<f32>,
    /// Population standard deviation for each feature
    pub stds: Vec<f32>,
    /// Median value for each feature
    pub medians: Vec<f32>,
    /// Number of observed values for each feature
    pub counts: Vec<usize>,
}

impl FeatureStats {
    /// Compute statistics from feature vectors, skipping missing cells.
    /// Columns with no observed values get zero mean/median and unit std.
    pub fn compute(vectors: &[FeatureVector], n_features: usize) -> Self {
        let mut means = vec![0.0f32; n_features];
        let mut stds = vec![1.0f32; n_features];
        let mut medians = vec![0.0f32; n_features];
        let mut counts = vec![0usize; n_features];

        for i in 0..n_features {
            let mut values: Vec<f32> = vectors
                .iter()
                .filter(|v| v.has_feature(i) && !v.features[i].is_nan())
                .map(|v| v.features[i])
                .collect();
            counts[i] = values.len();
            if values.is_empty() {
                continue;
            }

            let n = values.len() as f64;
            let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
            means[i] = mean as f32;

            if values.len() > 1 {
                let var = values
                    .iter()
                    .map(|&v| (v as f64 - mean).powi(2))
                    .sum::<f64>()
                    / n;
                stds[i] = var.sqrt() as f32;
            }
            if stds[i] < 1e-8 {
                stds[i] = 1.0;
            }

            values.sort_by(f32::total_cmp);
            let mid = values.len() / 2;
            medians[i] = if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            };
        }

        Self {
            means,
            stds,
            medians,
            counts,
        }
    }

    /// Fill values for the given strategy
    pub fn fill_values(&self, strategy: MissingValueStrategy) -> Vec<f32> {
        match strategy {
            MissingValueStrategy::Mean => self.means.clone(),
            MissingValueStrategy::Median => self.medians.clone(),
            MissingValueStrategy::Zero => vec![0.0; self.means.len()],
        }
    }
}

/// Z-score parameters learned from the imputed training partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub means: Vec<f32>,
    pub stds: Vec<f32>,
}

/// Fitted preprocessing state: imputation and optional standardization.
///
/// Fitted on the training partition only and applied unchanged to every
/// other partition and to inference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Feature names in model input order
    pub feature_names: Vec<String>,
    /// Missing value handling strategy
    pub missing_strategy: MissingValueStrategy,
    /// Whether to standardize features after imputation
    pub standardize: bool,
    /// Per-column fill values (computed during fit)
    fill_values: Option<Vec<f32>>,
    /// Standardization parameters (computed during fit)
    scaling: Option<Scaling>,
}

impl Preprocessor {
    /// Create new preprocessor
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            missing_strategy: MissingValueStrategy::default(),
            standardize: false,
            fill_values: None,
            scaling: None,
        }
    }

    /// Set missing value strategy
    pub fn with_missing_strategy(mut self, strategy: MissingValueStrategy) -> Self {
        self.missing_strategy = strategy;
        self
    }

    /// Set standardization flag
    pub fn with_standardization(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.fill_values.is_some()
    }

    /// Fitted fill values, one per feature
    pub fn fill_values(&self) -> Option<&[f32]> {
        self.fill_values.as_deref()
    }

    /// Fitted standardization parameters
    pub fn scaling(&self) -> Option<&Scaling> {
        self.scaling.as_ref()
    }

    /// Fit preprocessor on training data
    pub fn fit(&mut self, vectors: &[FeatureVector]) -> Result<()> {
        if vectors.is_empty() {
            return Err(PipelineError::EmptyDataset("cannot fit preprocessor on zero rows".into()).into());
        }
        self.check_width(vectors)?;
        info!(
            "Fitting preprocessor on {} samples ({:?} imputation)",
            vectors.len(),
            self.missing_strategy
        );

        let stats = FeatureStats::compute(vectors, self.n_features());
        for (name, &count) in self.feature_names.iter().zip(&stats.counts) {
            if count < vectors.len() {
                debug!("Column '{}': {} of {} values missing", name, vectors.len() - count, vectors.len());
            }
        }
        let fill = stats.fill_values(self.missing_strategy);

        self.scaling = if self.standardize {
            let mut imputed = vectors.to_vec();
            for vector in imputed.iter_mut() {
                impute(&mut vector.features, &vector.mask, &fill);
            }
            let observed = imputed
                .into_iter()
                .map(|mut v| {
                    v.mask.iter_mut().for_each(|m| *m = true);
                    v
                })
                .collect::<Vec<_>>();
            let scaled = FeatureStats::compute(&observed, self.n_features());
            Some(Scaling {
                means: scaled.means,
                stds: scaled.stds,
            })
        } else {
            None
        };
        self.fill_values = Some(fill);
        Ok(())
    }

    /// Transform feature vectors in place
    pub fn transform(&self, vectors: &mut [FeatureVector]) -> Result<()> {
        let fill = self
            .fill_values
            .as_ref()
            .ok_or(PipelineError::NotFitted("preprocessor"))?;
        self.check_width(vectors)?;

        for vector in vectors.iter_mut() {
            impute(&mut vector.features, &vector.mask, fill);
            if let Some(scaling) = &self.scaling {
                for (i, value) in vector.features.iter_mut().enumerate() {
                    *value = (*value - scaling.means[i]) / scaling.stds[i];
                }
            }
        }
        Ok(())
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, vectors: &mut [FeatureVector]) -> Result<()> {
        self.fit(vectors)?;
        self.transform(vectors)
    }

    fn check_width(&self, vectors: &[FeatureVector]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.features.len() != self.n_features()) {
            return Err(PipelineError::ShapeMismatch(format!(
                "expected {} features, got {}",
                self.n_features(),
                bad.features.len()
            ))
            .into());
        }
        Ok(())
    }
}

/// Replace missing or NaN entries with the per-column fill value
fn impute(features: &mut [f32], mask: &[bool], fill: &[f32]) {
    for (i, (value, &is_present)) in features.iter_mut().zip(mask).enumerate() {
        if !is_present || value.is_nan() {
            *value = fill[i];
        }
    }
}
