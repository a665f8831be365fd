pub mod predictor;
pub mod writer;

use crate::model::gbdt::argmax;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Default minimum probability for a class to appear in ranked output
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Location reported for rows without one
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Shape of the prediction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    /// Per row, every class above the threshold, most probable first
    #[default]
    Ranked,
    /// One entry per distinct predicted class, probabilities averaged
    Aggregated,
}

/// Prediction output settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub shape: OutputShape,
    /// Ranked output keeps classes with probability strictly above this
    pub threshold: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            shape: OutputShape::Ranked,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// One class probability in the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseasePrediction {
    pub disease: String,
    pub probability: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Predictions for a batch of rows, in one of the two output shapes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Ranked(Vec<Vec<DiseasePrediction>>),
    Aggregated(Vec<DiseasePrediction>),
}

impl PredictionOutput {
    /// Shape the class probabilities of a batch
    pub fn build(
        probabilities: &[Vec<f32>],
        classes: &[String],
        locations: &[Option<String>],
        config: &PredictionConfig,
    ) -> Self {
        match config.shape {
            OutputShape::Ranked => PredictionOutput::Ranked(
                probabilities
                    .iter()
                    .enumerate()
                    .map(|(i, probs)| {
                        let location = locations.get(i).and_then(Option::as_deref);
                        rank_row(probs, classes, config.threshold, location)
                    })
                    .collect(),
            ),
            OutputShape::Aggregated => PredictionOutput::Aggregated(aggregate(probabilities, classes)),
        }
    }

    pub fn shape(&self) -> OutputShape {
        match self {
            PredictionOutput::Ranked(_) => OutputShape::Ranked,
            PredictionOutput::Aggregated(_) => OutputShape::Aggregated,
        }
    }

    /// Number of top-level entries (rows for ranked, classes for aggregated)
    pub fn len(&self) -> usize {
        match self {
            PredictionOutput::Ranked(rows) => rows.len(),
            PredictionOutput::Aggregated(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into `(row, prediction)` pairs; aggregated entries have no row
    pub fn entries(&self) -> Vec<(Option<usize>, &DiseasePrediction)> {
        match self {
            PredictionOutput::Ranked(rows) => rows
                .iter()
                .enumerate()
                .flat_map(|(i, row)| row.iter().map(move |p| (Some(i), p)))
                .collect(),
            PredictionOutput::Aggregated(entries) => entries.iter().map(|p| (None, p)).collect(),
        }
    }
}

/// Classes with probability above `threshold`, most probable first
pub fn rank_row(probabilities: &[f32], classes: &[String], threshold: f32, location: Option<&str>) -> Vec<DiseasePrediction> {
    let mut ranked: Vec<DiseasePrediction> = probabilities
        .iter()
        .zip(classes)
        .filter(|(p, _)| **p > threshold)
        .map(|(&p, class)| DiseasePrediction {
            disease: class.clone(),
            probability: p,
            location: Some(location.unwrap_or(UNKNOWN_LOCATION).to_string()),
        })
        .collect();
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked
}

/// One entry per distinct best class, averaging that class's probability
/// over the rows that predicted it
pub fn aggregate(probabilities: &[Vec<f32>], classes: &[String]) -> Vec<DiseasePrediction> {
    let mut groups: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for probs in probabilities {
        let best = argmax(probs);
        let entry = groups.entry(best).or_insert((0.0, 0));
        entry.0 += probs.get(best).copied().unwrap_or(0.0) as f64;
        entry.1 += 1;
    }

    let mut entries: Vec<DiseasePrediction> = groups
        .into_iter()
        .filter_map(|(class, (sum, count))| {
            classes.get(class).map(|name| DiseasePrediction {
                disease: name.clone(),
                probability: (sum / count as f64) as f32,
                location: None,
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.disease.cmp(&b.disease))
    });
    entries
}

/// Prediction summary statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PredictionSummary {
    /// Number of rows scored
    pub total_rows: usize,
    /// Rows per predicted (most probable) class
    pub class_counts: BTreeMap<String, usize>,
    /// Mean probability of the most probable class
    pub mean_top_probability: f64,
}

impl PredictionSummary {
    pub fn from_probabilities(probabilities: &[Vec<f32>], classes: &[String]) -> Self {
        let mut class_counts = BTreeMap::new();
        let mut top_sum = 0.0f64;
        for probs in probabilities {
            let best = argmax(probs);
            if let Some(name) = classes.get(best) {
                *class_counts.entry(name.clone()).or_insert(0) += 1;
            }
            top_sum += probs.get(best).copied().unwrap_or(0.0) as f64;
        }
        let total_rows = probabilities.len();
        Self {
            total_rows,
            class_counts,
            mean_top_probability: if total_rows > 0 { top_sum / total_rows as f64 } else { 0.0 },
        }
    }

    /// Log summary on the diagnostic stream
    pub fn log(&self) {
        info!(
            "Scored {} rows: {} distinct predicted classes, mean top probability {:.4}",
            self.total_rows,
            self.class_counts.len(),
            self.mean_top_probability
        );
        for (class, count) in &self.class_counts {
            info!("  {}: {} rows", class, count);
        }
    }
}
