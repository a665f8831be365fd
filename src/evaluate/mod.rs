//! Classification metrics for the held-out partition.

use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confusion matrix for a `K`-class classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`)
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Correct predictions over all predictions; 0 when empty
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: u32 = (0..self.n_classes).map(|c| self.get(c, c)).sum();
        correct as f64 / total as f64
    }

    /// Rows of the matrix as nested vectors
    pub fn rows(&self) -> Vec<Vec<u32>> {
        self.counts.chunks(self.n_classes.max(1)).map(<[u32]>::to_vec).collect()
    }
}

/// Precision/recall/F1 for a single class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    /// `TP / (TP + FP)`, 0 when nothing was predicted as this class
    pub precision: f64,
    /// `TP / (TP + FN)`, 0 when the class has no support
    pub recall: f64,
    pub f1: f64,
    /// Number of true examples for the class
    pub support: u32,
}

/// Averaged precision/recall/F1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Classification report over a labelled partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub confusion_matrix: Vec<Vec<u32>>,
    pub total: u32,
}

impl ClassificationReport {
    /// Build a report from encoded truth and predicted labels.
    ///
    /// `classes[i]` names class index `i`.
    pub fn compute(truth: &[usize], predicted: &[usize], classes: &[String]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} true labels but {} predictions",
                truth.len(),
                predicted.len()
            ))
            .into());
        }
        let k = classes.len();
        let mut cm = ConfusionMatrix::new(k);
        for (&t, &p) in truth.iter().zip(predicted) {
            if let Some(&index) = [t, p].iter().find(|&&i| i >= k) {
                return Err(PipelineError::UnknownClassIndex { index, num_classes: k }.into());
            }
            cm.add(t, p);
        }
        Ok(Self::from_confusion(&cm, classes))
    }

    pub fn from_confusion(cm: &ConfusionMatrix, classes: &[String]) -> Self {
        let k = cm.n_classes;
        let per_class: Vec<ClassMetrics> = (0..k)
            .map(|c| {
                let tp = cm.get(c, c) as f64;
                let support: u32 = (0..k).map(|j| cm.get(c, j)).sum();
                let predicted: u32 = (0..k).map(|i| cm.get(i, c)).sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                ClassMetrics {
                    label: classes.get(c).cloned().unwrap_or_else(|| c.to_string()),
                    precision,
                    recall,
                    f1: ratio(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect();

        let total = cm.total();
        let macro_avg = average(&per_class, |_| 1.0);
        let weighted_avg = average(&per_class, |m| m.support as f64);

        Self {
            accuracy: cm.accuracy(),
            per_class,
            macro_avg,
            weighted_avg,
            confusion_matrix: cm.rows(),
            total,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn average(metrics: &[ClassMetrics], weight: impl Fn(&ClassMetrics) -> f64) -> AveragedMetrics {
    let total: f64 = metrics.iter().map(&weight).sum();
    if total == 0.0 {
        return AveragedMetrics::default();
    }
    let mut avg = AveragedMetrics::default();
    for m in metrics {
        let w = weight(m) / total;
        avg.precision += w * m.precision;
        avg.recall += w * m.recall;
        avg.f1 += w * m.f1;
    }
    avg
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|m| m.label.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9}  {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>width$}  {:>9.2}  {:>9.2}  {:>9.2}  {:>9}",
                m.label,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                width = width
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9.2}  {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total,
            width = width
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$}  {:>9.2}  {:>9.2}  {:>9.2}  {:>9}",
                name,
                avg.precision,
                avg.recall,
                avg.f1,
                self.total,
                width = width
            )?;
        }
        Ok(())
    }
}
