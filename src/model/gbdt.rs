use crate::error::PipelineError;
use crate::model::objective::softmax_inplace;
use crate::model::tree::RegressionTree;
use crate::model::BoosterConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Multiclass gradient-boosted tree ensemble.
///
/// Every boosting round holds one tree per class; the raw score of class `c`
/// is `base_score[c]` plus the outputs of all round trees for `c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    pub num_features: usize,
    pub num_classes: usize,
    pub base_score: Vec<f32>,
    /// Trees indexed as `rounds[round][class]`
    pub rounds: Vec<Vec<RegressionTree>>,
    /// Zero-based round with the best held-out loss, when early stopping ran
    pub best_iteration: Option<usize>,
    pub config: BoosterConfig,
}

impl GradientBoostedClassifier {
    pub fn new(num_features: usize, base_score: Vec<f32>, config: BoosterConfig) -> Self {
        Self {
            num_features,
            num_classes: base_score.len(),
            base_score,
            rounds: Vec::new(),
            best_iteration: None,
            config,
        }
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn push_round(&mut self, trees: Vec<RegressionTree>) {
        debug_assert_eq!(trees.len(), self.num_classes);
        self.rounds.push(trees);
    }

    /// Keep only the first `n_rounds` rounds
    pub fn truncate(&mut self, n_rounds: usize) {
        self.rounds.truncate(n_rounds);
    }

    /// Raw (pre-softmax) scores for one row
    pub fn predict_raw_row(&self, row: &[f32]) -> Vec<f32> {
        let mut scores = self.base_score.clone();
        for trees in &self.rounds {
            for (score, tree) in scores.iter_mut().zip(trees) {
                *score += tree.predict(row);
            }
        }
        scores
    }

    /// Class probabilities, one vector of `num_classes` per row
    pub fn predict_proba(&self, rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        self.check_width(rows)?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut scores = self.predict_raw_row(row);
                softmax_inplace(&mut scores);
                scores
            })
            .collect())
    }

    /// Most probable class index per row
    pub fn predict(&self, rows: &[Vec<f32>]) -> Result<Vec<usize>> {
        Ok(self.predict_proba(rows)?.iter().map(|p| argmax(p)).collect())
    }

    /// Total split gain per feature, normalized to sum to one
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.num_features];
        for tree in self.rounds.iter().flatten() {
            tree.accumulate_gain(&mut totals);
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|t| *t /= sum);
        }
        totals
    }

    fn check_width(&self, rows: &[Vec<f32>]) -> Result<()> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.num_features) {
            return Err(PipelineError::ShapeMismatch(format!(
                "model expects {} features, got {}",
                self.num_features,
                row.len()
            ))
            .into());
        }
        Ok(())
    }
}

/// Index of the largest value; ties resolve to the lowest index
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
