pub mod callbacks;
pub mod trainer;

use crate::model::gbdt::GradientBoostedClassifier;

/// Boosting progress, updated after every round
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Completed rounds
    pub round: usize,
    /// Best held-out log-loss seen so far
    pub best_loss: f64,
    /// Zero-based round that produced `best_loss`
    pub best_round: Option<usize>,
    /// Rounds since `best_loss` last improved
    pub rounds_without_improvement: usize,
    /// Training log-loss per round
    pub train_loss_history: Vec<f64>,
    /// Held-out log-loss per round (empty without an evaluation set)
    pub eval_loss_history: Vec<f64>,
}

impl TrainingState {
    pub fn new() -> Self {
        Self {
            round: 0,
            best_loss: f64::INFINITY,
            best_round: None,
            rounds_without_improvement: 0,
            train_loss_history: Vec::new(),
            eval_loss_history: Vec::new(),
        }
    }

    /// Record the losses of the round that just finished
    pub fn update_round(&mut self, train_loss: f64, eval_loss: Option<f64>) {
        let index = self.round;
        self.round += 1;
        self.train_loss_history.push(train_loss);

        if let Some(loss) = eval_loss {
            self.eval_loss_history.push(loss);
            if loss < self.best_loss {
                self.best_loss = loss;
                self.best_round = Some(index);
                self.rounds_without_improvement = 0;
            } else {
                self.rounds_without_improvement += 1;
            }
        }
    }

    /// Check if should stop early
    pub fn should_stop_early(&self, patience: usize) -> bool {
        patience > 0 && self.rounds_without_improvement >= patience
    }

    pub fn last_train_loss(&self) -> Option<f64> {
        self.train_loss_history.last().copied()
    }

    pub fn last_eval_loss(&self) -> Option<f64> {
        self.eval_loss_history.last().copied()
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Fitted ensemble, truncated to the best round when early stopping ran
    pub model: GradientBoostedClassifier,
    /// Final training state
    pub state: TrainingState,
    /// Whether boosting ended before `n_estimators`
    pub stopped_early: bool,
    /// Training duration in seconds
    pub duration_secs: f64,
}
