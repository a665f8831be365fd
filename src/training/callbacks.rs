use crate::model::BoosterConfig;
use crate::training::TrainingState;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Instant;

/// What the trainer should do after a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Training callback trait
///
/// Callbacks observe the boosting loop; any callback may ask it to stop.
pub trait TrainingCallback {
    /// Called before the first round
    fn on_train_begin(&mut self, _config: &BoosterConfig) {}

    /// Called after every round
    fn on_round_end(&mut self, _state: &TrainingState) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called once boosting has finished
    fn on_train_end(&mut self, _state: &TrainingState) {}
}

/// Callback manager that handles multiple callbacks
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn add_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn on_train_begin(&mut self, config: &BoosterConfig) {
        for callback in &mut self.callbacks {
            callback.on_train_begin(config);
        }
    }

    /// Notify every callback; stop if any of them asks to
    pub fn on_round_end(&mut self, state: &TrainingState) -> CallbackAction {
        let mut action = CallbackAction::Continue;
        for callback in &mut self.callbacks {
            if callback.on_round_end(state) == CallbackAction::Stop {
                action = CallbackAction::Stop;
            }
        }
        action
    }

    pub fn on_train_end(&mut self, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_train_end(state);
        }
    }
}

/// Stop once the held-out loss has not improved for `patience` rounds
pub struct EarlyStoppingCallback {
    patience: usize,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize) -> Self {
        Self { patience }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn on_round_end(&mut self, state: &TrainingState) -> CallbackAction {
        if state.should_stop_early(self.patience) {
            tracing::info!(
                "Early stopping at round {}: no improvement for {} rounds (best round {}, mlogloss {:.5})",
                state.round,
                self.patience,
                state.best_round.map_or(0, |r| r + 1),
                state.best_loss
            );
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }
}

/// Progress bar over boosting rounds, drawn on stderr
pub struct ProgressBarCallback {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl ProgressBarCallback {
    pub fn new() -> Self {
        Self {
            bar: None,
            hidden: false,
        }
    }

    /// Progress bar that never draws
    pub fn hidden() -> Self {
        Self {
            bar: None,
            hidden: true,
        }
    }
}

impl Default for ProgressBarCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingCallback for ProgressBarCallback {
    fn on_train_begin(&mut self, config: &BoosterConfig) {
        let bar = ProgressBar::new(config.n_estimators as u64);
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_draw_target(ProgressDrawTarget::stderr());
        }
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rounds {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        self.bar = Some(bar);
    }

    fn on_round_end(&mut self, state: &TrainingState) -> CallbackAction {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            if let Some(loss) = state.last_eval_loss().or(state.last_train_loss()) {
                bar.set_message(format!("mlogloss {:.4}", loss));
            }
        }
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, _state: &TrainingState) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Periodic loss logging
pub struct ProgressLoggerCallback {
    log_frequency: usize,
    start_time: Option<Instant>,
}

impl ProgressLoggerCallback {
    pub fn new(log_frequency: usize) -> Self {
        Self {
            log_frequency: log_frequency.max(1),
            start_time: None,
        }
    }
}

impl TrainingCallback for ProgressLoggerCallback {
    fn on_train_begin(&mut self, _config: &BoosterConfig) {
        self.start_time = Some(Instant::now());
    }

    fn on_round_end(&mut self, state: &TrainingState) -> CallbackAction {
        if state.round % self.log_frequency == 0 {
            match (state.last_train_loss(), state.last_eval_loss()) {
                (Some(train), Some(eval)) => tracing::debug!(
                    "Round {} - train-mlogloss: {:.5}, eval-mlogloss: {:.5}",
                    state.round,
                    train,
                    eval
                ),
                (Some(train), None) => tracing::debug!("Round {} - train-mlogloss: {:.5}", state.round, train),
                _ => {}
            }
        }
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, state: &TrainingState) {
        if let Some(start) = self.start_time {
            tracing::info!("Boosting finished in {:.2?} ({} rounds)", start.elapsed(), state.round);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_eval(losses: &[f64]) -> TrainingState {
        let mut state = TrainingState::new();
        for &loss in losses {
            state.update_round(loss, Some(loss));
        }
        state
    }

    #[test]
    fn test_early_stopping() {
        let mut callback = EarlyStoppingCallback::new(2);

        assert_eq!(callback.on_round_end(&state_with_eval(&[1.0])), CallbackAction::Continue);
        assert_eq!(callback.on_round_end(&state_with_eval(&[1.0, 1.1])), CallbackAction::Continue);
        assert_eq!(callback.on_round_end(&state_with_eval(&[1.0, 1.1, 1.2])), CallbackAction::Stop);
    }

    #[test]
    fn test_callback_manager() {
        let mut manager = CallbackManager::new();
        manager.add_callback(ProgressLoggerCallback::new(1));
        manager.add_callback(ProgressBarCallback::hidden());
        manager.add_callback(EarlyStoppingCallback::new(1));
        assert_eq!(manager.len(), 3);

        manager.on_train_begin(&BoosterConfig::quick_test());
        assert_eq!(manager.on_round_end(&state_with_eval(&[0.5])), CallbackAction::Continue);
        assert_eq!(manager.on_round_end(&state_with_eval(&[0.5, 0.6])), CallbackAction::Stop);
        manager.on_train_end(&state_with_eval(&[0.5, 0.6]));
    }
}
