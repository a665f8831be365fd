use crate::error::PipelineError;
use crate::model::gbdt::GradientBoostedClassifier;
use crate::model::histogram::BinnedMatrix;
use crate::model::objective::SoftmaxLoss;
use crate::model::tree::{GainParams, TreeGrower};
use crate::model::{BoosterConfig, EVAL_METRIC, OBJECTIVE, TREE_METHOD};
use crate::training::callbacks::{CallbackAction, CallbackManager, EarlyStoppingCallback, TrainingCallback};
use crate::training::{TrainingResult, TrainingState};
use crate::utils::random::seeded_rng;
use anyhow::Result;
use rand::seq::index;
use rand::Rng;
use std::time::Instant;
use tracing::{debug, info};

/// Rows and encoded labels handed to the trainer
#[derive(Debug, Clone, Copy)]
pub struct LabelledRows<'a> {
    pub rows: &'a [Vec<f32>],
    pub labels: &'a [usize],
}

impl<'a> LabelledRows<'a> {
    pub fn new(rows: &'a [Vec<f32>], labels: &'a [usize]) -> Self {
        Self { rows, labels }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Gradient-boosting trainer
pub struct Trainer {
    config: BoosterConfig,
    callbacks: CallbackManager,
}

impl Trainer {
    pub fn new(config: BoosterConfig) -> Self {
        Self {
            config,
            callbacks: CallbackManager::new(),
        }
    }

    /// Attach a callback
    pub fn with_callback<C: TrainingCallback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.add_callback(callback);
        self
    }

    pub fn config(&self) -> &BoosterConfig {
        &self.config
    }

    /// Fit a `num_classes`-way ensemble on `train`.
    ///
    /// When `eval` is non-empty its log-loss is tracked every round, boosting
    /// stops after `early_stopping_rounds` rounds without improvement and the
    /// ensemble is truncated to the best round.
    pub fn fit(
        &mut self,
        train: LabelledRows<'_>,
        eval: Option<LabelledRows<'_>>,
        num_classes: usize,
    ) -> Result<TrainingResult> {
        self.validate(&train, eval.as_ref(), num_classes)?;
        let eval = eval.filter(|e| !e.is_empty());

        let start = Instant::now();
        let config = self.config.clone();
        let n_rows = train.len();
        let n_features = train.rows[0].len();
        let k = num_classes;

        info!(
            "Boosting {} classes on {} rows x {} features (objective {}, tree method {}, eval metric {})",
            k, n_rows, n_features, OBJECTIVE, TREE_METHOD, EVAL_METRIC
        );

        let objective = SoftmaxLoss::new(k);
        let base_score = objective.base_score(train.labels);
        let mut model = GradientBoostedClassifier::new(n_features, base_score.clone(), config.clone());

        let matrix = BinnedMatrix::from_rows(train.rows, config.max_bins);
        let params = GainParams {
            reg_lambda: config.reg_lambda as f64,
            reg_alpha: config.reg_alpha as f64,
            gamma: config.gamma as f64,
            min_child_weight: config.min_child_weight as f64,
        };
        let grower = TreeGrower::new(&matrix, params, config.max_depth, config.learning_rate);

        let mut train_raw: Vec<f32> = base_score.iter().copied().cycle().take(n_rows * k).collect();
        let mut eval_raw: Vec<f32> = eval
            .map(|e| base_score.iter().copied().cycle().take(e.len() * k).collect())
            .unwrap_or_default();

        let mut gradients = vec![0.0f32; n_rows * k];
        let mut hessians = vec![0.0f32; n_rows * k];
        let mut class_grad = vec![0.0f32; n_rows];
        let mut class_hess = vec![0.0f32; n_rows];

        let mut early_stopping = (eval.is_some() && config.early_stopping_rounds > 0)
            .then(|| EarlyStoppingCallback::new(config.early_stopping_rounds));
        if eval.is_none() {
            debug!("No evaluation rows; early stopping disabled");
        }

        let mut rng = seeded_rng(config.seed);
        let mut state = TrainingState::new();
        let mut stopped_early = false;
        self.callbacks.on_train_begin(&config);

        for _ in 0..config.n_estimators {
            objective.compute_gradients(&train_raw, train.labels, &mut gradients, &mut hessians);
            let rows = sample_rows(&mut rng, n_rows, config.subsample);

            let mut trees = Vec::with_capacity(k);
            for class in 0..k {
                for i in 0..n_rows {
                    class_grad[i] = gradients[i * k + class];
                    class_hess[i] = hessians[i * k + class];
                }
                let features = sample_features(&mut rng, n_features, config.colsample_bytree);
                let tree = grower.grow(&rows, &features, &class_grad, &class_hess);

                for (i, row) in train.rows.iter().enumerate() {
                    train_raw[i * k + class] += tree.predict(row);
                }
                if let Some(e) = eval {
                    for (i, row) in e.rows.iter().enumerate() {
                        eval_raw[i * k + class] += tree.predict(row);
                    }
                }
                trees.push(tree);
            }
            model.push_round(trees);

            let train_loss = objective.log_loss(&train_raw, train.labels);
            let eval_loss = eval.map(|e| objective.log_loss(&eval_raw, e.labels));
            state.update_round(train_loss, eval_loss);

            let mut action = self.callbacks.on_round_end(&state);
            if let Some(callback) = early_stopping.as_mut() {
                if callback.on_round_end(&state) == CallbackAction::Stop {
                    action = CallbackAction::Stop;
                }
            }
            if action == CallbackAction::Stop {
                stopped_early = true;
                break;
            }
        }

        if early_stopping.is_some() {
            if let Some(best) = state.best_round {
                model.truncate(best + 1);
                model.best_iteration = Some(best);
                info!(
                    "Best round {} of {} (eval mlogloss {:.5})",
                    best + 1,
                    state.round,
                    state.best_loss
                );
            }
        }
        self.callbacks.on_train_end(&state);

        Ok(TrainingResult {
            model,
            state,
            stopped_early,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn validate(&self, train: &LabelledRows<'_>, eval: Option<&LabelledRows<'_>>, num_classes: usize) -> Result<()> {
        if num_classes < 2 {
            return Err(PipelineError::TooFewClasses(num_classes).into());
        }
        if train.is_empty() {
            return Err(PipelineError::EmptyDataset("no training rows".into()).into());
        }
        if self.config.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig("n_estimators must be positive".into()).into());
        }
        let n_features = train.rows[0].len();
        for (name, set) in std::iter::once(("train", train)).chain(eval.map(|e| ("eval", e))) {
            if set.rows.len() != set.labels.len() {
                return Err(PipelineError::ShapeMismatch(format!(
                    "{} has {} rows but {} labels",
                    name,
                    set.rows.len(),
                    set.labels.len()
                ))
                .into());
            }
            if set.rows.iter().any(|r| r.len() != n_features) {
                return Err(PipelineError::ShapeMismatch(format!(
                    "{} rows must all have {} features",
                    name, n_features
                ))
                .into());
            }
            if let Some(&label) = set.labels.iter().find(|&&l| l >= num_classes) {
                return Err(PipelineError::UnknownClassIndex { index: label, num_classes }.into());
            }
        }
        Ok(())
    }
}

/// Sorted row indices for one round
fn sample_rows<R: Rng>(rng: &mut R, n_rows: usize, fraction: f32) -> Vec<u32> {
    if fraction >= 1.0 {
        return (0..n_rows as u32).collect();
    }
    let amount = ((n_rows as f32 * fraction).round() as usize).clamp(1, n_rows);
    let mut rows: Vec<u32> = index::sample(rng, n_rows, amount)
        .into_iter()
        .map(|i| i as u32)
        .collect();
    rows.sort_unstable();
    rows
}

/// Sorted feature indices for one tree
fn sample_features<R: Rng>(rng: &mut R, n_features: usize, fraction: f32) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n_features).collect();
    }
    let amount = ((n_features as f32 * fraction).round() as usize).clamp(1, n_features);
    let mut features = index::sample(rng, n_features, amount).into_vec();
    features.sort_unstable();
    features
}
