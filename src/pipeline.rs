//! End-to-end training, evaluation and prediction runs.

use crate::config::PipelineConfig;
use crate::data::balance::smote;
use crate::data::encoding::LabelEncoder;
use crate::data::loader::DataLoader;
use crate::data::preprocessing::Preprocessor;
use crate::data::split::stratified_split;
use crate::data::{convert_to_features, FeatureVector, Table, NONE_LABEL};
use crate::error::PipelineError;
use crate::evaluate::ClassificationReport;
use crate::model::checkpoint::{ArtifactStore, TrainedArtifacts, TrainingMetadata};
use crate::model::gbdt::argmax;
use crate::predict::predictor::Predictor;
use crate::predict::PredictionOutput;
use crate::training::callbacks::{ProgressBarCallback, ProgressLoggerCallback};
use crate::training::trainer::{LabelledRows, Trainer};
use crate::utils::format_duration;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifacts: TrainedArtifacts,
    pub report: ClassificationReport,
    pub metadata: TrainingMetadata,
}

fn label_of(vector: &FeatureVector) -> &str {
    vector.label.as_deref().unwrap_or(NONE_LABEL)
}

fn into_rows(vectors: Vec<FeatureVector>) -> Vec<Vec<f32>> {
    vectors.into_iter().map(|v| v.features).collect()
}

/// Split, preprocess, balance, encode and fit on a labelled table
pub fn train_table(table: &Table, config: &PipelineConfig, show_progress: bool) -> Result<TrainOutcome> {
    config.validate()?;
    if table.is_empty() {
        return Err(PipelineError::EmptyDataset("training table has no rows".into()).into());
    }
    info!(
        "Training {} variant on {} rows, class distribution {:?}",
        config.variant,
        table.len(),
        table.class_counts()
    );

    let vectors = convert_to_features(&table.records);
    let dataset = stratified_split(vectors, &config.split)?;
    let (mut train, mut test) = (dataset.train, dataset.test);
    info!("Split: {} train / {} test rows", train.len(), test.len());

    let mut preprocessor = Preprocessor::new(table.feature_names.clone())
        .with_missing_strategy(config.preprocessing.missing_strategy)
        .with_standardization(config.preprocessing.standardize);
    preprocessor.fit(&train)?;
    preprocessor.transform(&mut train)?;
    preprocessor.transform(&mut test)?;

    let encoder = LabelEncoder::fit(train.iter().map(label_of))?;
    if encoder.num_classes() < 2 {
        return Err(PipelineError::TooFewClasses(encoder.num_classes()).into());
    }
    info!("Classes: {:?}", encoder.classes());

    let train = match &config.balance {
        Some(balance) => smote(&train, balance)?,
        None => train,
    };
    let train_rows = train.len();

    let y_train = encoder.encode_all(train.iter().map(label_of))?;
    let y_test = encoder
        .encode_all(test.iter().map(label_of))
        .context("Held-out partition contains a label absent from training")?;
    let x_train = into_rows(train);
    let x_test = into_rows(test);

    let progress = if show_progress {
        ProgressBarCallback::new()
    } else {
        ProgressBarCallback::hidden()
    };
    let mut trainer = Trainer::new(config.booster.clone())
        .with_callback(progress)
        .with_callback(ProgressLoggerCallback::new(10));
    let result = trainer.fit(
        LabelledRows::new(&x_train, &y_train),
        Some(LabelledRows::new(&x_test, &y_test)),
        encoder.num_classes(),
    )?;
    info!(
        "Trained {} rounds in {}",
        result.model.n_rounds(),
        format_duration(result.duration_secs)
    );

    if x_test.is_empty() {
        warn!("Held-out partition is empty; reporting zero accuracy");
    }
    let predicted = result.model.predict(&x_test)?;
    let report = ClassificationReport::compute(&y_test, &predicted, encoder.classes())?;
    info!("Held-out accuracy: {:.4}", report.accuracy);
    info!("Classification report:\n{}", report);

    let importance: Vec<(String, f64)> = preprocessor
        .feature_names
        .iter()
        .cloned()
        .zip(result.model.feature_importance())
        .collect();
    let mut ranked = importance.clone();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, gain) in ranked.iter().take(5) {
        info!("  importance {:<24} {:.4}", name, gain);
    }

    let artifacts = TrainedArtifacts {
        model: result.model,
        encoder,
        preprocessor,
    };
    let metadata = TrainingMetadata {
        crate_version: crate::VERSION.to_string(),
        variant: config.variant.to_string(),
        fingerprint: artifacts.fingerprint(),
        trained_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        train_rows,
        test_rows: x_test.len(),
        feature_names: artifacts.preprocessor.feature_names.clone(),
        classes: artifacts.encoder.classes().to_vec(),
        rounds_trained: artifacts.model.n_rounds(),
        best_iteration: artifacts.model.best_iteration,
        duration_secs: result.duration_secs,
        booster: config.booster.clone(),
        report: report.clone(),
        feature_importance: importance,
    };

    Ok(TrainOutcome {
        artifacts,
        report,
        metadata,
    })
}

/// Load a labelled file and train on it
pub fn train_file<P: AsRef<Path>>(path: P, config: &PipelineConfig, show_progress: bool) -> Result<TrainOutcome> {
    let table = DataLoader::new(config.schema.clone()).load(path)?;
    train_table(&table, config, show_progress)
}

/// Train on a file and persist the artifacts
pub fn train_and_save<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    artifact_dir: Q,
    config: &PipelineConfig,
    show_progress: bool,
) -> Result<TrainOutcome> {
    let outcome = train_file(input, config, show_progress)?;
    ArtifactStore::new(artifact_dir)
        .save(&outcome.artifacts, &outcome.metadata)
        .context("Failed to save artifacts")?;
    Ok(outcome)
}

/// Report on labelled data with stored artifacts
pub fn evaluate_table(predictor: &Predictor, table: &Table) -> Result<ClassificationReport> {
    let encoder = &predictor.artifacts().encoder;
    let truth = encoder.encode_all(
        table
            .records
            .iter()
            .map(|r| r.label.as_deref().unwrap_or(NONE_LABEL)),
    )?;
    let batch = predictor.score(table)?;
    let predicted: Vec<usize> = batch.probabilities.iter().map(|p| argmax(p)).collect();
    ClassificationReport::compute(&truth, &predicted, encoder.classes())
}

/// Load labelled data through the stored feature contract and evaluate
pub fn evaluate_file<P: AsRef<Path>>(predictor: &Predictor, path: P) -> Result<ClassificationReport> {
    let table = DataLoader::new(predictor.input_schema().clone()).load(path)?;
    let report = evaluate_table(predictor, &table)?;
    info!("Accuracy on {} rows: {:.4}", table.len(), report.accuracy);
    info!("Classification report:\n{}", report);
    Ok(report)
}

/// Train on `input`, persist to `artifact_dir`, reload and predict on the
/// same file
pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    artifact_dir: Q,
    config: &PipelineConfig,
) -> Result<PredictionOutput> {
    let input = input.as_ref();
    let artifact_dir = artifact_dir.as_ref();
    train_and_save(input, artifact_dir, config, false)?;
    let predictor = Predictor::from_dir(artifact_dir, config.schema.clone(), config.prediction)?;
    predictor.predict_file(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{OUTBREAK_FEATURES, OUTBREAK_TARGET};
    use crate::predict::OutputShape;
    use rand::Rng;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    /// 14 feature columns plus target; class shifts the feature means
    fn outbreak_csv(labels: &[&str], seed: u64) -> String {
        let mut rng = crate::utils::random::seeded_rng(seed);
        let mut csv = OUTBREAK_FEATURES.join(",");
        writeln!(csv, ",{}", OUTBREAK_TARGET).unwrap();
        for label in labels {
            let shift = match *label {
                "High" => 10.0,
                "Medium" => 5.0,
                _ => 0.0,
            };
            let cells: Vec<String> = (0..OUTBREAK_FEATURES.len())
                .map(|_| format!("{:.3}", shift + rng.gen_range(0.0..2.0)))
                .collect();
            writeln!(csv, "{},{}", cells.join(","), label).unwrap();
        }
        csv
    }

    fn ten_row_labels() -> Vec<&'static str> {
        vec!["High", "Low", "Medium", "High", "Low", "Medium", "High", "Low", "Medium", "High"]
    }

    fn write_csv(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_ten_row_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_csv(&temp_dir, "train.csv", &outbreak_csv(&ten_row_labels(), 1));
        let artifact_dir = temp_dir.path().join("artifacts");
        let config = PipelineConfig::outbreak();

        let outcome = train_and_save(&input, &artifact_dir, &config, false).unwrap();
        assert!((0.0..=1.0).contains(&outcome.report.accuracy));
        assert_eq!(outcome.metadata.classes, vec!["High", "Low", "Medium"]);
        assert_eq!(outcome.metadata.train_rows, 3 * 280);

        let ranked_config = crate::predict::PredictionConfig {
            shape: OutputShape::Ranked,
            threshold: 0.0,
        };
        let predictor = Predictor::from_dir(&artifact_dir, config.schema.clone(), ranked_config).unwrap();
        let PredictionOutput::Ranked(rows) = predictor.predict_file(&input).unwrap() else {
            panic!("expected ranked output");
        };
        assert_eq!(rows.len(), 10);
        for p in rows.iter().flatten() {
            assert!((0.0..=1.0).contains(&p.probability));
        }

        let aggregated = run(&input, &artifact_dir, &config).unwrap();
        let PredictionOutput::Aggregated(entries) = aggregated else {
            panic!("expected aggregated output");
        };
        let mut diseases: Vec<_> = entries.iter().map(|e| e.disease.as_str()).collect();
        diseases.sort_unstable();
        diseases.dedup();
        assert_eq!(diseases.len(), entries.len());
        assert!(entries.iter().all(|e| (0.0..=1.0).contains(&e.probability)));
    }

    #[test]
    fn test_reload_gives_identical_predictions() {
        let temp_dir = TempDir::new().unwrap();
        let labels: Vec<&str> = ten_row_labels().into_iter().cycle().take(60).collect();
        let input = write_csv(&temp_dir, "train.csv", &outbreak_csv(&labels, 2));
        let artifact_dir = temp_dir.path().join("artifacts");
        let mut config = PipelineConfig::outbreak();
        config.booster.n_estimators = 40;

        let outcome = train_and_save(&input, &artifact_dir, &config, false).unwrap();
        let in_memory = Predictor::new(outcome.artifacts.clone(), config.schema.clone(), config.prediction).unwrap();
        let reloaded = Predictor::from_dir(&artifact_dir, config.schema.clone(), config.prediction).unwrap();
        assert_eq!(reloaded.artifacts(), &outcome.artifacts);

        let table = in_memory.load_input(&input).unwrap();
        assert_eq!(
            in_memory.score(&table).unwrap().probabilities,
            reloaded.score(&table).unwrap().probabilities
        );

        let report = evaluate_file(&reloaded, &input).unwrap();
        assert_eq!(report.total, 60);
        assert!(report.accuracy > 0.9);
    }

    #[test]
    fn test_inference_missing_training_column() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_csv(&temp_dir, "train.csv", &outbreak_csv(&ten_row_labels(), 3));
        let artifact_dir = temp_dir.path().join("artifacts");
        let mut config = PipelineConfig::outbreak();
        config.booster.n_estimators = 5;
        train_and_save(&input, &artifact_dir, &config, false).unwrap();

        let without_rainfall: String = outbreak_csv(&ten_row_labels(), 4)
            .replacen("rainfall", "rain_mm", 1);
        let bad = write_csv(&temp_dir, "bad.csv", &without_rainfall);
        let predictor = Predictor::from_dir(&artifact_dir, config.schema.clone(), config.prediction).unwrap();
        let err = predictor.predict_file(&bad).unwrap_err();
        assert_eq!(
            err.root_cause().downcast_ref::<PipelineError>(),
            Some(&PipelineError::MissingColumns(vec!["rainfall".into()]))
        );
    }

    #[test]
    fn test_evaluation_rejects_label_unseen_in_training() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_csv(&temp_dir, "train.csv", &outbreak_csv(&ten_row_labels(), 6));
        let artifact_dir = temp_dir.path().join("artifacts");
        let mut config = PipelineConfig::outbreak();
        config.booster.n_estimators = 5;
        train_and_save(&input, &artifact_dir, &config, false).unwrap();

        let labelled = write_csv(&temp_dir, "eval.csv", &outbreak_csv(&["High", "Critical", "Low"], 7));
        let predictor = Predictor::from_dir(&artifact_dir, config.schema.clone(), config.prediction).unwrap();
        let err = evaluate_file(&predictor, &labelled).unwrap_err();
        assert_eq!(
            err.root_cause().downcast_ref::<PipelineError>(),
            Some(&PipelineError::UnseenLabel("Critical".into()))
        );
    }

    #[test]
    fn test_disease_variant_infers_features_and_ranks() {
        let temp_dir = TempDir::new().unwrap();
        let mut csv = String::from("temperature,humidity,location,disease\n");
        for i in 0..30 {
            let (disease, base) = match i % 3 {
                0 => ("Cholera", 0.0f32),
                1 => ("Dengue", 10.0),
                _ => ("", 20.0),
            };
            let humidity = if i % 5 == 0 {
                String::new()
            } else {
                (base * 2.0).to_string()
            };
            writeln!(csv, "{},{},City{},{}", base + (i % 4) as f32, humidity, i % 2, disease).unwrap();
        }
        let input = write_csv(&temp_dir, "disease.csv", &csv);
        let config = PipelineConfig::disease();

        let outcome = train_file(&input, &config, false).unwrap();
        assert_eq!(outcome.artifacts.preprocessor.feature_names, vec!["temperature", "humidity"]);
        assert_eq!(outcome.artifacts.encoder.classes(), &["Cholera", "Dengue", "None"]);

        let predictor = Predictor::new(outcome.artifacts, config.schema.clone(), config.prediction).unwrap();
        let output = predictor.predict_file(&input).unwrap();
        assert_eq!(output.shape(), OutputShape::Ranked);
        assert_eq!(output.len(), 30);
        let json = serde_json::to_value(&output).unwrap();
        assert!(json[0][0]["location"].as_str().unwrap().starts_with("City"));
    }

    #[test]
    fn test_single_class_table_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_csv(&temp_dir, "one.csv", &outbreak_csv(&["High"; 6], 5));
        let err = train_file(&input, &PipelineConfig::outbreak(), false).unwrap_err();
        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::TooFewClasses(1)));
    }
}
