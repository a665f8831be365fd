use crate::data::loader::DataLoader;
use crate::data::{convert_to_features, Schema, Table};
use crate::model::checkpoint::{ArtifactStore, TrainedArtifacts};
use crate::predict::{PredictionConfig, PredictionOutput, PredictionSummary};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Class probabilities for a batch, with the locations of its rows
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    /// One probability vector per row, indexed like `classes`
    pub probabilities: Vec<Vec<f32>>,
    pub locations: Vec<Option<String>>,
    pub classes: Vec<String>,
}

/// Applies fitted artifacts to new tabular data
pub struct Predictor {
    artifacts: TrainedArtifacts,
    schema: Schema,
    config: PredictionConfig,
}

impl Predictor {
    /// `schema` supplies the target and location column names; its feature
    /// list is replaced by the stored one.
    pub fn new(artifacts: TrainedArtifacts, schema: Schema, config: PredictionConfig) -> Result<Self> {
        artifacts.validate()?;
        let schema = schema.with_features(artifacts.preprocessor.feature_names.clone());
        Ok(Self {
            artifacts,
            schema,
            config,
        })
    }

    /// Load artifacts from a directory
    pub fn from_dir<P: AsRef<Path>>(dir: P, schema: Schema, config: PredictionConfig) -> Result<Self> {
        let artifacts = ArtifactStore::new(dir).load()?;
        Self::new(artifacts, schema, config)
    }

    pub fn artifacts(&self) -> &TrainedArtifacts {
        &self.artifacts
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Column contract of inference inputs
    pub fn input_schema(&self) -> &Schema {
        &self.schema
    }

    /// Load an inference table; the target column is dropped if present
    pub fn load_input<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        DataLoader::for_inference(self.schema.clone()).load(path)
    }

    /// Preprocess and score every row of `table`
    pub fn score(&self, table: &Table) -> Result<ScoredBatch> {
        if table.feature_names != self.artifacts.preprocessor.feature_names {
            return Err(crate::error::PipelineError::ShapeMismatch(
                "input columns do not match the fitted feature order".into(),
            )
            .into());
        }
        let mut vectors = convert_to_features(&table.records);
        self.artifacts
            .preprocessor
            .transform(&mut vectors)
            .context("Failed to preprocess inference rows")?;

        let locations = vectors.iter().map(|v| v.location.clone()).collect();
        let rows: Vec<Vec<f32>> = vectors.into_iter().map(|v| v.features).collect();
        let probabilities = self.artifacts.model.predict_proba(&rows)?;

        Ok(ScoredBatch {
            probabilities,
            locations,
            classes: self.artifacts.encoder.classes().to_vec(),
        })
    }

    /// Score a table and shape the result
    pub fn predict_table(&self, table: &Table) -> Result<PredictionOutput> {
        let batch = self.score(table)?;
        PredictionSummary::from_probabilities(&batch.probabilities, &batch.classes).log();
        Ok(PredictionOutput::build(
            &batch.probabilities,
            &batch.classes,
            &batch.locations,
            &self.config,
        ))
    }

    /// Load, score and shape a file
    pub fn predict_file<P: AsRef<Path>>(&self, path: P) -> Result<PredictionOutput> {
        let path = path.as_ref();
        let table = self.load_input(path)?;
        info!("Predicting {} rows from {:?}", table.len(), path);
        self.predict_table(&table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoding::LabelEncoder;
    use crate::data::loader::FileFormat;
    use crate::data::preprocessing::Preprocessor;
    use crate::error::PipelineError;
    use crate::model::gbdt::GradientBoostedClassifier;
    use crate::model::tree::RegressionTree;
    use crate::model::BoosterConfig;
    use crate::predict::OutputShape;
    use std::io::Cursor;

    fn schema() -> Schema {
        Schema {
            feature_columns: Vec::new(),
            target_column: "disease".into(),
            location_column: Some("location".into()),
        }
    }

    /// Two features, two classes; class "B" wins whenever `a >= 5`
    fn create_predictor(shape: OutputShape) -> Predictor {
        let mut preprocessor = Preprocessor::new(vec!["a".into(), "b".into()]);
        let train = DataLoader::new(schema())
            .parse_records(Cursor::new("a,b,disease\n1,1,A\n9,3,B\n"), FileFormat::Csv)
            .unwrap();
        preprocessor.fit(&convert_to_features(&train.records)).unwrap();

        let mut model = GradientBoostedClassifier::new(2, vec![0.0, 0.0], BoosterConfig::quick_test());
        let tree = |low: f32, high: f32| -> RegressionTree {
            serde_json::from_value(serde_json::json!({"nodes": [
                {"type": "split", "feature": 0, "threshold": 5.0, "left": 1, "right": 2, "gain": 1.0},
                {"type": "leaf", "value": low},
                {"type": "leaf", "value": high}
            ]}))
            .unwrap()
        };
        model.push_round(vec![tree(2.0, -2.0), tree(-2.0, 2.0)]);

        let artifacts = TrainedArtifacts {
            model,
            encoder: LabelEncoder::fit(["A", "B"]).unwrap(),
            preprocessor,
        };
        let config = PredictionConfig {
            shape,
            ..PredictionConfig::default()
        };
        Predictor::new(artifacts, schema(), config).unwrap()
    }

    fn parse(predictor: &Predictor, csv: &str) -> Result<Table> {
        DataLoader::for_inference(predictor.input_schema().clone()).parse_records(Cursor::new(csv.to_string()), FileFormat::Csv)
    }

    #[test]
    fn test_ranked_predictions_per_row() {
        let predictor = create_predictor(OutputShape::Ranked);
        let table = parse(&predictor, "b,a,location,disease\n1,1,Kano,A\n2,8,,B\n,,Abuja,\n").unwrap();
        let output = predictor.predict_table(&table).unwrap();

        let PredictionOutput::Ranked(rows) = output else {
            panic!("expected ranked output");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0].disease, "A");
        assert_eq!(rows[0][0].location.as_deref(), Some("Kano"));
        assert_eq!(rows[1][0].disease, "B");
        assert_eq!(rows[1][0].location.as_deref(), Some("Unknown"));
        // Missing cells are imputed with the training medians (a = 5)
        assert_eq!(rows[2][0].disease, "B");
        for p in rows.iter().flatten() {
            assert!((0.0..=1.0).contains(&p.probability));
        }
    }

    #[test]
    fn test_aggregated_predictions() {
        let predictor = create_predictor(OutputShape::Aggregated);
        let table = parse(&predictor, "a,b\n1,1\n2,2\n8,8\n").unwrap();
        let output = predictor.predict_table(&table).unwrap();

        assert_eq!(output.shape(), OutputShape::Aggregated);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_missing_training_column_is_rejected() {
        let predictor = create_predictor(OutputShape::Ranked);
        let err = parse(&predictor, "a,location\n1,Kano\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::MissingColumns(vec!["b".into()]))
        );
    }

    #[test]
    fn test_scores_sum_to_one() {
        let predictor = create_predictor(OutputShape::Ranked);
        let table = parse(&predictor, "a,b\n3,1\n7,1\n").unwrap();
        let batch = predictor.score(&table).unwrap();
        assert_eq!(batch.classes, vec!["A", "B"]);
        for probs in &batch.probabilities {
            assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
    }
}
