//! Artifact store: the fitted model, label encoder and preprocessor, each in
//! its own JSON file behind a versioned header.
//!
//! Every header carries the same schema fingerprint (SHA-256 over the format
//! version, the ordered feature names and the ordered class labels), so
//! artifacts from different training runs cannot be mixed on load.

use crate::data::encoding::LabelEncoder;
use crate::data::preprocessing::Preprocessor;
use crate::error::PipelineError;
use crate::evaluate::ClassificationReport;
use crate::model::gbdt::GradientBoostedClassifier;
use crate::model::BoosterConfig;
use crate::utils::ensure_dir;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Artifact format version written by this build
pub const FORMAT_VERSION: u32 = 1;

pub const MODEL_FILE: &str = "model.json";
pub const ENCODER_FILE: &str = "label_encoder.json";
pub const PREPROCESSOR_FILE: &str = "preprocessor.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    LabelEncoder,
    Preprocessor,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Model => MODEL_FILE,
            ArtifactKind::LabelEncoder => ENCODER_FILE,
            ArtifactKind::Preprocessor => PREPROCESSOR_FILE,
        }
    }
}

/// Header written in front of every artifact payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format_version: u32,
    pub kind: ArtifactKind,
    pub fingerprint: String,
    /// Version of the crate that wrote the artifact
    pub crate_version: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    header: ArtifactHeader,
    payload: T,
}

/// Hex SHA-256 over format version, feature names and class labels
pub fn schema_fingerprint(feature_names: &[String], classes: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FORMAT_VERSION.to_le_bytes());
    for (tag, names) in [(b'F', feature_names), (b'C', classes)] {
        hasher.update([tag]);
        hasher.update((names.len() as u64).to_le_bytes());
        for name in names {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Everything inference needs, produced by one training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifacts {
    pub model: GradientBoostedClassifier,
    pub encoder: LabelEncoder,
    pub preprocessor: Preprocessor,
}

impl TrainedArtifacts {
    pub fn fingerprint(&self) -> String {
        schema_fingerprint(&self.preprocessor.feature_names, self.encoder.classes())
    }

    /// Check that the three parts describe the same schema
    pub fn validate(&self) -> Result<()> {
        if !self.preprocessor.is_fitted() {
            return Err(PipelineError::NotFitted("preprocessor").into());
        }
        if self.model.num_features != self.preprocessor.n_features() {
            return Err(PipelineError::ArtifactMismatch(format!(
                "model expects {} features but preprocessor has {}",
                self.model.num_features,
                self.preprocessor.n_features()
            ))
            .into());
        }
        if self.model.num_classes != self.encoder.num_classes() {
            return Err(PipelineError::ArtifactMismatch(format!(
                "model has {} classes but label encoder has {}",
                self.model.num_classes,
                self.encoder.num_classes()
            ))
            .into());
        }
        Ok(())
    }
}

/// Summary of a training run, written next to the artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub crate_version: String,
    pub variant: String,
    pub fingerprint: String,
    /// Seconds since the Unix epoch
    pub trained_at: u64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    pub rounds_trained: usize,
    pub best_iteration: Option<usize>,
    pub duration_secs: f64,
    pub booster: BoosterConfig,
    /// Held-out evaluation
    pub report: ClassificationReport,
    /// Normalized total gain per feature
    pub feature_importance: Vec<(String, f64)>,
}

/// Directory holding one set of artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write all artifacts and the metadata file
    pub fn save(&self, artifacts: &TrainedArtifacts, metadata: &TrainingMetadata) -> Result<()> {
        artifacts.validate()?;
        ensure_dir(&self.dir)?;
        let fingerprint = artifacts.fingerprint();

        self.write_artifact(ArtifactKind::Model, &fingerprint, &artifacts.model)?;
        self.write_artifact(ArtifactKind::LabelEncoder, &fingerprint, &artifacts.encoder)?;
        self.write_artifact(ArtifactKind::Preprocessor, &fingerprint, &artifacts.preprocessor)?;
        self.write_json(METADATA_FILE, metadata)?;

        info!("Saved artifacts to {:?} (fingerprint {})", self.dir, &fingerprint[..12]);
        Ok(())
    }

    /// Read and cross-check all artifacts
    pub fn load(&self) -> Result<TrainedArtifacts> {
        info!("Loading artifacts from {:?}", self.dir);
        let (model_header, model) = self.read_artifact::<GradientBoostedClassifier>(ArtifactKind::Model)?;
        let (encoder_header, encoder) = self.read_artifact::<LabelEncoder>(ArtifactKind::LabelEncoder)?;
        let (prep_header, preprocessor) = self.read_artifact::<Preprocessor>(ArtifactKind::Preprocessor)?;

        if model_header.fingerprint != encoder_header.fingerprint
            || model_header.fingerprint != prep_header.fingerprint
        {
            return Err(PipelineError::ArtifactMismatch(
                "artifacts come from different training runs (fingerprints differ)".into(),
            )
            .into());
        }

        let artifacts = TrainedArtifacts {
            model,
            encoder,
            preprocessor,
        };
        artifacts.validate()?;

        if artifacts.fingerprint() != model_header.fingerprint {
            return Err(PipelineError::ArtifactMismatch(
                "stored fingerprint does not match feature names and classes".into(),
            )
            .into());
        }

        debug!(
            "Loaded {} rounds, {} classes, {} features",
            artifacts.model.n_rounds(),
            artifacts.encoder.num_classes(),
            artifacts.preprocessor.n_features()
        );
        Ok(artifacts)
    }

    pub fn load_metadata(&self) -> Result<TrainingMetadata> {
        let path = self.dir.join(METADATA_FILE);
        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {:?}", path))
    }

    fn write_artifact<T: Serialize>(&self, kind: ArtifactKind, fingerprint: &str, payload: &T) -> Result<()> {
        let envelope = Envelope {
            header: ArtifactHeader {
                format_version: FORMAT_VERSION,
                kind,
                fingerprint: fingerprint.to_string(),
                crate_version: crate::VERSION.to_string(),
            },
            payload,
        };
        self.write_json(kind.file_name(), &envelope)
    }

    /// Write to a temporary sibling, then rename over the target
    fn write_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        let tmp = self.dir.join(format!(".{}.tmp", file_name));
        let json = serde_json::to_vec_pretty(value).with_context(|| format!("Failed to serialize {}", file_name))?;

        let mut file = fs::File::create(&tmp).with_context(|| format!("Failed to create {:?}", tmp))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        drop(file);
        fs::rename(&tmp, &path).with_context(|| format!("Failed to move {:?} to {:?}", tmp, path))?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    fn read_artifact<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Result<(ArtifactHeader, T)> {
        let path = self.dir.join(kind.file_name());
        let json = fs::read_to_string(&path).with_context(|| format!("Failed to read artifact {:?}", path))?;

        // Check the header before committing to the payload layout
        let value: serde_json::Value =
            serde_json::from_str(&json).with_context(|| format!("Failed to parse artifact {:?}", path))?;
        let header: ArtifactHeader = serde_json::from_value(value.get("header").cloned().unwrap_or_default())
            .with_context(|| format!("Artifact {:?} has no valid header", path))?;

        if header.kind != kind {
            return Err(PipelineError::ArtifactMismatch(format!(
                "{:?} contains a {:?} artifact, expected {:?}",
                path, header.kind, kind
            ))
            .into());
        }
        if header.format_version != FORMAT_VERSION {
            return Err(PipelineError::UnsupportedArtifactVersion {
                kind: kind.file_name().to_string(),
                found: header.format_version,
                expected: FORMAT_VERSION,
            }
            .into());
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&json).with_context(|| format!("Failed to decode artifact payload {:?}", path))?;
        Ok((header, envelope.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureVector;
    use crate::model::tree::RegressionTree;
    use tempfile::TempDir;

    fn create_test_artifacts() -> TrainedArtifacts {
        let names = vec!["temperature".to_string(), "rainfall".to_string()];
        let mut preprocessor = Preprocessor::new(names);
        preprocessor
            .fit(&[FeatureVector {
                features: vec![1.0, 2.0],
                mask: vec![true, true],
                label: None,
                location: None,
            }])
            .unwrap();
        let encoder = LabelEncoder::fit(["High", "Low"]).unwrap();
        let mut model = GradientBoostedClassifier::new(2, vec![-0.5, -1.0], BoosterConfig::quick_test());
        model.push_round(vec![RegressionTree::leaf(0.25), RegressionTree::leaf(-0.125)]);
        TrainedArtifacts {
            model,
            encoder,
            preprocessor,
        }
    }

    fn create_test_metadata(artifacts: &TrainedArtifacts) -> TrainingMetadata {
        TrainingMetadata {
            crate_version: crate::VERSION.to_string(),
            variant: "outbreak".to_string(),
            fingerprint: artifacts.fingerprint(),
            trained_at: 0,
            train_rows: 1,
            test_rows: 0,
            feature_names: artifacts.preprocessor.feature_names.clone(),
            classes: artifacts.encoder.classes().to_vec(),
            rounds_trained: 1,
            best_iteration: None,
            duration_secs: 0.0,
            booster: BoosterConfig::quick_test(),
            report: ClassificationReport::compute(&[], &[], artifacts.encoder.classes()).unwrap(),
            feature_importance: Vec::new(),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("artifacts"));
        let artifacts = create_test_artifacts();
        store.save(&artifacts, &create_test_metadata(&artifacts)).unwrap();

        for file in [MODEL_FILE, ENCODER_FILE, PREPROCESSOR_FILE, METADATA_FILE] {
            assert!(store.dir().join(file).is_file());
        }
        let loaded = store.load().unwrap();
        assert_eq!(loaded, artifacts);
        assert_eq!(store.load_metadata().unwrap().fingerprint, artifacts.fingerprint());
    }

    #[test]
    fn test_fingerprint_depends_on_schema() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        let classes = vec!["A".to_string()];
        assert_eq!(schema_fingerprint(&a, &classes), schema_fingerprint(&a, &classes));
        assert_ne!(schema_fingerprint(&a, &classes), schema_fingerprint(&b, &classes));
        assert_ne!(schema_fingerprint(&a, &[]), schema_fingerprint(&[], &a));
        assert_eq!(schema_fingerprint(&a, &classes).len(), 64);
    }

    #[test]
    fn test_mixed_artifacts_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let artifacts = create_test_artifacts();
        store.save(&artifacts, &create_test_metadata(&artifacts)).unwrap();

        // Overwrite the encoder with one from a different run
        let other = ArtifactStore::new(temp_dir.path().join("other"));
        let mut different = create_test_artifacts();
        different.encoder = LabelEncoder::fit(["Low", "Medium"]).unwrap();
        other.save(&different, &create_test_metadata(&different)).unwrap();
        fs::copy(other.dir().join(ENCODER_FILE), store.dir().join(ENCODER_FILE)).unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_kind_and_version_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let artifacts = create_test_artifacts();
        store.save(&artifacts, &create_test_metadata(&artifacts)).unwrap();

        fs::copy(store.dir().join(ENCODER_FILE), store.dir().join(MODEL_FILE)).unwrap();
        assert!(store.load().is_err());

        store.save(&artifacts, &create_test_metadata(&artifacts)).unwrap();
        let path = store.dir().join(PREPROCESSOR_FILE);
        let bumped = fs::read_to_string(&path)
            .unwrap()
            .replacen("\"format_version\": 1", "\"format_version\": 99", 1);
        fs::write(&path, bumped).unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnsupportedArtifactVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ArtifactStore::new(temp_dir.path().join("absent")).load().is_err());
    }
}
