pub mod balance;
pub mod encoding;
pub mod loader;
pub mod preprocessing;
pub mod split;

use serde::{Deserialize, Serialize};

/// Feature columns required by the outbreak variant, in model input order
pub const OUTBREAK_FEATURES: &[&str] = &[
    "temperature",
    "rainfall",
    "humidity",
    "population_density",
    "vaccination_rate",
    "healthcare_access",
    "sanitation_index",
    "water_quality_index",
    "air_quality_index",
    "previous_cases",
    "travel_volume",
    "vector_density",
    "malnutrition_rate",
    "hospital_beds_per_1000",
];

/// Target column of the outbreak variant
pub const OUTBREAK_TARGET: &str = "outbreak_probability";

/// Target column of the disease variant
pub const DISEASE_TARGET: &str = "disease";

/// Optional column carried through to ranked predictions
pub const LOCATION_COLUMN: &str = "location";

/// Class assigned to rows whose target cell is empty
pub const NONE_LABEL: &str = "None";

/// Cell values treated as missing
pub const NA_VALUES: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Returns true when a raw cell should be read as a missing value
pub fn is_na(value: &str) -> bool {
    let trimmed = value.trim();
    NA_VALUES.iter().any(|&na| na == trimmed)
}

/// Column contract shared by training and inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Feature columns in model input order. Empty means "every column except
    /// the target and location".
    #[serde(default)]
    pub feature_columns: Vec<String>,
    /// Target column name
    pub target_column: String,
    /// Optional location column, reported with ranked predictions
    #[serde(default)]
    pub location_column: Option<String>,
}

impl Schema {
    /// Schema of the outbreak variant: 14 fixed features
    pub fn outbreak() -> Self {
        Self {
            feature_columns: OUTBREAK_FEATURES.iter().map(|s| s.to_string()).collect(),
            target_column: OUTBREAK_TARGET.to_string(),
            location_column: Some(LOCATION_COLUMN.to_string()),
        }
    }

    /// Schema of the disease variant: features inferred from the header
    pub fn disease() -> Self {
        Self {
            feature_columns: Vec::new(),
            target_column: DISEASE_TARGET.to_string(),
            location_column: Some(LOCATION_COLUMN.to_string()),
        }
    }

    /// Schema requiring exactly the given features, used at inference time
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.feature_columns = features;
        self
    }

    /// Whether features are taken from the header instead of a fixed list
    pub fn infers_features(&self) -> bool {
        self.feature_columns.is_empty()
    }
}

/// One parsed table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based line number in the source file (header is line 1)
    pub line: usize,
    /// Feature values in schema order, `None` where missing
    pub features: Vec<Option<f32>>,
    /// Target label; `None` when the table has no target column
    pub label: Option<String>,
    /// Location value, when the schema names a location column
    pub location: Option<String>,
}

/// Records together with the resolved feature names
#[derive(Debug, Clone)]
pub struct Table {
    pub feature_names: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct labels with their row counts, ordered by label
    pub fn class_counts(&self) -> std::collections::BTreeMap<String, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for record in &self.records {
            if let Some(label) = &record.label {
                *counts.entry(label.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Processed feature vector for model input
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// Feature values, NaN where missing before imputation
    pub features: Vec<f32>,
    /// Mask indicating which features were present in the input
    pub mask: Vec<bool>,
    /// Raw target label (if available)
    pub label: Option<String>,
    /// Location carried from the record
    pub location: Option<String>,
}

impl FeatureVector {
    /// Build from a record, marking missing cells as NaN
    pub fn from_record(record: &Record) -> Self {
        let features = record
            .features
            .iter()
            .map(|v| v.unwrap_or(f32::NAN))
            .collect();
        let mask = record.features.iter().map(Option::is_some).collect();
        Self {
            features,
            mask,
            label: record.label.clone(),
            location: record.location.clone(),
        }
    }

    /// Check if feature is present
    pub fn has_feature(&self, index: usize) -> bool {
        index < self.mask.len() && self.mask[index]
    }
}

/// Convert records to feature vectors
pub fn convert_to_features(records: &[Record]) -> Vec<FeatureVector> {
    records.iter().map(FeatureVector::from_record).collect()
}

/// Train/test split configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows held out for evaluation and early stopping
    pub test_ratio: f32,
    /// Random seed
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

/// Train/test partitions
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub train: Vec<FeatureVector>,
    pub test: Vec<FeatureVector>,
}

impl Dataset {
    /// Get total number of samples
    pub fn total_samples(&self) -> usize {
        self.train.len() + self.test.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbreak_schema_has_fourteen_features() {
        let schema = Schema::outbreak();
        assert_eq!(schema.feature_columns.len(), 14);
        assert!(!schema.infers_features());
        assert!(Schema::disease().infers_features());
    }

    #[test]
    fn test_na_values() {
        assert!(is_na(""));
        assert!(is_na(" NaN "));
        assert!(is_na("null"));
        assert!(!is_na("0"));
    }

    #[test]
    fn test_feature_vector_from_record() {
        let record = Record {
            line: 2,
            features: vec![Some(1.0), None],
            label: Some("High".to_string()),
            location: None,
        };
        let vector = FeatureVector::from_record(&record);
        assert_eq!(vector.features[0], 1.0);
        assert!(vector.features[1].is_nan());
        assert!(vector.has_feature(0));
        assert!(!vector.has_feature(1));
        assert_eq!(vector.label.as_deref(), Some("High"));
    }
}
