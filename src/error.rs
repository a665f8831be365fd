//! Domain errors for the outbreak pipeline.
//!
//! Functions across the crate return `anyhow::Result`; the variants below are
//! the failures callers may want to match on, recoverable with
//! `err.downcast_ref::<PipelineError>()`.

use thiserror::Error;

/// Errors raised by loading, preprocessing, training and artifact handling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Input file extension is not one of the supported table formats.
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// One or more required columns are absent from the header.
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A feature cell could not be parsed as a finite number.
    #[error("invalid value {value:?} in column '{column}' at line {line}")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
    },

    /// The table (or a partition of it) has no rows.
    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    /// Classification needs at least two classes.
    #[error("need at least 2 classes to train, found {0}")]
    TooFewClasses(usize),

    /// A label was not seen when the encoder was fitted.
    #[error("label '{0}' was not seen during training")]
    UnseenLabel(String),

    /// A class index outside the encoder's range.
    #[error("class index {index} out of range for {num_classes} classes")]
    UnknownClassIndex { index: usize, num_classes: usize },

    /// Row or feature dimensions do not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A transform was requested before `fit`.
    #[error("{0} must be fitted before use")]
    NotFitted(&'static str),

    /// Persisted artifacts disagree with each other or with the caller.
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// An artifact written by an incompatible format version.
    #[error("artifact {kind} has format version {found}, expected {expected}")]
    UnsupportedArtifactVersion {
        kind: String,
        found: u32,
        expected: u32,
    },

    /// Configuration values out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_all() {
        let err = PipelineError::MissingColumns(vec!["rainfall".into(), "humidity".into()]);
        assert_eq!(err.to_string(), "missing required columns: rainfall, humidity");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = PipelineError::UnseenLabel("Cholera".into()).into();
        let err = err.context("encoding test labels");
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::UnseenLabel("Cholera".into()))
        );
    }
}
