use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bijective mapping between class labels and contiguous indices.
///
/// Classes are stored sorted, so index `i` is the `i`-th smallest label seen
/// during `fit`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the distinct labels of the training partition
    pub fn fit<'a, I>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        if classes.is_empty() {
            return Err(PipelineError::EmptyDataset("no labels to encode".into()).into());
        }
        Ok(Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        })
    }

    /// Known classes, in index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Index of a label
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| PipelineError::UnseenLabel(label.to_string()).into())
    }

    /// Encode a batch, failing on the first unseen label
    pub fn encode_all<'a, I>(&self, labels: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels.into_iter().map(|l| self.encode(l)).collect()
    }

    /// Label of an index
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                PipelineError::UnknownClassIndex {
                    index,
                    num_classes: self.classes.len(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_are_sorted_and_unique() {
        let encoder = LabelEncoder::fit(["Medium", "High", "Low", "High"]).unwrap();
        assert_eq!(encoder.classes(), &["High", "Low", "Medium"]);
        assert_eq!(encoder.encode("Low").unwrap(), 1);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let labels = ["Cholera", "Dengue", "None", "Malaria", "Dengue"];
        let encoder = LabelEncoder::fit(labels).unwrap();
        for label in labels {
            let index = encoder.encode(label).unwrap();
            assert_eq!(encoder.decode(index).unwrap(), label);
        }
        for index in 0..encoder.num_classes() {
            assert_eq!(encoder.encode(encoder.decode(index).unwrap()).unwrap(), index);
        }
    }

    #[test]
    fn test_unseen_label_is_explicit_error() {
        let encoder = LabelEncoder::fit(["A", "B"]).unwrap();
        let err = encoder.encode_all(["A", "Z"]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::UnseenLabel("Z".into()))
        );
        assert!(encoder.decode(2).is_err());
        assert!(LabelEncoder::fit(std::iter::empty()).is_err());
    }
}
