//! Class rebalancing with synthetic minority oversampling (SMOTE).
//!
//! Every class in the training partition is brought to exactly
//! `target_count` rows: minority classes gain synthetic rows interpolated
//! between a sample and one of its nearest same-class neighbours, majority
//! classes are randomly downsampled.

use crate::data::{FeatureVector, NONE_LABEL};
use crate::error::PipelineError;
use anyhow::Result;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Oversampling configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Rows per class after balancing
    pub target_count: usize,
    /// Neighbours considered when synthesizing a row
    pub k_neighbors: usize,
    /// Random seed
    pub seed: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            target_count: 280,
            k_neighbors: 5,
            seed: 42,
        }
    }
}

/// Resample `vectors` so every class has exactly `config.target_count` rows.
///
/// Features must already be imputed.
pub fn smote(vectors: &[FeatureVector], config: &BalanceConfig) -> Result<Vec<FeatureVector>> {
    if config.target_count == 0 {
        return Err(PipelineError::InvalidConfig("balance target_count must be positive".into()).into());
    }
    if vectors.iter().any(|v| v.features.iter().any(|x| x.is_nan())) {
        return Err(PipelineError::ShapeMismatch("oversampling requires imputed features".into()).into());
    }

    let mut groups: BTreeMap<&str, Vec<&FeatureVector>> = BTreeMap::new();
    for vector in vectors {
        groups
            .entry(vector.label.as_deref().unwrap_or(NONE_LABEL))
            .or_default()
            .push(vector);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut out = Vec::with_capacity(groups.len() * config.target_count);
    for (label, members) in groups {
        let n = members.len();
        if n >= config.target_count {
            if n > config.target_count {
                debug!("Downsampling class '{}' from {} to {}", label, n, config.target_count);
            }
            let mut keep = index::sample(&mut rng, n, config.target_count).into_vec();
            keep.sort_unstable();
            out.extend(keep.into_iter().map(|i| members[i].clone()));
            continue;
        }

        out.extend(members.iter().map(|v| (*v).clone()));
        let needed = config.target_count - n;
        debug!("Synthesizing {} rows for class '{}' ({} real)", needed, label, n);

        if n == 1 {
            warn!("Class '{}' has a single sample; replicating it", label);
            out.extend(std::iter::repeat(synthetic_copy(members[0])).take(needed));
            continue;
        }

        let k = config.k_neighbors.clamp(1, n - 1);
        let neighbours = nearest_neighbours(&members, k);
        for _ in 0..needed {
            let i = rng.gen_range(0..n);
            let j = neighbours[i][rng.gen_range(0..k)];
            let gap: f32 = rng.gen();
            out.push(interpolate(members[i], members[j], gap));
        }
    }

    info!("Balanced training partition: {} -> {} rows", vectors.len(), out.len());
    Ok(out)
}

/// Indices of the `k` nearest same-class members of each member (Euclidean)
fn nearest_neighbours(members: &[&FeatureVector], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut distances: Vec<(f32, usize)> = members
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, b)| (squared_distance(&a.features, &b.features), j))
                .collect();
            distances.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn interpolate(base: &FeatureVector, neighbour: &FeatureVector, gap: f32) -> FeatureVector {
    let features = base
        .features
        .iter()
        .zip(&neighbour.features)
        .map(|(&x, &y)| x + gap * (y - x))
        .collect();
    FeatureVector {
        features,
        mask: vec![true; base.features.len()],
        label: base.label.clone(),
        location: None,
    }
}

fn synthetic_copy(base: &FeatureVector) -> FeatureVector {
    interpolate(base, base, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_rows(label: &str, n: usize, centre: f32, rng: &mut ChaCha8Rng) -> Vec<FeatureVector> {
        (0..n)
            .map(|_| FeatureVector {
                features: vec![centre + rng.gen::<f32>(), centre - rng.gen::<f32>()],
                mask: vec![true, true],
                label: Some(label.to_string()),
                location: None,
            })
            .collect()
    }

    fn counts(vectors: &[FeatureVector]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for v in vectors {
            *counts.entry(v.label.clone().unwrap()).or_insert(0) += 1;
        }
        counts
    }

    fn sample_data() -> Vec<FeatureVector> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut data = class_rows("High", 40, 10.0, &mut rng);
        data.extend(class_rows("Low", 12, 0.0, &mut rng));
        data.extend(class_rows("Medium", 3, 5.0, &mut rng));
        data
    }

    #[test]
    fn test_every_class_reaches_target_count() {
        let config = BalanceConfig {
            target_count: 25,
            ..BalanceConfig::default()
        };
        let balanced = smote(&sample_data(), &config).unwrap();

        assert_eq!(balanced.len(), 75);
        assert!(counts(&balanced).values().all(|&c| c == 25));
    }

    #[test]
    fn test_synthetic_rows_stay_within_class_bounds() {
        let data = sample_data();
        let balanced = smote(&data, &BalanceConfig::default()).unwrap();

        for label in ["Low", "Medium"] {
            let real: Vec<_> = data.iter().filter(|v| v.label.as_deref() == Some(label)).collect();
            for f in 0..2 {
                let lo = real.iter().map(|v| v.features[f]).fold(f32::INFINITY, f32::min);
                let hi = real.iter().map(|v| v.features[f]).fold(f32::NEG_INFINITY, f32::max);
                for v in balanced.iter().filter(|v| v.label.as_deref() == Some(label)) {
                    assert!(v.features[f] >= lo - 1e-4 && v.features[f] <= hi + 1e-4);
                }
            }
        }
        assert_eq!(counts(&balanced)["Medium"], 280);
    }

    #[test]
    fn test_singleton_class_is_replicated() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut data = class_rows("A", 4, 1.0, &mut rng);
        data.extend(class_rows("B", 1, 9.0, &mut rng));
        let config = BalanceConfig {
            target_count: 6,
            ..BalanceConfig::default()
        };
        let balanced = smote(&data, &config).unwrap();

        let b_rows: Vec<_> = balanced.iter().filter(|v| v.label.as_deref() == Some("B")).collect();
        assert_eq!(b_rows.len(), 6);
        assert!(b_rows.iter().all(|v| v.features == data[4].features));
    }

    #[test]
    fn test_balancing_is_deterministic() {
        let data = sample_data();
        let a = smote(&data, &BalanceConfig::default()).unwrap();
        let b = smote(&data, &BalanceConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_unimputed_rows() {
        let mut data = sample_data();
        data[0].features[0] = f32::NAN;
        assert!(smote(&data, &BalanceConfig::default()).is_err());
    }
}
