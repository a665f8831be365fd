//! Stratified train/test splitting.

use crate::data::{Dataset, FeatureVector, SplitConfig, NONE_LABEL};
use crate::error::PipelineError;
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Number of test rows per class.
///
/// The total is `ceil(n * ratio)`; each class gets the floor of its exact
/// share and leftover rows go to the largest remainders. A class never gives
/// up its last row, so every class stays present in the training partition.
pub fn allocate_test_counts(class_sizes: &[usize], test_ratio: f32) -> Vec<usize> {
    let n: usize = class_sizes.iter().sum();
    let ratio = test_ratio.clamp(0.0, 1.0) as f64;
    let capacity: Vec<usize> = class_sizes.iter().map(|&c| c.saturating_sub(1)).collect();
    // f32 ratios are not exact in f64; keep 0.2 * 50 from rounding up to 11.
    const EPS: f64 = 1e-6;
    let target = ((n as f64 * ratio - EPS).ceil().max(0.0) as usize).min(capacity.iter().sum());

    let exact: Vec<f64> = class_sizes.iter().map(|&c| c as f64 * ratio).collect();
    let mut alloc: Vec<usize> = exact
        .iter()
        .zip(&capacity)
        .map(|(&e, &cap)| ((e + EPS).floor() as usize).min(cap))
        .collect();

    let mut order: Vec<usize> = (0..class_sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - (exact[a] + EPS).floor();
        let rb = exact[b] - (exact[b] + EPS).floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut assigned: usize = alloc.iter().sum();
    while assigned < target {
        let before = assigned;
        for &class in &order {
            if assigned == target {
                break;
            }
            if alloc[class] < capacity[class] {
                alloc[class] += 1;
                assigned += 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    alloc
}

/// Split vectors into train and test partitions preserving class proportions
pub fn stratified_split(vectors: Vec<FeatureVector>, config: &SplitConfig) -> Result<Dataset> {
    if vectors.is_empty() {
        return Err(PipelineError::EmptyDataset("nothing to split".into()).into());
    }
    info!(
        "Stratified split of {} rows (test ratio {}, seed {})",
        vectors.len(),
        config.test_ratio,
        config.seed
    );

    let mut groups: BTreeMap<String, Vec<FeatureVector>> = BTreeMap::new();
    for vector in vectors {
        let label = vector.label.clone().unwrap_or_else(|| NONE_LABEL.to_string());
        groups.entry(label).or_default().push(vector);
    }

    let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
    let test_counts = allocate_test_counts(&sizes, config.test_ratio);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut dataset = Dataset::default();
    for ((label, mut members), n_test) in groups.into_iter().zip(test_counts) {
        members.shuffle(&mut rng);
        debug!("Class '{}': {} train, {} test", label, members.len() - n_test, n_test);
        let train = members.split_off(n_test);
        dataset.test.extend(members);
        dataset.train.extend(train);
    }
    dataset.train.shuffle(&mut rng);
    dataset.test.shuffle(&mut rng);

    info!(
        "Dataset split: train={}, test={}",
        dataset.train.len(),
        dataset.test.len()
    );
    Ok(dataset)
}
