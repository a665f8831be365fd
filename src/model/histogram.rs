//! Quantile binning and gradient histograms for split finding.
//!
//! A value `v` falls in bin `b = #{cut : cut <= v}`. Splitting after bin `b`
//! sends rows with `v < cuts[b]` left, so a split chosen on bins maps
//! exactly onto a threshold on raw values.

use serde::{Deserialize, Serialize};

/// Per-feature bin boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinMapper {
    cuts: Vec<f32>,
}

impl BinMapper {
    /// Learn cut points from the observed values of one feature
    pub fn fit(values: &[f32], max_bins: usize) -> Self {
        let max_bins = max_bins.max(2);
        let mut sorted: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        sorted.sort_by(f32::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();

        let mut cuts = Vec::new();
        if distinct.len() <= max_bins {
            for pair in distinct.windows(2) {
                push_cut(&mut cuts, pair[0] + (pair[1] - pair[0]) / 2.0);
            }
        } else {
            let n = sorted.len();
            for q in 1..max_bins {
                let candidate = sorted[q * n / max_bins];
                if candidate > sorted[0] {
                    push_cut(&mut cuts, candidate);
                }
            }
        }
        Self { cuts }
    }

    /// Bin index of a raw value; NaN lands in the last bin
    pub fn bin(&self, value: f32) -> u16 {
        if value.is_nan() {
            return self.cuts.len() as u16;
        }
        self.cuts.partition_point(|&c| c <= value) as u16
    }

    pub fn n_bins(&self) -> usize {
        self.cuts.len() + 1
    }

    /// Raw threshold separating bins `..=bin` from bins `bin + 1..`
    pub fn threshold(&self, bin: usize) -> f32 {
        self.cuts[bin]
    }

    pub fn cuts(&self) -> &[f32] {
        &self.cuts
    }
}

fn push_cut(cuts: &mut Vec<f32>, cut: f32) {
    if cuts.last().map_or(true, |&last| cut > last) {
        cuts.push(cut);
    }
}

/// Training rows quantized once, reused by every tree
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    n_rows: usize,
    n_features: usize,
    bins: Vec<u16>,
    mappers: Vec<BinMapper>,
}

impl BinnedMatrix {
    pub fn from_rows(rows: &[Vec<f32>], max_bins: usize) -> Self {
        let n_rows = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);

        let mappers: Vec<BinMapper> = (0..n_features)
            .map(|f| {
                let column: Vec<f32> = rows.iter().map(|r| r[f]).collect();
                BinMapper::fit(&column, max_bins)
            })
            .collect();

        let mut bins = Vec::with_capacity(n_rows * n_features);
        for row in rows {
            for (f, mapper) in mappers.iter().enumerate() {
                bins.push(mapper.bin(row[f]));
            }
        }

        Self {
            n_rows,
            n_features,
            bins,
            mappers,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn bin(&self, row: usize, feature: usize) -> u16 {
        self.bins[row * self.n_features + feature]
    }

    pub fn mapper(&self, feature: usize) -> &BinMapper {
        &self.mappers[feature]
    }
}

/// Gradient statistics accumulated over a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradStats {
    pub grad: f64,
    pub hess: f64,
    pub count: u32,
}

impl GradStats {
    #[inline]
    pub fn add(&mut self, grad: f32, hess: f32) {
        self.grad += grad as f64;
        self.hess += hess as f64;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &GradStats) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.count += other.count;
    }

    pub fn subtract(&self, other: &GradStats) -> GradStats {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

/// Build the histogram of one feature over `rows`
pub fn build_histogram(
    matrix: &BinnedMatrix,
    feature: usize,
    rows: &[u32],
    gradients: &[f32],
    hessians: &[f32],
) -> Vec<GradStats> {
    let mut hist = vec![GradStats::default(); matrix.mapper(feature).n_bins()];
    for &row in rows {
        let row = row as usize;
        hist[matrix.bin(row, feature) as usize].add(gradients[row], hessians[row]);
    }
    hist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_few_distinct_values_use_midpoints() {
        let mapper = BinMapper::fit(&[1.0, 3.0, 3.0, 5.0], 256);
        assert_eq!(mapper.cuts(), &[2.0, 4.0]);
        assert_eq!(mapper.n_bins(), 3);
        assert_eq!(mapper.bin(1.0), 0);
        assert_eq!(mapper.bin(3.0), 1);
        assert_eq!(mapper.bin(10.0), 2);
    }

    #[test]
    fn test_quantile_cuts_are_bounded() {
        let values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let mapper = BinMapper::fit(&values, 16);
        assert!(mapper.n_bins() <= 16);
        assert!(mapper.cuts().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bin_and_threshold_agree() {
        let values: Vec<f32> = (0..500).map(|i| (i as f32 * 0.37).sin() * 10.0).collect();
        let mapper = BinMapper::fit(&values, 32);
        for b in 0..mapper.cuts().len() {
            let threshold = mapper.threshold(b);
            for &v in &values {
                assert_eq!(mapper.bin(v) as usize <= b, v < threshold);
            }
        }
    }

    #[test]
    fn test_histogram_sums() {
        let rows = vec![vec![0.0], vec![1.0], vec![1.0], vec![2.0]];
        let matrix = BinnedMatrix::from_rows(&rows, 256);
        let grads = [1.0, 2.0, 3.0, 4.0];
        let hess = [1.0; 4];
        let hist = build_histogram(&matrix, 0, &[0, 1, 2, 3], &grads, &hess);

        assert_eq!(hist.len(), 3);
        assert_eq!(hist[1].grad, 5.0);
        assert_eq!(hist[1].count, 2);

        let mut total = GradStats::default();
        hist.iter().for_each(|h| total.merge(h));
        assert_eq!(total.subtract(&hist[0]).grad, 9.0);
    }
}
