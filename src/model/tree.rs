//! Regression trees fitted to gradient statistics.
//!
//! Trees grow depth-first. At every node each sampled feature's histogram is
//! scanned left to right and the split with the largest regularized gain wins.

use crate::model::histogram::{build_histogram, BinnedMatrix, GradStats};
use serde::{Deserialize, Serialize};

/// Minimum gain a split must exceed after the `gamma` penalty
const MIN_SPLIT_GAIN: f64 = 1e-6;

/// Regularization terms shared by split gain and leaf weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainParams {
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
}

impl GainParams {
    /// L1 soft-thresholded gradient sum
    #[inline]
    fn threshold_l1(&self, grad: f64) -> f64 {
        if grad > self.reg_alpha {
            grad - self.reg_alpha
        } else if grad < -self.reg_alpha {
            grad + self.reg_alpha
        } else {
            0.0
        }
    }

    /// Structure score of a node: `T(G)^2 / (H + lambda)`
    #[inline]
    pub fn score(&self, stats: &GradStats) -> f64 {
        let g = self.threshold_l1(stats.grad);
        g * g / (stats.hess + self.reg_lambda)
    }

    /// Loss reduction of splitting `parent` into `left` and `right`
    #[inline]
    pub fn split_gain(&self, parent: &GradStats, left: &GradStats, right: &GradStats) -> f64 {
        0.5 * (self.score(left) + self.score(right) - self.score(parent)) - self.gamma
    }

    /// Optimal leaf weight: `-T(G) / (H + lambda)`
    #[inline]
    pub fn leaf_weight(&self, stats: &GradStats) -> f64 {
        let denom = stats.hess + self.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.threshold_l1(stats.grad) / denom
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        gain: f32,
    },
    Leaf {
        value: f32,
    },
}

/// A single regression tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn leaf(value: f32) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Raw output for one row. Values below the threshold go left; NaN goes right.
    pub fn predict(&self, row: &[f32]) -> f32 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Add each split's gain to its feature's total
    pub fn accumulate_gain(&self, totals: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                if let Some(total) = totals.get_mut(*feature) {
                    *total += *gain as f64;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Grows one tree over a binned matrix
pub struct TreeGrower<'a> {
    matrix: &'a BinnedMatrix,
    params: GainParams,
    max_depth: usize,
    learning_rate: f32,
}

impl<'a> TreeGrower<'a> {
    pub fn new(matrix: &'a BinnedMatrix, params: GainParams, max_depth: usize, learning_rate: f32) -> Self {
        Self {
            matrix,
            params,
            max_depth,
            learning_rate,
        }
    }

    /// Fit a tree to `gradients`/`hessians` (indexed by row) over the given
    /// rows, considering only `features` as split candidates
    pub fn grow(&self, rows: &[u32], features: &[usize], gradients: &[f32], hessians: &[f32]) -> RegressionTree {
        let mut nodes = Vec::new();
        self.grow_node(&mut nodes, rows.to_vec(), features, gradients, hessians, 0);
        RegressionTree { nodes }
    }

    fn grow_node(
        &self,
        nodes: &mut Vec<Node>,
        rows: Vec<u32>,
        features: &[usize],
        gradients: &[f32],
        hessians: &[f32],
        depth: usize,
    ) -> usize {
        let mut total = GradStats::default();
        for &row in &rows {
            total.add(gradients[row as usize], hessians[row as usize]);
        }

        let index = nodes.len();
        nodes.push(self.make_leaf(&total));

        if depth >= self.max_depth || rows.len() < 2 {
            return index;
        }
        let Some(best) = self.find_split(&rows, &total, features, gradients, hessians) else {
            return index;
        };

        let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = rows
            .into_iter()
            .partition(|&row| (self.matrix.bin(row as usize, best.feature) as usize) <= best.bin);

        let left = self.grow_node(nodes, left_rows, features, gradients, hessians, depth + 1);
        let right = self.grow_node(nodes, right_rows, features, gradients, hessians, depth + 1);
        nodes[index] = Node::Split {
            feature: best.feature,
            threshold: self.matrix.mapper(best.feature).threshold(best.bin),
            left,
            right,
            gain: best.gain as f32,
        };
        index
    }

    fn find_split(
        &self,
        rows: &[u32],
        total: &GradStats,
        features: &[usize],
        gradients: &[f32],
        hessians: &[f32],
    ) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for &feature in features {
            let hist = build_histogram(self.matrix, feature, rows, gradients, hessians);
            let mut left = GradStats::default();
            // The last bin has no cut after it.
            for (bin, stats) in hist.iter().enumerate().take(hist.len().saturating_sub(1)) {
                left.merge(stats);
                if left.count == 0 {
                    continue;
                }
                let right = total.subtract(&left);
                if right.count == 0 {
                    break;
                }
                if left.hess < self.params.min_child_weight || right.hess < self.params.min_child_weight {
                    continue;
                }
                let gain = self.params.split_gain(total, &left, &right);
                if gain > MIN_SPLIT_GAIN && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }
        best
    }

    fn make_leaf(&self, stats: &GradStats) -> Node {
        Node::Leaf {
            value: (self.params.leaf_weight(stats) * self.learning_rate as f64) as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GainParams {
        GainParams {
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            min_child_weight: 0.0,
        }
    }

    #[test]
    fn test_leaf_weight_with_l1() {
        let mut p = params();
        let stats = GradStats {
            grad: 3.0,
            hess: 1.0,
            count: 2,
        };
        assert_eq!(p.leaf_weight(&stats), -1.5);

        p.reg_alpha = 1.0;
        assert_eq!(p.leaf_weight(&stats), -1.0);
        p.reg_alpha = 5.0;
        assert_eq!(p.leaf_weight(&stats), 0.0);
    }

    #[test]
    fn test_gamma_penalizes_gain() {
        let parent = GradStats {
            grad: 0.0,
            hess: 2.0,
            count: 2,
        };
        let left = GradStats {
            grad: -1.0,
            hess: 1.0,
            count: 1,
        };
        let right = parent.subtract(&left);
        let p = params();
        assert_eq!(p.split_gain(&parent, &left, &right), 0.5);

        let penalized = GainParams { gamma: 1.0, ..p };
        assert_eq!(penalized.split_gain(&parent, &left, &right), -0.5);
    }

    #[test]
    fn test_grow_separates_step_function() {
        let rows: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, 0.0]).collect();
        let matrix = BinnedMatrix::from_rows(&rows, 256);
        // Negative gradient pulls the leaf up for rows >= 10
        let grads: Vec<f32> = (0..20).map(|i| if i < 10 { 1.0 } else { -1.0 }).collect();
        let hess = vec![1.0; 20];
        let row_ids: Vec<u32> = (0..20).collect();

        let tree = TreeGrower::new(&matrix, params(), 3, 1.0).grow(&row_ids, &[0, 1], &grads, &hess);

        assert!(matches!(tree.nodes()[0], Node::Split { feature: 0, .. }));
        assert!(tree.predict(&[2.0, 0.0]) < 0.0);
        assert!(tree.predict(&[15.0, 0.0]) > 0.0);

        let mut gains = vec![0.0; 2];
        tree.accumulate_gain(&mut gains);
        assert!(gains[0] > 0.0);
        assert_eq!(gains[1], 0.0);
    }

    #[test]
    fn test_depth_zero_is_single_leaf() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let matrix = BinnedMatrix::from_rows(&rows, 256);
        let grads = vec![1.0; 10];
        let hess = vec![1.0; 10];
        let row_ids: Vec<u32> = (0..10).collect();

        let tree = TreeGrower::new(&matrix, params(), 0, 0.5).grow(&row_ids, &[0], &grads, &hess);
        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict(&[3.0]) - (-10.0 / 11.0 * 0.5)).abs() < 1e-6);
    }
}
