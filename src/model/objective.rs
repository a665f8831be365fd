//! Softmax cross-entropy objective for multiclass boosting.
//!
//! Raw scores are stored row-major: row `i` owns `raw[i * k..(i + 1) * k]`.

/// Lower bound on hessians, keeps Newton steps finite
const HESS_MIN: f32 = 1e-6;

/// Probability clamp for log-loss
const PROB_EPS: f64 = 1e-15;

/// Softmax loss over `num_classes` outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftmaxLoss {
    pub num_classes: usize,
}

impl SoftmaxLoss {
    pub fn new(num_classes: usize) -> Self {
        debug_assert!(num_classes >= 2, "num_classes must be >= 2");
        Self { num_classes }
    }

    /// Initial raw scores: log class priors
    pub fn base_score(&self, labels: &[usize]) -> Vec<f32> {
        let k = self.num_classes;
        if labels.is_empty() {
            return vec![0.0; k];
        }
        let mut counts = vec![0.0f64; k];
        for &label in labels {
            if label < k {
                counts[label] += 1.0;
            }
        }
        let total = labels.len() as f64;
        counts
            .into_iter()
            .map(|c| (c / total).clamp(1e-7, 1.0 - 1e-7).ln() as f32)
            .collect()
    }

    /// First and second order gradients for every (row, class)
    pub fn compute_gradients(
        &self,
        raw: &[f32],
        labels: &[usize],
        gradients: &mut [f32],
        hessians: &mut [f32],
    ) {
        let k = self.num_classes;
        debug_assert_eq!(raw.len(), labels.len() * k);
        debug_assert_eq!(gradients.len(), raw.len());
        debug_assert_eq!(hessians.len(), raw.len());

        let mut probs = vec![0.0f32; k];
        for (i, &label) in labels.iter().enumerate() {
            let offset = i * k;
            probs.copy_from_slice(&raw[offset..offset + k]);
            softmax_inplace(&mut probs);
            for c in 0..k {
                let p = probs[c];
                let target = if c == label { 1.0 } else { 0.0 };
                gradients[offset + c] = p - target;
                hessians[offset + c] = (p * (1.0 - p)).max(HESS_MIN);
            }
        }
    }

    /// Mean multiclass log-loss
    pub fn log_loss(&self, raw: &[f32], labels: &[usize]) -> f64 {
        if labels.is_empty() {
            return 0.0;
        }
        let k = self.num_classes;
        let mut probs = vec![0.0f32; k];
        let total: f64 = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                probs.copy_from_slice(&raw[i * k..(i + 1) * k]);
                softmax_inplace(&mut probs);
                -(probs[label] as f64).clamp(PROB_EPS, 1.0).ln()
            })
            .sum();
        total / labels.len() as f64
    }
}

/// Numerically stable in-place softmax
pub fn softmax_inplace(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    if sum > 0.0 {
        for s in scores.iter_mut() {
            *s /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let mut scores = vec![1.0, 2.0, 3.0];
        softmax_inplace(&mut scores);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(scores[2] > scores[1] && scores[1] > scores[0]);

        let mut large = vec![1000.0, 1000.0];
        softmax_inplace(&mut large);
        assert_eq!(large, vec![0.5, 0.5]);
    }

    #[test]
    fn test_base_score_is_log_prior() {
        let loss = SoftmaxLoss::new(2);
        let base = loss.base_score(&[0, 0, 0, 1]);
        assert!((base[0] - 0.75f32.ln()).abs() < 1e-6);
        assert!((base[1] - 0.25f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_gradients_at_uniform_scores() {
        let loss = SoftmaxLoss::new(2);
        let raw = vec![0.0; 4];
        let mut grad = vec![0.0; 4];
        let mut hess = vec![0.0; 4];
        loss.compute_gradients(&raw, &[0, 1], &mut grad, &mut hess);

        assert_eq!(grad, vec![-0.5, 0.5, 0.5, -0.5]);
        assert_eq!(hess, vec![0.25; 4]);
    }

    #[test]
    fn test_log_loss() {
        let loss = SoftmaxLoss::new(2);
        let uniform = loss.log_loss(&[0.0, 0.0], &[1]);
        assert!((uniform - std::f64::consts::LN_2).abs() < 1e-6);

        let confident = loss.log_loss(&[-10.0, 10.0], &[1]);
        assert!(confident < 1e-6);
    }
}
