use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use rand::Rng;

use crate::burn_utils::rand::sample_weighted;
use crate::burn_utils::tensor::tensor2vec2;

/// Discrete distribution over `num_actions` actions, one row per observation.
#[derive(Debug, Clone)]
pub struct Categorical<B: Backend> {
    log_probs: Tensor<B, 2>, // (batch, num_actions)
}

impl<B: Backend> Categorical<B> {
    pub fn from_logits(logits: Tensor<B, 2>) -> Self {
        Self {
            log_probs: log_softmax(logits, 1),
        }
    }

    pub fn log_probs(&self) -> Tensor<B, 2> {
        self.log_probs.clone()
    }

    // actions: (batch,)
    pub fn log_prob(&self, actions: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        return self
            .log_probs
            .clone()
            .gather(1, actions.unsqueeze_dim::<2>(1))
            .squeeze::<1>(1);
    }

    pub fn entropy(&self) -> Tensor<B, 1> {
        let probs = self.log_probs.clone().exp();
        return (probs * self.log_probs.clone())
            .sum_dim(1)
            .squeeze::<1>(1)
            .neg();
    }

    /// Per row: the sampled action and its log-probability.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<(usize, f64)> {
        tensor2vec2(self.log_probs.clone())
            .into_iter()
            .map(|row| {
                let weights: Vec<f64> = row.iter().map(|lp| (*lp as f64).exp()).collect();
                let action = sample_weighted(&weights, rng);
                (action, row[action] as f64)
            })
            .collect()
    }

    /// Per row: the most probable action and its log-probability.
    pub fn mode(&self) -> Vec<(usize, f64)> {
        tensor2vec2(self.log_probs.clone())
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (i, lp) in row.iter().enumerate() {
                    if *lp > row[best] {
                        best = i;
                    }
                }
                (best, row[best] as f64)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::tensor::cast::ToElement;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_log_prob() {
        let device = NdArrayDevice::Cpu;
        let logits = Tensor::<NdArray, 2>::from_floats(
            [[0.0, 0.0], [(3.0f32).ln(), 0.0]],
            &device,
        );
        let dist = Categorical::from_logits(logits);
        let actions = Tensor::<NdArray, 1, Int>::from_ints([1, 0], &device);
        let log_prob: Vec<f32> = dist.log_prob(actions).into_data().iter::<f32>().collect();
        assert_relative_eq!(log_prob[0], 0.5f32.ln(), epsilon = 1e-6);
        assert_relative_eq!(log_prob[1], 0.75f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_uniform_entropy() {
        let device = NdArrayDevice::Cpu;
        let dist = Categorical::from_logits(Tensor::<NdArray, 2>::zeros([1, 4], &device));
        let entropy = dist.entropy().into_scalar().to_f64();
        assert_relative_eq!(entropy, (4.0f64).ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_sample_and_mode() {
        let device = NdArrayDevice::Cpu;
        let logits = Tensor::<NdArray, 2>::from_floats([[-50.0, 10.0, -50.0]], &device);
        let dist = Categorical::from_logits(logits);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(dist.sample(&mut rng)[0].0, 1);
        let (action, log_prob) = dist.mode()[0];
        assert_eq!(action, 1);
        assert!(log_prob > -1e-6);
    }
}
