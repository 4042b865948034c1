use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

const STANDARDIZE_EPSILON: f64 = 1e-8;

/// Backpropagates `loss` and collects the gradients belonging to `module`.
/// Nothing is mutated, so gradients of several networks can be gathered
/// before any of them is stepped.
pub(crate) fn gradients_of<B: AutodiffBackend, M: AutodiffModule<B>>(
    loss: Tensor<B, 1>,
    module: &M,
) -> GradientsParams {
    let gradients = loss.backward();
    return GradientsParams::from_grads(gradients, module);
}

/// Shifts to zero mean and scales to unit (population) standard deviation.
/// A constant input maps to all zeros.
pub fn standardize(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    for x in values.iter_mut() {
        *x = (*x - mean) / (std + STANDARDIZE_EPSILON);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GAEOutput {
    pub advantages: Vec<f64>,
    pub returns: Vec<f64>,
}

/// Generalized advantage estimation over one ordered segment.
///
/// `values` holds `V(s_0) .. V(s_{n-1})` followed by the bootstrap value of
/// the state after the last transition, so it is one longer than `rewards`.
/// The recursion is cut at every terminal transition, and at every transition
/// with a `cut_values` entry, which then replaces the bootstrap value.
pub fn get_gae(
    rewards: &[f64],
    values: &[f64],
    terminals: &[bool],
    cut_values: &[Option<f64>],
    discount: f64,
    gae_lambda: f64,
) -> Option<GAEOutput> {
    let n = rewards.len();
    if values.len() != n + 1 || terminals.len() != n || cut_values.len() != n {
        return None;
    }
    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];

    let mut running_advantage = 0.0;
    for i in (0..n).rev() {
        // (value of the next state, whether the recursion carries over)
        let (next_value, carry) = match cut_values[i] {
            _ if terminals[i] => (0.0, 0.0),
            Some(cut_value) => (cut_value, 0.0),
            None => (values[i + 1], 1.0),
        };
        let delta = rewards[i] + discount * next_value - values[i];
        running_advantage = delta + discount * gae_lambda * carry * running_advantage;
        advantages[i] = running_advantage;
        returns[i] = running_advantage + values[i];
    }

    return Some(GAEOutput {
        advantages,
        returns,
    });
}

/// Statistics of one update cycle, averaged over its gradient steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateInfo {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub clip_fraction: f64,
    pub approx_kl: f64,
    pub mean_return: f64,
    pub num_gradient_steps: usize,
}

impl UpdateInfo {
    pub fn new() -> Self {
        return Self::default();
    }

    pub(crate) fn accumulate(&mut self, step: &UpdateInfo) {
        self.policy_loss += step.policy_loss;
        self.value_loss += step.value_loss;
        self.entropy += step.entropy;
        self.clip_fraction += step.clip_fraction;
        self.approx_kl += step.approx_kl;
        self.num_gradient_steps += 1;
    }

    pub(crate) fn finish(mut self, mean_return: f64) -> Self {
        let n = self.num_gradient_steps.max(1) as f64;
        self.policy_loss /= n;
        self.value_loss /= n;
        self.entropy /= n;
        self.clip_fraction /= n;
        self.approx_kl /= n;
        self.mean_return = mean_return;
        return self;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_terminal_single_step() {
        let out = get_gae(&[2.0], &[0.5, 10.0], &[true], &[None], 0.99, 0.7).unwrap();
        assert_relative_eq!(out.advantages[0], 1.5);
        assert_relative_eq!(out.returns[0], 2.0);
    }

    #[test]
    fn test_two_step_non_terminal() {
        let out = get_gae(&[1.0, 1.0], &[0.0, 0.0, 0.0], &[false, false], &[None; 2], 0.99, 0.7).unwrap();
        assert_relative_eq!(out.advantages[0], 1.693, epsilon = 1e-9);
        assert_relative_eq!(out.advantages[1], 1.0, epsilon = 1e-9);
        assert_eq!(out.returns, out.advantages);
    }

    #[test]
    fn test_recursion_resets_at_terminal() {
        let out = get_gae(
            &[1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.0, 5.0],
            &[false, true, false],
            &[None; 3],
            0.99,
            0.7,
        )
        .unwrap();
        // step 1 ends an episode, so step 2's bootstrap never leaks into it
        assert_relative_eq!(out.advantages[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(out.advantages[0], 1.693, epsilon = 1e-9);
        assert_relative_eq!(out.advantages[2], 1.0 + 0.99 * 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recursion_resets_at_cut() {
        let rewards = [1.0, 1.0, 1.0];
        let values = [0.0, 0.0, 3.0, 0.0];
        let terminals = [false; 3];
        // step 1 was cut by a time limit at a state worth 2.0
        let cut = get_gae(&rewards, &values, &terminals, &[None, Some(2.0), None], 0.99, 0.7)
            .unwrap();
        assert_relative_eq!(cut.advantages[2], 1.0 - 3.0, epsilon = 1e-9);
        assert_relative_eq!(cut.advantages[1], 1.0 + 0.99 * 2.0, epsilon = 1e-9);
        assert_relative_eq!(
            cut.advantages[0],
            1.0 + 0.99 * 0.7 * (1.0 + 0.99 * 2.0),
            epsilon = 1e-9
        );

        // the later segment's rewards never reach back across the cut
        let later = get_gae(
            &[1.0, 1.0, 100.0],
            &values,
            &terminals,
            &[None, Some(2.0), None],
            0.99,
            0.7,
        )
        .unwrap();
        assert_eq!(later.advantages[..2], cut.advantages[..2]);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(get_gae(&[1.0, 1.0], &[0.0, 0.0], &[false, false], &[None; 2], 0.99, 0.7).is_none());
        assert!(get_gae(&[1.0], &[0.0, 0.0], &[], &[None], 0.99, 0.7).is_none());
        assert!(get_gae(&[1.0], &[0.0, 0.0], &[false], &[], 0.99, 0.7).is_none());
    }

    #[test]
    fn test_standardize() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 10.0];
        standardize(&mut values);
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
        assert_relative_eq!(std, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_standardize_constant_input() {
        let mut values = vec![0.7; 8];
        standardize(&mut values);
        assert!(values.iter().all(|x| x.is_finite() && *x == 0.0));

        let mut empty: Vec<f64> = vec![];
        standardize(&mut empty);
    }

    #[test]
    fn test_update_info_averages() {
        let mut info = UpdateInfo::new();
        for loss in [1.0, 3.0] {
            info.accumulate(&UpdateInfo {
                policy_loss: loss,
                value_loss: 2.0 * loss,
                ..UpdateInfo::default()
            });
        }
        let info = info.finish(0.5);
        assert_eq!(info.num_gradient_steps, 2);
        assert_relative_eq!(info.policy_loss, 2.0);
        assert_relative_eq!(info.value_loss, 4.0);
        assert_relative_eq!(info.mean_return, 0.5);
    }
}
