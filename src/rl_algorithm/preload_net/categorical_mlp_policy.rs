use crate::burn_utils::distribution::categorical::Categorical;
use crate::burn_utils::{build_from_descriptors, LayerDescriptor, Sequence};
use crate::rl_algorithm::base::model::PolicyModel;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn::{nn::Linear, nn::LinearConfig, prelude::*};

/// Hidden stack from `network_spec` followed by a linear head producing one
/// logit per discrete action.
#[derive(Module, Debug)]
pub struct CategoricalMLPPolicy<B: Backend> {
    hidden_net: Sequence<B>,
    logits_net: Linear<B>,
    observation_dim: usize,
    action_dim: usize,
}

impl<B: Backend> CategoricalMLPPolicy<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Categorical<B> {
        let hidden = self.hidden_net.forward(input); // (B, hiddim)
        let logits = self.logits_net.forward(hidden); // (B, action_dim)
        return Categorical::from_logits(logits);
    }
}

impl<B: AutodiffBackend> PolicyModel<B> for CategoricalMLPPolicy<B> {
    fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn autodiff_forward(&self, obs: Tensor<B, 2>) -> Categorical<B> {
        return self.forward(obs);
    }

    fn eval_forward(&self, obs: Tensor<B::InnerBackend, 2>) -> Categorical<B::InnerBackend> {
        return self.valid().forward(obs);
    }
}

#[derive(Config, Debug)]
pub struct CategoricalMLPPolicyConfig {
    observation_dim: usize,
    action_dim: usize,
    layers: Vec<LayerDescriptor>,
}

impl CategoricalMLPPolicyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CategoricalMLPPolicy<B> {
        let (hidden_net, hidden_dim) =
            build_from_descriptors(self.observation_dim, &self.layers, device);
        let logits_net = LinearConfig::new(hidden_dim, self.action_dim).init::<B>(device);
        return CategoricalMLPPolicy {
            hidden_net,
            logits_net,
            observation_dim: self.observation_dim,
            action_dim: self.action_dim,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burn_utils::Activation;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;

    #[test]
    fn test_policy_shapes() {
        let device = NdArrayDevice::Cpu;
        let layers = vec![LayerDescriptor::Dense {
            units: 16,
            activation: Activation::Tanh,
            scope: "hidden1".to_string(),
        }];
        let policy = CategoricalMLPPolicyConfig::new(6, 4, layers)
            .init::<Autodiff<NdArray>>(&device);
        assert_eq!(policy.observation_dim(), 6);
        assert_eq!(policy.action_dim(), 4);

        let dist = policy.autodiff_forward(Tensor::ones([3, 6], &device));
        assert_eq!(dist.log_probs().shape().dims, [3, 4]);

        let eval = policy.eval_forward(Tensor::ones([2, 6], &device));
        let row_sums: Vec<f32> = eval
            .log_probs()
            .exp()
            .sum_dim(1)
            .into_data()
            .iter::<f32>()
            .collect();
        for sum in row_sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }
}
