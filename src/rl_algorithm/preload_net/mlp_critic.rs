use crate::burn_utils::{build_from_descriptors, LayerDescriptor, Sequence};
use crate::rl_algorithm::base::model::ValueModel;
use burn::module::AutodiffModule;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

#[derive(Module, Debug)]
pub struct MLPCritic<B: Backend> {
    net: Sequence<B>,
    value_head: Linear<B>,
    observation_dim: usize,
}

impl<B: Backend> MLPCritic<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 1> {
        let hidden = self.net.forward(input);
        return self.value_head.forward(hidden).squeeze::<1>(1);
    }
}

impl<B: AutodiffBackend> ValueModel<B> for MLPCritic<B> {
    fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    fn autodiff_forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        return self.forward(obs);
    }

    fn eval_forward(&self, obs: Tensor<B::InnerBackend, 2>) -> Tensor<B::InnerBackend, 1> {
        return self.valid().forward(obs);
    }
}

#[derive(Config, Debug)]
pub struct MLPCriticConfig {
    observation_dim: usize,
    layers: Vec<LayerDescriptor>,
}

impl MLPCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MLPCritic<B> {
        let (net, hidden_dim) = build_from_descriptors(self.observation_dim, &self.layers, device);
        let value_head = LinearConfig::new(hidden_dim, 1).init::<B>(device);
        return MLPCritic {
            net,
            value_head,
            observation_dim: self.observation_dim,
        };
    }
}
