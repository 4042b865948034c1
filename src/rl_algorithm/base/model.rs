use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::burn_utils::distribution::categorical::Categorical;

use super::config::OptimizerConfig;

// for predicting the action distribution of observations
pub trait PolicyModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Width of the observation rows the network expects.
    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    fn autodiff_forward(&self, obs: Tensor<B, 2>) -> Categorical<B>;

    fn eval_forward(&self, obs: Tensor<B::InnerBackend, 2>) -> Categorical<B::InnerBackend>;
}

// for predicting values of states
pub trait ValueModel<B: AutodiffBackend>: AutodiffModule<B> {
    fn observation_dim(&self) -> usize;

    // (batch, obs_dim) -> (batch)
    fn autodiff_forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 1>;

    fn eval_forward(&self, obs: Tensor<B::InnerBackend, 2>) -> Tensor<B::InnerBackend, 1>;
}

type AdamRecord<B, M> = <OptimizerAdaptor<Adam, M, B> as Optimizer<M, B>>::Record;

/// A network together with the Adam instance that owns its moments.
pub struct NetTrainer<B: AutodiffBackend, M: AutodiffModule<B>> {
    net: M,
    optimizer: OptimizerAdaptor<Adam, M, B>,
    config: OptimizerConfig,
}

/// Parameters and optimizer state captured at the start of an update cycle.
pub struct TrainerSnapshot<B: AutodiffBackend, M: AutodiffModule<B>> {
    net: M,
    optimizer: AdamRecord<B, M>,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> NetTrainer<B, M> {
    pub fn new(net: M, config: OptimizerConfig) -> Self {
        let optimizer = config.adam().init::<B, M>();
        return Self {
            net,
            optimizer,
            config,
        };
    }

    pub fn net(&self) -> &M {
        &self.net
    }

    pub fn optimizer(&self) -> &OptimizerAdaptor<Adam, M, B> {
        &self.optimizer
    }

    pub fn step(&mut self, grads: GradientsParams) {
        self.net = self
            .optimizer
            .step(self.config.learning_rate, self.net.clone(), grads);
    }

    pub fn snapshot(&self) -> TrainerSnapshot<B, M> {
        TrainerSnapshot {
            net: self.net.clone(),
            optimizer: self.optimizer.to_record(),
        }
    }

    pub fn restore(&mut self, snapshot: TrainerSnapshot<B, M>) {
        self.net = snapshot.net;
        self.optimizer = self
            .config
            .adam()
            .init::<B, M>()
            .load_record(snapshot.optimizer);
    }
}
