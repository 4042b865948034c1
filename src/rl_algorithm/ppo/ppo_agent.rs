use std::marker::PhantomData;

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use log::{debug, trace, warn};
use rand::Rng;

use crate::burn_utils::{is_finite_scalar, module_has_nan_or_inf};
use crate::errors::{DivergedQuantity, UpdateDivergedError};
use crate::rl_algorithm::base::config::TrainConfig;
use crate::rl_algorithm::base::memory::{Memory, MiniBatch, Transition};
use crate::rl_algorithm::base::model::{NetTrainer, PolicyModel, ValueModel};
use crate::rl_algorithm::base::rl_utils::{self, gradients_of, UpdateInfo};

use super::config::PPOTrainingConfig;

/// Per-sample clipped surrogate objective `min(r * A, clip(r, 1 - eps, 1 + eps) * A)`
/// with `r = exp(logprobs - old_logprobs)`. The policy loss is its negated mean.
pub fn clipped_surrogate<B: Backend>(
    logprobs: Tensor<B, 1>,
    old_logprobs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_ratio: f64,
) -> Tensor<B, 1> {
    let ratio = (logprobs - old_logprobs).exp();
    let clipped_ratio = ratio.clone().clamp(1.0 - clip_ratio, 1.0 + clip_ratio);
    let now_advantage = ratio * advantages.clone();
    let clip_advantage = clipped_ratio * advantages;
    return now_advantage.min_pair(clip_advantage);
}

/// A sampled batch with its advantages, ready for the epoch loop.
pub struct PreparedBatch<B: Backend> {
    pub memory: Memory<B>,
    pub mean_return: f64,
}

fn diverged(epoch: usize, minibatch: usize, quantity: DivergedQuantity) -> UpdateDivergedError {
    UpdateDivergedError {
        epoch,
        minibatch,
        quantity,
    }
}

pub struct PPO<B: AutodiffBackend, PM: PolicyModel<B>, VM: ValueModel<B>> {
    backend: PhantomData<B>,
    policy: PhantomData<PM>,
    value: PhantomData<VM>,
}

impl<B: AutodiffBackend, PM: PolicyModel<B>, VM: ValueModel<B>> PPO<B, PM, VM> {
    pub fn new() -> Self {
        Self {
            backend: PhantomData,
            policy: PhantomData,
            value: PhantomData,
        }
    }

    /// Runs GAE over the chronologically ordered `transitions` and lays the
    /// batch out as tensors. `bootstrap_value` is `V` of the state following
    /// the last transition; it is ignored when that transition is terminal or
    /// carries its own cut value.
    pub fn prepare_batch(
        transitions: &[Transition],
        bootstrap_value: f64,
        obs_dim: usize,
        config: &PPOTrainingConfig,
        device: &B::Device,
    ) -> Result<PreparedBatch<B>, UpdateDivergedError> {
        let rewards: Vec<f64> = transitions.iter().map(|t| t.reward).collect();
        let terminals: Vec<bool> = transitions.iter().map(|t| t.terminal).collect();
        let cut_values: Vec<Option<f64>> = transitions.iter().map(|t| t.cut_value).collect();
        let values: Vec<f64> = transitions
            .iter()
            .map(|t| t.value_estimate)
            .chain(std::iter::once(bootstrap_value))
            .collect();

        // lengths agree by construction
        let gae = rl_utils::get_gae(
            &rewards,
            &values,
            &terminals,
            &cut_values,
            config.discount,
            config.gae_lambda,
        )
        .ok_or_else(|| diverged(0, 0, DivergedQuantity::Advantages))?;

        let mut advantages = gae.advantages;
        let returns = gae.returns;
        if advantages
            .iter()
            .chain(returns.iter())
            .any(|x| !x.is_finite())
        {
            return Err(diverged(0, 0, DivergedQuantity::Advantages));
        }
        let mean_return = returns.iter().sum::<f64>() / returns.len().max(1) as f64;
        if config.standardize_advantages {
            rl_utils::standardize(&mut advantages);
        }
        trace!("advantages={:?}", advantages);
        trace!("returns={:?}", returns);

        let memory = Memory::new(transitions, advantages, returns, obs_dim, device);
        return Ok(PreparedBatch {
            memory,
            mean_return,
        });
    }

    fn actor_loss(
        policy_net: &PM,
        batch: &MiniBatch<B>,
        config: &PPOTrainingConfig,
    ) -> (Tensor<B, 1>, UpdateInfo) {
        let dist = policy_net.autodiff_forward(batch.obs.clone());
        let logprobs = dist.log_prob(batch.action.clone());
        trace!("logprobs={}", logprobs);
        trace!("old_logprobs={}", batch.old_logprobs);

        let surrogate = clipped_surrogate(
            logprobs.clone(),
            batch.old_logprobs.clone(),
            batch.advantages.clone(),
            config.clip_ratio,
        );
        let entropy = dist.entropy().mean();
        let actor_loss = surrogate.mean().neg() - entropy.clone().mul_scalar(config.weight_entropy);

        let log_ratio = (logprobs - batch.old_logprobs.clone()).inner();
        let clipped = log_ratio
            .clone()
            .exp()
            .sub_scalar(1.0)
            .abs()
            .greater_elem(config.clip_ratio)
            .float()
            .mean();
        let stats = UpdateInfo {
            policy_loss: actor_loss.clone().into_scalar().to_f64(),
            entropy: entropy.into_scalar().to_f64(),
            clip_fraction: clipped.into_scalar().to_f64(),
            approx_kl: log_ratio.neg().mean().into_scalar().to_f64(),
            ..UpdateInfo::default()
        };
        return (actor_loss, stats);
    }

    fn baseline_loss(value_net: &VM, batch: &MiniBatch<B>, config: &PPOTrainingConfig) -> Tensor<B, 1> {
        let pred = value_net.autodiff_forward(batch.obs.clone());
        trace!("pred={}", pred);
        let loss = MseLoss::new().forward(pred, batch.returns.clone(), Reduction::Mean);
        return loss.mul_scalar(config.weight_value);
    }

    fn run_epochs<R: Rng + ?Sized>(
        policy: &mut NetTrainer<B, PM>,
        value: &mut NetTrainer<B, VM>,
        memory: &Memory<B>,
        config: &TrainConfig,
        rng: &mut R,
    ) -> Result<UpdateInfo, UpdateDivergedError> {
        let ppo_config = &config.ppo_train_config;
        let update_config = &config.update_config;
        let mut update_info = UpdateInfo::new();

        let mini_batch_iter = memory.mini_batch_iter(
            update_config.num_iterations,
            update_config.num_mini_batches(),
            rng,
        );
        for batch in mini_batch_iter {
            let (epoch, index) = (batch.epoch, batch.index);
            let (actor_loss, mut step_info) = Self::actor_loss(policy.net(), &batch, ppo_config);
            let baseline_loss = Self::baseline_loss(value.net(), &batch, ppo_config);

            if !is_finite_scalar(actor_loss.clone()) {
                return Err(diverged(epoch, index, DivergedQuantity::PolicyLoss));
            }
            if !is_finite_scalar(baseline_loss.clone()) {
                return Err(diverged(epoch, index, DivergedQuantity::ValueLoss));
            }
            step_info.value_loss = baseline_loss.clone().into_scalar().to_f64();

            // both gradients exist before either network moves
            let actor_grads = gradients_of(actor_loss, policy.net());
            let baseline_grads = gradients_of(baseline_loss, value.net());
            policy.step(actor_grads);
            value.step(baseline_grads);

            if module_has_nan_or_inf(policy.net()) {
                return Err(diverged(epoch, index, DivergedQuantity::PolicyParameters));
            }
            if module_has_nan_or_inf(value.net()) {
                return Err(diverged(epoch, index, DivergedQuantity::ValueParameters));
            }
            debug!(
                "epoch={} minibatch={} actor_loss={:.6} baseline_loss={:.6}",
                epoch, index, step_info.policy_loss, step_info.value_loss
            );
            update_info.accumulate(&step_info);
        }
        return Ok(update_info);
    }

    /// One update cycle: `num_iterations` epochs over the prepared batch.
    /// Either every gradient step lands, or both networks and both optimizers
    /// are put back to where they were when the cycle started.
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        policy: &mut NetTrainer<B, PM>,
        value: &mut NetTrainer<B, VM>,
        batch: &PreparedBatch<B>,
        config: &TrainConfig,
        rng: &mut R,
    ) -> Result<UpdateInfo, UpdateDivergedError> {
        let policy_snapshot = policy.snapshot();
        let value_snapshot = value.snapshot();

        match Self::run_epochs(policy, value, &batch.memory, config, rng) {
            Ok(update_info) => Ok(update_info.finish(batch.mean_return)),
            Err(err) => {
                warn!("{}; restoring pre-cycle parameters", err);
                policy.restore(policy_snapshot);
                value.restore(value_snapshot);
                Err(err)
            }
        }
    }
}
