use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::burn_utils::tensor::rows2tensor2;
use crate::errors::{AgentError, ConfigurationError, PreprocessingError};
use crate::rl_algorithm::ppo::ppo_agent::PPO;
use crate::rl_algorithm::preload_net::categorical_mlp_policy::{
    CategoricalMLPPolicy, CategoricalMLPPolicyConfig,
};
use crate::rl_algorithm::preload_net::mlp_critic::{MLPCritic, MLPCriticConfig};
use crate::rl_env::env::{Action, Environment};
use crate::rl_env::preprocessor::{ObservationSpace, Preprocessor, RawObservation};

use super::config::TrainConfig;
use super::memory::{RingBuffer, Transition};
use super::model::{NetTrainer, PolicyModel, ValueModel};
use super::rl_utils::UpdateInfo;
use super::scheduler::{ScheduleDecision, UpdateScheduler};

/// What happened when an update cycle fired.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(UpdateInfo),
    /// The store held fewer than `batch_size` transitions; nothing changed.
    Skipped { available: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub action: Action,
    pub log_prob: f64,
    pub value_estimate: f64,
    /// The preprocessed observation the action was chosen for.
    pub observation: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStats {
    pub steps: usize,
    pub episodes: usize,
    pub cycles_completed: usize,
    /// Includes diverged cycles.
    pub cycles_skipped: usize,
    pub cycles_diverged: usize,
    pub preprocessing_failures: usize,
    pub last_update: Option<UpdateInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub steps: usize,
    pub total_reward: f64,
    /// False when the episode was cut at `max_steps`.
    pub terminated: bool,
    pub updates: Vec<UpdateOutcome>,
}

/// The PPO agent: scheduler, experience store and both networks with their
/// optimizers. Interaction and updates both go through `&mut self`, so an
/// update cycle never overlaps with acting or observing.
pub struct OnPolicyRunner<B: AutodiffBackend, PM: PolicyModel<B>, VM: ValueModel<B>> {
    config: TrainConfig,
    device: B::Device,
    preprocessor: Preprocessor,
    memory: RingBuffer<Transition>,
    staged: Vec<Transition>,
    scheduler: UpdateScheduler,
    policy: NetTrainer<B, PM>,
    value: NetTrainer<B, VM>,
    algorithm: PPO<B, PM, VM>,
    rng: StdRng,
    stats: AgentStats,
}

pub type PPOAgent<B> = OnPolicyRunner<B, CategoricalMLPPolicy<B>, MLPCritic<B>>;

impl<B: AutodiffBackend> OnPolicyRunner<B, CategoricalMLPPolicy<B>, MLPCritic<B>> {
    /// Builds both networks from `network_spec` / `value_function_spec`.
    pub fn new(
        config: TrainConfig,
        space: ObservationSpace,
        num_actions: usize,
        device: B::Device,
    ) -> Result<Self, ConfigurationError> {
        if num_actions == 0 {
            return Err(ConfigurationError::NonPositive {
                field: "num_actions",
                value: 0.0,
            });
        }
        config.validate()?;
        let preprocessor = Preprocessor::new(space.clone(), config.preprocessing.clone())?;
        let obs_dim = preprocessor.output_dim();
        let policy_net =
            CategoricalMLPPolicyConfig::new(obs_dim, num_actions, config.policy_layers.clone())
                .init::<B>(&device);
        let value_net = MLPCriticConfig::new(obs_dim, config.value_layers.clone()).init::<B>(&device);
        return Self::with_networks(config, space, policy_net, value_net, device);
    }
}

impl<B: AutodiffBackend, PM: PolicyModel<B>, VM: ValueModel<B>> OnPolicyRunner<B, PM, VM> {
    /// Uses already built networks, e.g. clones shared between runs that
    /// must produce identical parameters. Both must accept rows as wide as
    /// the preprocessed observations.
    pub fn with_networks(
        config: TrainConfig,
        space: ObservationSpace,
        policy_net: PM,
        value_net: VM,
        device: B::Device,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let preprocessor = Preprocessor::new(space, config.preprocessing.clone())?;
        let obs_dim = preprocessor.output_dim();
        if policy_net.observation_dim() != obs_dim {
            return Err(ConfigurationError::ObservationSpace(format!(
                "policy network expects {} features, observations have {}",
                policy_net.observation_dim(),
                obs_dim
            )));
        }
        if value_net.observation_dim() != obs_dim {
            return Err(ConfigurationError::ObservationSpace(format!(
                "value network expects {} features, observations have {}",
                value_net.observation_dim(),
                obs_dim
            )));
        }
        if policy_net.action_dim() == 0 {
            return Err(ConfigurationError::NonPositive {
                field: "num_actions",
                value: 0.0,
            });
        }
        let memory = RingBuffer::new(config.memory_capacity)?;
        let update_config = &config.update_config;
        let scheduler = UpdateScheduler::new(
            update_config.update_mode,
            update_config.update_interval,
            update_config.do_updates,
        );
        let policy = NetTrainer::new(policy_net, config.policy_optimizer.clone());
        let value = NetTrainer::new(value_net, config.value_optimizer.clone());
        let rng = StdRng::seed_from_u64(config.seed);
        return Ok(Self {
            config,
            device,
            preprocessor,
            memory,
            staged: vec![],
            scheduler,
            policy,
            value,
            algorithm: PPO::new(),
            rng,
            stats: AgentStats::default(),
        });
    }

    pub fn preprocess(&self, raw: &RawObservation) -> Result<Vec<f64>, PreprocessingError> {
        self.preprocessor.process(raw)
    }

    fn obs_tensor(&self, observation: &[f64]) -> Tensor<B::InnerBackend, 2> {
        rows2tensor2::<B::InnerBackend>(&[observation], observation.len(), &self.device)
    }

    fn value_of(&self, observation: &[f64]) -> f64 {
        let value = self.value.net().eval_forward(self.obs_tensor(observation));
        return value.into_scalar().to_f64();
    }

    /// Picks an action for `raw`: sampled from the policy, or its most
    /// probable action when `deterministic`.
    pub fn act(
        &mut self,
        raw: &RawObservation,
        deterministic: bool,
    ) -> Result<ActionOutput, AgentError> {
        let observation = match self.preprocess(raw) {
            Ok(observation) => observation,
            Err(err) => {
                self.stats.preprocessing_failures += 1;
                warn!("dropping step: {}", err);
                return Err(err.into());
            }
        };
        let dist = self
            .policy
            .net()
            .eval_forward(self.obs_tensor(&observation));
        let picked = if deterministic {
            dist.mode()
        } else {
            dist.sample(&mut self.rng)
        };
        // one row in, one row out
        let (action, log_prob) = picked[0];
        let value_estimate = self.value_of(&observation);
        return Ok(ActionOutput {
            action,
            log_prob,
            value_estimate,
            observation,
        });
    }

    fn flush(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        debug!("flushing {} staged transitions", self.staged.len());
        for transition in self.staged.drain(..) {
            self.memory.push(transition);
        }
    }

    /// Records one interaction. `next_observation` is only read when this
    /// step triggers an update cycle, to bootstrap the value of the state
    /// after the batch.
    pub fn observe(
        &mut self,
        transition: Transition,
        next_observation: &RawObservation,
    ) -> Result<Option<UpdateOutcome>, AgentError> {
        let expected = self.preprocessor.output_dim();
        if transition.observation.len() != expected {
            return Err(PreprocessingError::FeatureCount {
                expected,
                got: transition.observation.len(),
            }
            .into());
        }
        let terminal = transition.terminal;
        self.staged.push(transition);
        if terminal || self.staged.len() >= self.config.observe_buffer_size {
            self.flush();
        }
        self.stats.steps += 1;
        if terminal {
            self.stats.episodes += 1;
        }

        match self.scheduler.on_step(terminal) {
            ScheduleDecision::Continue => Ok(None),
            ScheduleDecision::Update => {
                let outcome = self.update(next_observation);
                self.scheduler.finish_update();
                outcome.map(Some)
            }
        }
    }

    /// Runs one update cycle now, over the most recent `batch_size`
    /// transitions.
    pub fn update(
        &mut self,
        bootstrap_observation: &RawObservation,
    ) -> Result<UpdateOutcome, AgentError> {
        self.flush();
        let required = self.config.update_config.batch_size;
        let available = self.memory.len();
        if available < required {
            self.stats.cycles_skipped += 1;
            warn!(
                "skipping update: {} transitions stored, {} required",
                available, required
            );
            return Ok(UpdateOutcome::Skipped {
                available,
                required,
            });
        }

        let transitions = self.sample_batch();
        let bootstrap_value = match transitions.last() {
            Some(last) if !last.terminal && last.cut_value.is_none() => {
                let observation = self.preprocess(bootstrap_observation)?;
                self.value_of(&observation)
            }
            _ => 0.0,
        };

        let result = PPO::<B, PM, VM>::prepare_batch(
            &transitions,
            bootstrap_value,
            self.preprocessor.output_dim(),
            &self.config.ppo_train_config,
            &self.device,
        )
        .and_then(|batch| {
            self.algorithm.train(
                &mut self.policy,
                &mut self.value,
                &batch,
                &self.config,
                &mut self.rng,
            )
        });

        match result {
            Ok(update_info) => {
                self.stats.cycles_completed += 1;
                info!(
                    "update cycle {}: policy_loss={:.5} value_loss={:.5} entropy={:.4} clip_fraction={:.3} approx_kl={:.5} mean_return={:.4}",
                    self.stats.cycles_completed,
                    update_info.policy_loss,
                    update_info.value_loss,
                    update_info.entropy,
                    update_info.clip_fraction,
                    update_info.approx_kl,
                    update_info.mean_return
                );
                self.stats.last_update = Some(update_info.clone());
                Ok(UpdateOutcome::Updated(update_info))
            }
            Err(err) => {
                self.stats.cycles_skipped += 1;
                self.stats.cycles_diverged += 1;
                warn!("update cycle aborted: {}", err);
                Err(err.into())
            }
        }
    }

    /// The batch the next update cycle would train on: the most recent
    /// `batch_size` transitions in the order they were recorded.
    pub fn sample_batch(&self) -> Vec<Transition> {
        self.memory.snapshot(self.config.update_config.batch_size)
    }

    /// Drives `env` from a reset until a terminal step or `max_steps`.
    ///
    /// A step whose observation fails preprocessing is counted and dropped:
    /// the environment advances on a uniformly random action and nothing is
    /// recorded for it. An episode cut at `max_steps` stores the value of the
    /// state it stopped at on its last transition, so its advantages do not
    /// run into whatever is recorded next.
    pub fn run_episode<E: Environment>(
        &mut self,
        env: &mut E,
        max_steps: usize,
    ) -> Result<EpisodeSummary, AgentError> {
        let mut raw = env.reset();
        let mut summary = EpisodeSummary {
            steps: 0,
            total_reward: 0.0,
            terminated: false,
            updates: vec![],
        };
        while summary.steps < max_steps {
            let output = match self.act(&raw, false) {
                Ok(output) => Some(output),
                Err(AgentError::Preprocessing(_)) => None,
                Err(err) => return Err(err),
            };
            let action = match &output {
                Some(output) => output.action,
                None => self.rng.random_range(0..env.get_action_dim().max(1)),
            };
            let step = env.step(action);
            summary.steps += 1;
            summary.total_reward += step.reward;

            if let Some(output) = output {
                let cut_value = if !step.terminal && summary.steps == max_steps {
                    Some(self.cut_value_of(&step.observation))
                } else {
                    None
                };
                let transition = Transition {
                    observation: output.observation,
                    action: output.action,
                    reward: step.reward,
                    terminal: step.terminal,
                    log_prob: output.log_prob,
                    value_estimate: output.value_estimate,
                    cut_value,
                };
                if let Some(outcome) = self.observe(transition, &step.observation)? {
                    summary.updates.push(outcome);
                }
            }
            raw = step.observation;
            if step.terminal {
                summary.terminated = true;
                break;
            }
        }
        return Ok(summary);
    }

    /// `V` of the state an episode was cut at. An unreadable state is treated
    /// as worth nothing.
    fn cut_value_of(&mut self, raw: &RawObservation) -> f64 {
        match self.preprocess(raw) {
            Ok(observation) => self.value_of(&observation),
            Err(err) => {
                self.stats.preprocessing_failures += 1;
                warn!("episode cut at an unreadable state, bootstrapping with 0: {}", err);
                0.0
            }
        }
    }

    pub fn clear_memory(&mut self) {
        self.staged.clear();
        self.memory.clear();
    }

    pub fn memory(&self) -> &RingBuffer<Transition> {
        &self.memory
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn observation_dim(&self) -> usize {
        self.preprocessor.output_dim()
    }

    pub fn policy(&self) -> &NetTrainer<B, PM> {
        &self.policy
    }

    pub fn value(&self) -> &NetTrainer<B, VM> {
        &self.value
    }
}
