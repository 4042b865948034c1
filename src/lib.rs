pub mod burn_utils;
pub mod errors;
pub mod rl_algorithm;
pub mod rl_env;

pub use errors::{
    AgentError, ConfigurationError, DivergedQuantity, PreprocessingError, UpdateDivergedError,
};
pub use rl_algorithm::base::config::{AgentSpec, TrainConfig};
pub use rl_algorithm::base::memory::{RingBuffer, Transition};
pub use rl_algorithm::base::on_policy_runner::{
    ActionOutput, AgentStats, EpisodeSummary, OnPolicyRunner, PPOAgent, UpdateOutcome,
};
pub use rl_algorithm::base::rl_utils::UpdateInfo;
