use std::path::Path;

use burn::config::Config;
use burn::grad_clipping::GradientClippingConfig;
use burn::optim::AdamConfig;
use serde::{Deserialize, Serialize};

use crate::burn_utils::sequence::{Activation, LayerDescriptor};
use crate::errors::ConfigurationError;
use crate::rl_algorithm::base::scheduler::UpdateMode;
use crate::rl_algorithm::ppo::config::PPOTrainingConfig;
use crate::rl_env::preprocessor::{FlattenCategories, PreprocessorDescriptor};

const PPO_GRIDWORLD_JSON: &str = include_str!("../../../config/ppo_gridworld.json");

// Raw configuration surface, as found in agent JSON files.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Accepted for compatibility and has no effect: every cycle trains on
    /// the most recent `batch_size` transitions.
    #[serde(default)]
    pub sample_episodes: bool,
    #[serde(default = "default_true")]
    pub standardize_advantages: bool,
    #[serde(default = "default_clip_ratio")]
    pub clip_ratio: f64,
    #[serde(default = "default_discount")]
    pub discount: f64,
    #[serde(default = "default_gae_lambda")]
    pub gae_lambda: f64,
    #[serde(default)]
    pub weight_entropy: f64,
    #[serde(default = "default_weight_value")]
    pub weight_value: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub observe_spec: ObserveSpec,
    pub update_spec: UpdateSpec,
    pub memory_spec: MemorySpec,
    #[serde(default)]
    pub preprocessing_spec: Vec<PreprocessingSpec>,
    pub network_spec: Vec<LayerSpec>,
    pub value_function_spec: Vec<LayerSpec>,
    pub optimizer_spec: OptimizerSpec,
    #[serde(default)]
    pub value_function_optimizer_spec: Option<OptimizerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveSpec {
    pub buffer_size: i64,
}

impl Default for ObserveSpec {
    fn default() -> Self {
        Self { buffer_size: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSpec {
    #[serde(default = "default_true")]
    pub do_updates: bool,
    #[serde(default = "default_update_mode")]
    pub update_mode: String,
    pub update_interval: i64,
    pub batch_size: i64,
    pub num_iterations: i64,
    pub sample_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySpec {
    #[serde(rename = "type")]
    pub memory_type: String,
    pub capacity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub flatten: bool,
    #[serde(default)]
    pub flatten_categories: Option<FlattenCategoriesSpec>,
    #[serde(default)]
    pub divisor: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// `flatten_categories` is either a switch or the expected cardinality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlattenCategoriesSpec {
    Flag(bool),
    Count(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub units: i64,
    #[serde(default)]
    pub activation: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub learning_rate: f64,
    #[serde(default)]
    pub clip_grad_norm: Option<f32>,
}

fn default_true() -> bool {
    true
}
fn default_clip_ratio() -> f64 {
    0.2
}
fn default_discount() -> f64 {
    0.99
}
fn default_gae_lambda() -> f64 {
    0.7
}
fn default_weight_value() -> f64 {
    1.0
}
fn default_update_mode() -> String {
    "time_steps".to_string()
}

// Validated configuration.

#[derive(Config, Debug)]
pub struct UpdateConfig {
    #[config(default = true)]
    pub do_updates: bool,
    #[config(default = "UpdateMode::TimeSteps")]
    pub update_mode: UpdateMode,
    #[config(default = 16)]
    pub update_interval: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 10)]
    pub num_iterations: usize,
    #[config(default = 32)]
    pub sample_size: usize,
}

impl UpdateConfig {
    pub fn num_mini_batches(&self) -> usize {
        self.batch_size / self.sample_size
    }
}

#[derive(Config, Debug)]
pub struct OptimizerConfig {
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    pub clip_grad_norm: Option<f32>,
}

impl OptimizerConfig {
    pub fn adam(&self) -> AdamConfig {
        AdamConfig::new().with_grad_clipping(self.clip_grad_norm.map(GradientClippingConfig::Norm))
    }
}

#[derive(Config, Debug)]
pub struct TrainConfig {
    pub ppo_train_config: PPOTrainingConfig,
    pub update_config: UpdateConfig,
    pub memory_capacity: usize,
    pub observe_buffer_size: usize,
    /// Has no effect; batches are always the most recent transitions.
    pub sample_episodes: bool,
    pub preprocessing: Vec<PreprocessorDescriptor>,
    pub policy_layers: Vec<LayerDescriptor>,
    pub value_layers: Vec<LayerDescriptor>,
    pub policy_optimizer: OptimizerConfig,
    pub value_optimizer: OptimizerConfig,
    pub seed: u64,
}

fn positive(field: &'static str, value: i64) -> Result<usize, ConfigurationError> {
    if value <= 0 {
        return Err(ConfigurationError::NonPositive {
            field,
            value: value as f64,
        });
    }
    Ok(value as usize)
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigurationError::OutOfRange {
            field,
            range: "[0, 1]",
            value,
        });
    }
    Ok(())
}

fn parse_update_mode(mode: &str) -> Result<UpdateMode, ConfigurationError> {
    match mode {
        "time_steps" => Ok(UpdateMode::TimeSteps),
        "episodes" => Ok(UpdateMode::Episodes),
        other => Err(ConfigurationError::UnknownUpdateMode(other.to_string())),
    }
}

fn parse_activation(activation: Option<&str>) -> Result<Activation, ConfigurationError> {
    match activation {
        None | Some("linear") => Ok(Activation::Linear),
        Some("relu") => Ok(Activation::Relu),
        Some("tanh") => Ok(Activation::Tanh),
        Some("sigmoid") => Ok(Activation::Sigmoid),
        Some(other) => Err(ConfigurationError::UnknownActivation(other.to_string())),
    }
}

fn parse_layers(
    field: &'static str,
    specs: &[LayerSpec],
) -> Result<Vec<LayerDescriptor>, ConfigurationError> {
    if specs.is_empty() {
        return Err(ConfigurationError::EmptyNetwork(field));
    }
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| match spec.kind.as_str() {
            "dense" => Ok(LayerDescriptor::Dense {
                units: positive("units", spec.units)?,
                activation: parse_activation(spec.activation.as_deref())?,
                scope: spec
                    .scope
                    .clone()
                    .unwrap_or_else(|| format!("{}-{}", field, i)),
            }),
            other => Err(ConfigurationError::UnknownLayerType(other.to_string())),
        })
        .collect()
}

fn parse_preprocessor(
    spec: &PreprocessingSpec,
) -> Result<PreprocessorDescriptor, ConfigurationError> {
    match spec.kind.as_str() {
        "reshape" | "flatten" => {
            let flatten_categories = match spec.flatten_categories {
                None | Some(FlattenCategoriesSpec::Flag(true)) => FlattenCategories::Inferred,
                Some(FlattenCategoriesSpec::Flag(false)) => FlattenCategories::Disabled,
                Some(FlattenCategoriesSpec::Count(n)) => {
                    FlattenCategories::Exactly(positive("flatten_categories", n)?)
                }
            };
            Ok(PreprocessorDescriptor::Reshape {
                flatten: spec.flatten,
                flatten_categories,
            })
        }
        "divide" => Ok(PreprocessorDescriptor::Divide {
            divisor: spec.divisor.unwrap_or(1.0),
        }),
        "clip" => Ok(PreprocessorDescriptor::Clip {
            min: spec.min.unwrap_or(f64::NEG_INFINITY),
            max: spec.max.unwrap_or(f64::INFINITY),
        }),
        other => Err(ConfigurationError::UnknownPreprocessor(other.to_string())),
    }
}

fn parse_optimizer(spec: &OptimizerSpec) -> Result<OptimizerConfig, ConfigurationError> {
    if spec.kind != "adam" {
        return Err(ConfigurationError::UnknownOptimizer(spec.kind.clone()));
    }
    Ok(OptimizerConfig {
        learning_rate: spec.learning_rate,
        clip_grad_norm: spec.clip_grad_norm,
    })
}

impl AgentSpec {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    pub fn into_train_config(self) -> Result<TrainConfig, ConfigurationError> {
        if self.agent_type != "ppo" && self.agent_type != "ppo-agent" {
            return Err(ConfigurationError::UnknownAgentType(self.agent_type));
        }
        match self.memory_spec.memory_type.as_str() {
            "ring_buffer" | "ring-buffer" => {}
            other => return Err(ConfigurationError::UnknownMemoryType(other.to_string())),
        }
        let update_spec = &self.update_spec;
        let update_config = UpdateConfig {
            do_updates: update_spec.do_updates,
            update_mode: parse_update_mode(&update_spec.update_mode)?,
            update_interval: positive("update_spec.update_interval", update_spec.update_interval)?,
            batch_size: positive("update_spec.batch_size", update_spec.batch_size)?,
            num_iterations: positive("update_spec.num_iterations", update_spec.num_iterations)?,
            sample_size: positive("update_spec.sample_size", update_spec.sample_size)?,
        };
        let policy_optimizer = parse_optimizer(&self.optimizer_spec)?;
        let value_optimizer = match &self.value_function_optimizer_spec {
            Some(spec) => parse_optimizer(spec)?,
            None => policy_optimizer.clone(),
        };
        let config = TrainConfig {
            ppo_train_config: PPOTrainingConfig {
                discount: self.discount,
                gae_lambda: self.gae_lambda,
                clip_ratio: self.clip_ratio,
                standardize_advantages: self.standardize_advantages,
                weight_entropy: self.weight_entropy,
                weight_value: self.weight_value,
            },
            update_config,
            memory_capacity: positive("memory_spec.capacity", self.memory_spec.capacity)?,
            observe_buffer_size: positive("observe_spec.buffer_size", self.observe_spec.buffer_size)?,
            sample_episodes: self.sample_episodes,
            preprocessing: self
                .preprocessing_spec
                .iter()
                .map(parse_preprocessor)
                .collect::<Result<_, _>>()?,
            policy_layers: parse_layers("network_spec", &self.network_spec)?,
            value_layers: parse_layers("value_function_spec", &self.value_function_spec)?,
            policy_optimizer,
            value_optimizer,
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

impl TrainConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        AgentSpec::from_json_str(json)?.into_train_config()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        AgentSpec::from_json_file(path)?.into_train_config()
    }

    /// The PPO grid-world agent shipped in `config/ppo_gridworld.json`.
    pub fn ppo_gridworld() -> Result<Self, ConfigurationError> {
        Self::from_json_str(PPO_GRIDWORLD_JSON)
    }

    /// Checks the cross-field invariants. Run again on construction so
    /// programmatically built configs get the same treatment as parsed ones.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let update = &self.update_config;
        for (field, value) in [
            ("update_spec.update_interval", update.update_interval),
            ("update_spec.batch_size", update.batch_size),
            ("update_spec.num_iterations", update.num_iterations),
            ("update_spec.sample_size", update.sample_size),
            ("memory_spec.capacity", self.memory_capacity),
            ("observe_spec.buffer_size", self.observe_buffer_size),
        ] {
            if value == 0 {
                return Err(ConfigurationError::NonPositive { field, value: 0.0 });
            }
        }
        if update.batch_size % update.sample_size != 0 {
            return Err(ConfigurationError::IndivisibleBatch {
                batch_size: update.batch_size,
                sample_size: update.sample_size,
            });
        }
        if update.batch_size > self.memory_capacity {
            return Err(ConfigurationError::BatchExceedsCapacity {
                batch_size: update.batch_size,
                capacity: self.memory_capacity,
            });
        }

        let ppo = &self.ppo_train_config;
        unit_interval("discount", ppo.discount)?;
        unit_interval("gae_lambda", ppo.gae_lambda)?;
        if !(ppo.clip_ratio > 0.0 && ppo.clip_ratio < 1.0) {
            return Err(ConfigurationError::OutOfRange {
                field: "clip_ratio",
                range: "(0, 1)",
                value: ppo.clip_ratio,
            });
        }
        if !ppo.weight_entropy.is_finite() || ppo.weight_entropy < 0.0 {
            return Err(ConfigurationError::OutOfRange {
                field: "weight_entropy",
                range: "[0, inf)",
                value: ppo.weight_entropy,
            });
        }
        if !(ppo.weight_value.is_finite() && ppo.weight_value > 0.0) {
            return Err(ConfigurationError::NonPositive {
                field: "weight_value",
                value: ppo.weight_value,
            });
        }

        for (field, optimizer) in [
            ("optimizer_spec.learning_rate", &self.policy_optimizer),
            (
                "value_function_optimizer_spec.learning_rate",
                &self.value_optimizer,
            ),
        ] {
            if !(optimizer.learning_rate.is_finite() && optimizer.learning_rate > 0.0) {
                return Err(ConfigurationError::NonPositive {
                    field,
                    value: optimizer.learning_rate,
                });
            }
            if let Some(norm) = optimizer.clip_grad_norm {
                if !(norm.is_finite() && norm > 0.0) {
                    return Err(ConfigurationError::NonPositive {
                        field: "optimizer_spec.clip_grad_norm",
                        value: norm as f64,
                    });
                }
            }
        }

        if self.policy_layers.is_empty() {
            return Err(ConfigurationError::EmptyNetwork("network_spec"));
        }
        if self.value_layers.is_empty() {
            return Err(ConfigurationError::EmptyNetwork("value_function_spec"));
        }
        for layer in self.policy_layers.iter().chain(&self.value_layers) {
            if layer.units() == 0 {
                return Err(ConfigurationError::NonPositive {
                    field: "units",
                    value: 0.0,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gridworld_json() -> serde_json::Value {
        serde_json::from_str(PPO_GRIDWORLD_JSON).unwrap()
    }

    fn parse(value: serde_json::Value) -> Result<TrainConfig, ConfigurationError> {
        TrainConfig::from_json_str(&value.to_string())
    }

    #[test]
    fn test_shipped_config() {
        let config = TrainConfig::ppo_gridworld().unwrap();
        let update = &config.update_config;
        assert!(update.do_updates);
        assert_eq!(update.update_mode, UpdateMode::TimeSteps);
        assert_eq!(update.update_interval, 16);
        assert_eq!(update.batch_size, 128);
        assert_eq!(update.num_iterations, 10);
        assert_eq!(update.sample_size, 32);
        assert_eq!(update.num_mini_batches(), 4);
        assert_eq!(config.memory_capacity, 1000);
        assert_eq!(config.ppo_train_config.discount, 0.99);
        assert_eq!(config.ppo_train_config.gae_lambda, 0.7);
        assert_eq!(config.ppo_train_config.clip_ratio, 0.2);
        assert!(config.ppo_train_config.standardize_advantages);
        assert_eq!(config.policy_optimizer.learning_rate, 1e-4);
        assert_eq!(config.value_optimizer.learning_rate, 1e-4);
        assert_eq!(
            config.preprocessing,
            vec![PreprocessorDescriptor::Reshape {
                flatten: true,
                flatten_categories: FlattenCategories::Exactly(121),
            }]
        );
        let units: Vec<usize> = config.policy_layers.iter().map(|l| l.units()).collect();
        assert_eq!(units, vec![128, 128]);
        let units: Vec<usize> = config.value_layers.iter().map(|l| l.units()).collect();
        assert_eq!(units, vec![64, 64]);
    }

    #[test]
    fn test_indivisible_batch_is_rejected() {
        let mut json = gridworld_json();
        json["update_spec"]["sample_size"] = 30.into();
        assert_eq!(
            parse(json).unwrap_err(),
            ConfigurationError::IndivisibleBatch {
                batch_size: 128,
                sample_size: 30
            }
        );
    }

    #[test]
    fn test_unknown_update_mode_is_rejected() {
        let mut json = gridworld_json();
        json["update_spec"]["update_mode"] = "whenever".into();
        assert_eq!(
            parse(json).unwrap_err(),
            ConfigurationError::UnknownUpdateMode("whenever".to_string())
        );
    }

    #[test]
    fn test_non_positive_capacity_is_rejected() {
        let mut json = gridworld_json();
        json["memory_spec"]["capacity"] = 0.into();
        assert!(matches!(
            parse(json).unwrap_err(),
            ConfigurationError::NonPositive {
                field: "memory_spec.capacity",
                ..
            }
        ));
    }

    #[test]
    fn test_batch_larger_than_memory_is_rejected() {
        let mut json = gridworld_json();
        json["memory_spec"]["capacity"] = 64.into();
        assert!(matches!(
            parse(json).unwrap_err(),
            ConfigurationError::BatchExceedsCapacity { .. }
        ));
    }

    #[test]
    fn test_unknown_kinds_are_rejected() {
        let mut json = gridworld_json();
        json["optimizer_spec"]["type"] = "sgd".into();
        assert!(matches!(
            parse(json).unwrap_err(),
            ConfigurationError::UnknownOptimizer(_)
        ));

        let mut json = gridworld_json();
        json["network_spec"][0]["activation"] = "swish".into();
        assert!(matches!(
            parse(json).unwrap_err(),
            ConfigurationError::UnknownActivation(_)
        ));

        let mut json = gridworld_json();
        json["memory_spec"]["type"] = "prioritized_replay".into();
        assert!(matches!(
            parse(json).unwrap_err(),
            ConfigurationError::UnknownMemoryType(_)
        ));
    }

    #[test]
    fn test_separate_value_optimizer_and_flag_categories() {
        let mut json = gridworld_json();
        json["value_function_optimizer_spec"] =
            serde_json::json!({"type": "adam", "learning_rate": 0.001, "clip_grad_norm": 0.5});
        json["preprocessing_spec"][0]["flatten_categories"] = true.into();
        let config = parse(json).unwrap();
        assert_eq!(config.value_optimizer.learning_rate, 0.001);
        assert_eq!(config.value_optimizer.clip_grad_norm, Some(0.5));
        assert_eq!(config.policy_optimizer.clip_grad_norm, None);
        assert_eq!(
            config.preprocessing[0],
            PreprocessorDescriptor::Reshape {
                flatten: true,
                flatten_categories: FlattenCategories::Inferred,
            }
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TrainConfig::from_json_str("{\"type\": \"ppo\"").unwrap_err(),
            ConfigurationError::Parse(_)
        ));
    }
}
