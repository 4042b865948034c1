use std::fmt;

use thiserror::Error;

/// Invalid or inconsistent hyperparameters, detected when the agent is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("could not read config file {path}: {message}")]
    Io { path: String, message: String },
    #[error("malformed agent config: {0}")]
    Parse(String),
    #[error("unsupported agent type `{0}`, expected `ppo`")]
    UnknownAgentType(String),
    #[error("unknown update_mode `{0}`, expected `time_steps` or `episodes`")]
    UnknownUpdateMode(String),
    #[error("unsupported memory type `{0}`")]
    UnknownMemoryType(String),
    #[error("unsupported optimizer type `{0}`")]
    UnknownOptimizer(String),
    #[error("unsupported preprocessor type `{0}`")]
    UnknownPreprocessor(String),
    #[error("unsupported layer type `{0}`")]
    UnknownLayerType(String),
    #[error("unsupported activation `{0}`")]
    UnknownActivation(String),
    #[error("batch_size {batch_size} is not divisible by sample_size {sample_size}")]
    IndivisibleBatch {
        batch_size: usize,
        sample_size: usize,
    },
    #[error("batch_size {batch_size} exceeds memory capacity {capacity}")]
    BatchExceedsCapacity { batch_size: usize, capacity: usize },
    #[error("`{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("`{field}` must lie in {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("`{0}` must contain at least one layer")]
    EmptyNetwork(&'static str),
    #[error("observation space mismatch: {0}")]
    ObservationSpace(String),
}

/// Malformed observation. Fatal to the current step only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    #[error("expected {expected} observation components, got {got}")]
    ComponentCount { expected: usize, got: usize },
    #[error("component {index}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("component {index}: expected a {expected} component")]
    KindMismatch { index: usize, expected: &'static str },
    #[error("component {index}: category {value} outside 0..{num_categories}")]
    CategoryOutOfRange {
        index: usize,
        value: i64,
        num_categories: usize,
    },
    #[error("component {index}: non-finite value")]
    NonFinite { index: usize },
    #[error("observation has {got} features, the policy expects {expected}")]
    FeatureCount { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergedQuantity {
    Advantages,
    PolicyLoss,
    ValueLoss,
    PolicyParameters,
    ValueParameters,
}

impl fmt::Display for DivergedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DivergedQuantity::Advantages => "advantages",
            DivergedQuantity::PolicyLoss => "policy loss",
            DivergedQuantity::ValueLoss => "value loss",
            DivergedQuantity::PolicyParameters => "policy parameters",
            DivergedQuantity::ValueParameters => "value parameters",
        };
        f.write_str(name)
    }
}

/// NaN/Inf met during an update cycle. Parameters are left at their
/// pre-cycle values when this is returned.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("update diverged at epoch {epoch}, minibatch {minibatch}: non-finite {quantity}")]
pub struct UpdateDivergedError {
    pub epoch: usize,
    pub minibatch: usize,
    pub quantity: DivergedQuantity,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),
    #[error(transparent)]
    UpdateDiverged(#[from] UpdateDivergedError),
}
