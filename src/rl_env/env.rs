use super::preprocessor::{ObservationSpace, RawObservation};

/// Index of a discrete action.
pub type Action = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    pub observation: RawObservation,
    pub reward: f64,
    pub terminal: bool,
}

/// The environment the agent interacts with. The agent borrows it and never
/// owns its lifecycle.
pub trait Environment {
    fn reset(&mut self) -> RawObservation;
    fn step(&mut self, action: Action) -> StepInfo;
    fn observation_space(&self) -> ObservationSpace;
    fn get_action_dim(&self) -> usize;
}
