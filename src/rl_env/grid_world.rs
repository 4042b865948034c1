use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::env::{Action, Environment, StepInfo};
use super::preprocessor::{ComponentSpace, ObservationComponent, ObservationSpace, RawObservation};

const MOVES: [(i64, i64); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)]; // up, right, down, left

/// Square grid; the agent starts in the top-left cell and is rewarded for
/// reaching the bottom-right one. Observations are the categorical cell index.
pub struct GridWorld {
    size: usize,
    state: usize,
    steps: usize,
    max_episode_steps: usize,
    slip_probability: f64,
    step_reward: f64,
    goal_reward: f64,
    rng: StdRng,
}

impl GridWorld {
    pub fn new(size: usize, seed: u64) -> Self {
        Self {
            size: size.max(2),
            state: 0,
            steps: 0,
            max_episode_steps: 4 * size * size,
            slip_probability: 0.0,
            step_reward: -0.1,
            goal_reward: 1.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// With this probability a random action replaces the chosen one.
    pub fn with_slip_probability(mut self, slip_probability: f64) -> Self {
        self.slip_probability = slip_probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_episode_steps(mut self, max_episode_steps: usize) -> Self {
        self.max_episode_steps = max_episode_steps.max(1);
        self
    }

    pub fn num_cells(&self) -> usize {
        self.size * self.size
    }

    pub fn state(&self) -> usize {
        self.state
    }

    fn goal(&self) -> usize {
        self.num_cells() - 1
    }

    fn observation(&self) -> RawObservation {
        RawObservation::single(ObservationComponent::category(self.state as i64))
    }
}

impl Environment for GridWorld {
    fn reset(&mut self) -> RawObservation {
        self.state = 0;
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: Action) -> StepInfo {
        let mut action = action % MOVES.len();
        if self.slip_probability > 0.0 && self.rng.random::<f64>() < self.slip_probability {
            action = self.rng.random_range(0..MOVES.len());
        }
        let (dr, dc) = MOVES[action];
        let row = (self.state / self.size) as i64 + dr;
        let col = (self.state % self.size) as i64 + dc;
        let size = self.size as i64;
        if (0..size).contains(&row) && (0..size).contains(&col) {
            self.state = (row * size + col) as usize;
        }
        self.steps += 1;

        let reached_goal = self.state == self.goal();
        let reward = if reached_goal {
            self.goal_reward
        } else {
            self.step_reward
        };
        let terminal = reached_goal || self.steps >= self.max_episode_steps;
        let observation = if terminal {
            self.reset()
        } else {
            self.observation()
        };
        StepInfo {
            observation,
            reward,
            terminal,
        }
    }

    fn observation_space(&self) -> ObservationSpace {
        ObservationSpace {
            components: vec![ComponentSpace::Categorical {
                shape: vec![],
                num_categories: self.num_cells(),
            }],
        }
    }

    fn get_action_dim(&self) -> usize {
        MOVES.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walls_block_movement() {
        let mut env = GridWorld::new(3, 0);
        env.reset();
        let info = env.step(0); // up from the top row
        assert_eq!(env.state(), 0);
        assert!(!info.terminal);
        assert_eq!(info.reward, -0.1);
    }

    #[test]
    fn test_reaching_goal_terminates_and_resets() {
        let mut env = GridWorld::new(2, 0);
        env.reset();
        env.step(1); // right
        let info = env.step(2); // down onto the goal
        assert!(info.terminal);
        assert_eq!(info.reward, 1.0);
        assert_eq!(env.state(), 0);
        assert_eq!(
            info.observation,
            RawObservation::single(ObservationComponent::category(0))
        );
    }

    #[test]
    fn test_episode_truncation() {
        let mut env = GridWorld::new(3, 0).with_max_episode_steps(2);
        env.reset();
        assert!(!env.step(0).terminal);
        assert!(env.step(0).terminal);
    }

    #[test]
    fn test_slippery_is_seed_deterministic() {
        let run = |seed| {
            let mut env = GridWorld::new(5, seed).with_slip_probability(0.5);
            env.reset();
            (0..30).map(|_| env.step(1).reward).sum::<f64>()
        };
        assert_eq!(run(4), run(4));
    }
}
