use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use log::{info, warn};

use ppo_core::rl_env::env::Environment;
use ppo_core::rl_env::grid_world::GridWorld;
use ppo_core::{AgentError, PPOAgent, TrainConfig};

const GRID_SIZE: usize = 11;
const LOG_EVERY: usize = 10;

type MyBackend = Autodiff<NdArray>;

/// Trains a PPO agent on the grid world, then reports one greedy episode.
pub fn train_network(config_path: Option<&str>, num_episodes: usize) -> Result<(), AgentError> {
    let config = match config_path {
        Some(path) => TrainConfig::from_json_file(path)?,
        None => TrainConfig::ppo_gridworld()?,
    };
    info!("config={}", config);

    let mut env = GridWorld::new(GRID_SIZE, config.seed).with_slip_probability(0.05);
    let max_steps = 4 * env.num_cells();
    let device = NdArrayDevice::Cpu;
    let mut agent = PPOAgent::<MyBackend>::new(
        config,
        env.observation_space(),
        env.get_action_dim(),
        device,
    )?;

    let mut recent_rewards = Vec::with_capacity(LOG_EVERY);
    for episode in 1..=num_episodes {
        match agent.run_episode(&mut env, max_steps) {
            Ok(summary) => recent_rewards.push(summary.total_reward),
            Err(err @ AgentError::Configuration(_)) => return Err(err),
            Err(err) => warn!("episode {} aborted: {}", episode, err),
        }
        if episode % LOG_EVERY == 0 && !recent_rewards.is_empty() {
            let mean = recent_rewards.iter().sum::<f64>() / recent_rewards.len() as f64;
            info!(
                "episode={} mean_reward={:.3} steps={}",
                episode,
                mean,
                agent.stats().steps
            );
            recent_rewards.clear();
        }
    }

    let mut raw = env.reset();
    let mut total_reward = 0.0;
    let mut steps = 0;
    while steps < max_steps {
        let output = agent.act(&raw, true)?;
        let step = env.step(output.action);
        total_reward += step.reward;
        steps += 1;
        if step.terminal {
            break;
        }
        raw = step.observation;
    }
    info!(
        "greedy episode: steps={} reward={:.3}; stats={:?}",
        steps,
        total_reward,
        agent.stats()
    );
    return Ok(());
}
