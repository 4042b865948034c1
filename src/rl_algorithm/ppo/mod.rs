pub mod config;
pub mod ppo_agent;
