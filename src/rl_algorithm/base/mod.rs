pub mod config;
pub mod memory;
pub mod model;
pub mod on_policy_runner;
pub mod rl_utils;
pub mod scheduler;
