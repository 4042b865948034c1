pub mod categorical_mlp_policy;
pub mod mlp_critic;
