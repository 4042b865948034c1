use burn::config::Config;

#[derive(Config, Debug)]
pub struct PPOTrainingConfig {
    #[config(default = 0.99)]
    pub discount: f64,
    #[config(default = 0.7)]
    pub gae_lambda: f64,
    #[config(default = 0.2)]
    pub clip_ratio: f64,
    #[config(default = true)]
    pub standardize_advantages: bool,
    /// Weight of the entropy bonus subtracted from the policy loss.
    #[config(default = 0.0)]
    pub weight_entropy: f64,
    /// Scale of the value-function MSE.
    #[config(default = 1.0)]
    pub weight_value: f64,
}
