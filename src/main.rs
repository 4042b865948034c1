mod ppo_run;

use log::error;

const DEFAULT_EPISODES: usize = 200;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(String::as_str);
    let num_episodes = args
        .get(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_EPISODES);

    if let Err(err) = ppo_run::train_network(config_path, num_episodes) {
        error!("{}", err);
        std::process::exit(1);
    }
}
