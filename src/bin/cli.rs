use chain_tx_tracker::api::{Cli, CliHandler};
use chain_tx_tracker::config::AppConfig;
use clap::Parser;

#[tokio::main]
async fn main() {
    // Quieter than the tracker itself
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path),
        None => AppConfig::load_from_file(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let handler = CliHandler::new(config, cli.database.clone());

    match handler.execute_command(&cli.command).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
