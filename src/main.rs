use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;

use chain_tx_tracker::api::{ApiServer, AppState};
use chain_tx_tracker::config::AppConfig;
use chain_tx_tracker::database::Database;
use chain_tx_tracker::error::ConfigError;
use chain_tx_tracker::logging::init_logging;
use chain_tx_tracker::tracking::{ChannelSink, EventRecorder, Tracker};

/// Capacity of the scheduler -> recorder event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Multi-chain transaction tracker")]
#[command(version)]
struct Args {
    /// Configuration file, defaults to CONFIG_FILE or ./config.toml
    #[arg(long)]
    config: Option<String>,

    /// Do not start the HTTP control API
    #[arg(long)]
    no_api: bool,
}

fn load_config(args: &Args) -> Result<AppConfig, ConfigError> {
    match &args.config {
        Some(path) => {
            let mut config = AppConfig::from_path(path)?;
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
        None => AppConfig::load(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if args.no_api {
        config.api.enabled = false;
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(config).await {
        error!("Tracker failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting multi-chain transaction tracker with {} enabled chains",
        config.enabled_chains().count()
    );

    let database = Arc::new(Database::from_config(&config.database)?);

    let (sink, receiver) = ChannelSink::new(EVENT_CHANNEL_CAPACITY);
    let recorder = EventRecorder::new(database.clone(), &config.chains);
    let recorder_task = tokio::spawn(recorder.run(receiver));

    let tracker = Arc::new(Tracker::start(&config, database.clone(), Arc::new(sink))?);

    let (stop_api, api_stopped) = oneshot::channel::<()>();
    let server_task = if config.api.enabled {
        let server = ApiServer::new(
            AppState {
                tracker: tracker.clone(),
                database: database.clone(),
            },
            &config.api,
        );
        Some(tokio::spawn(async move {
            server
                .start(async {
                    let _ = api_stopped.await;
                })
                .await
        }))
    } else {
        None
    };

    signal::ctrl_c().await?;
    info!("Received shutdown signal");

    tracker.shutdown().await;
    let _ = stop_api.send(());

    if let Some(task) = server_task {
        match task.await {
            Ok(Err(e)) => error!("HTTP API server failed: {}", e),
            Err(e) => error!("HTTP API task panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }

    // Dropping the last tracker reference closes the event channel
    drop(tracker);
    let grace = config.tracker.shutdown_grace() + Duration::from_secs(1);
    if tokio::time::timeout(grace, recorder_task).await.is_err() {
        warn!("Event recorder did not drain within {}ms", grace.as_millis());
    }

    info!("Tracker stopped");
    Ok(())
}
