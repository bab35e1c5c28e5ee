use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use thiserror::Error;

use crate::config::AppConfig;
use crate::database::Database;
use crate::error::{ConfigError, DatabaseError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("CLI operation failed: {0}")]
    Operation(String),
}

#[derive(Parser, Debug)]
#[command(name = "tracker-cli")]
#[command(about = "Inspect and maintain the multi-chain transaction tracker")]
#[command(version)]
pub struct Cli {
    /// Database path, overrides the configured one
    #[arg(long)]
    pub database: Option<String>,

    /// Configuration file, defaults to CONFIG_FILE or ./config.toml
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Show the persisted watermark of every chain
    Watermarks,
    /// Move a chain's watermark forward (a lower value is ignored)
    SetWatermark { chain: String, block: u64 },
    /// List recently emitted events
    Events {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long)]
        chain: Option<String>,
    },
    /// List configured chains
    Chains,
    /// Print a sample configuration file
    GenerateConfig {
        /// Write to this path instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
    /// Load and validate a configuration file
    ValidateConfig { path: Option<String> },
}

/// Executes CLI commands; the database is opened only by commands that need it
pub struct CliHandler {
    config: AppConfig,
    database_path: String,
}

impl CliHandler {
    pub fn new(config: AppConfig, database_override: Option<String>) -> Self {
        let database_path = database_override.unwrap_or_else(|| config.database.path.clone());
        Self { config, database_path }
    }

    fn open_database(&self) -> Result<Database, CliError> {
        Ok(Database::new(&self.database_path)?)
    }

    /// Run `command` and return the text to print
    pub async fn execute_command(&self, command: &Commands) -> Result<String, CliError> {
        match command {
            Commands::Watermarks => self.watermarks(),
            Commands::SetWatermark { chain, block } => self.set_watermark(chain, *block),
            Commands::Events { limit, offset, chain } => self.events(*limit, *offset, chain.as_deref()),
            Commands::Chains => Ok(self.chains()),
            Commands::GenerateConfig { output } => generate_config(output.as_deref()),
            Commands::ValidateConfig { path } => validate_config(path.as_deref()),
        }
    }

    fn watermarks(&self) -> Result<String, CliError> {
        let rows = self.open_database()?.all_watermarks()?;
        if rows.is_empty() {
            return Ok("No watermarks recorded yet".to_string());
        }

        let mut out = format!("{:<20} {:>14} {}\n", "CHAIN", "LAST BLOCK", "UPDATED");
        for row in rows {
            let updated = chrono::DateTime::from_timestamp(row.updated_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| row.updated_at.to_string());
            let _ = writeln!(out, "{:<20} {:>14} {}", row.chain, row.last_block, updated);
        }
        Ok(out)
    }

    fn set_watermark(&self, chain: &str, block: u64) -> Result<String, CliError> {
        let database = self.open_database()?;
        let stored = database.set_watermark(chain, block)?;

        if stored == block {
            Ok(format!("Watermark for {} set to {}", chain, stored))
        } else {
            Ok(format!(
                "Watermark for {} left at {} (watermarks never move backwards)",
                chain, stored
            ))
        }
    }

    fn events(&self, limit: u32, offset: u32, chain: Option<&str>) -> Result<String, CliError> {
        if limit == 0 {
            return Err(CliError::Operation("limit must be greater than 0".to_string()));
        }

        let database = self.open_database()?;
        let events = database.get_recent_events(limit, offset, chain)?;
        let total = database.get_event_count(chain)?;

        let mut out = String::new();
        for event in &events {
            let _ = writeln!(
                out,
                "[{}] block {} {} {} -> {} {} {}",
                event.chain,
                event.block_number,
                event.hash,
                event.from_address,
                event.to_address,
                event.value,
                event.currency
            );
        }
        let _ = write!(out, "Showing {} of {} events", events.len(), total);
        Ok(out)
    }

    fn chains(&self) -> String {
        let mut out = String::new();
        for chain in &self.config.chains {
            let _ = writeln!(
                out,
                "{:<16} {:?}{} native={} confirmations={} endpoints={} {}",
                chain.name,
                chain.kind,
                chain
                    .chain_type
                    .map(|flavor| format!("/{:?}", flavor))
                    .unwrap_or_default(),
                chain.native_token,
                chain.confirmations,
                chain.endpoints().len(),
                if chain.enabled { "enabled" } else { "disabled" }
            );
        }
        if out.is_empty() {
            out.push_str("No chains configured");
        }
        out
    }
}

fn generate_config(output: Option<&str>) -> Result<String, CliError> {
    match output {
        Some(path) => {
            AppConfig::sample().save_to_file(path)?;
            Ok(format!("Sample configuration written to {}", path))
        }
        None => Ok(AppConfig::generate_sample_config()?),
    }
}

fn validate_config(path: Option<&str>) -> Result<String, CliError> {
    let config = match path {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::load_from_file()?,
    };
    config.validate()?;

    let enabled = config.enabled_chains().count();
    Ok(format!(
        "Configuration is valid: {} chains ({} enabled)",
        config.chains.len(),
        enabled
    ))
}
