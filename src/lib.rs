pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod ingest;
pub mod log;
pub mod service;
pub mod stats;
pub mod store;

use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub enum AppCommand {
    Import {
        loans_path: String,
        cash_flows_path: String,
        replace: bool,
    },
    Loans {
        filter: Option<String>,
    },
    CashFlows {
        filter: Option<String>,
    },
    Summary,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => {
            // The config is fully defaultable; only an explicit path or an
            // existing file is required reading.
            let path = config::AppConfig::default_config_path()?;
            if path.exists() {
                config::AppConfig::load_from_path(&path)?
            } else {
                config::AppConfig::default()
            }
        }
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Import {
            loans_path,
            cash_flows_path,
            replace,
        } => cli::import::run(&config, &loans_path, &cash_flows_path, replace).await,
        AppCommand::Loans { filter } => cli::loans::run(&config, filter.as_deref()).await,
        AppCommand::CashFlows { filter } => cli::cashflows::run(&config, filter.as_deref()).await,
        AppCommand::Summary => cli::summary::run(&config).await,
    }
}
