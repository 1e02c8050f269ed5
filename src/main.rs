use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use loanbook::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for loanbook::AppCommand {
    fn from(cmd: Commands) -> loanbook::AppCommand {
        match cmd {
            Commands::Import {
                loans,
                cash_flows,
                replace,
            } => loanbook::AppCommand::Import {
                loans_path: loans,
                cash_flows_path: cash_flows,
                replace,
            },
            Commands::Loans { filter } => loanbook::AppCommand::Loans { filter },
            Commands::Cashflows { filter } => loanbook::AppCommand::CashFlows { filter },
            Commands::Summary => loanbook::AppCommand::Summary,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Bulk load loans and cash flows from CSV files
    Import {
        /// Path to the loans CSV file
        loans: String,
        /// Path to the cash flows CSV file
        cash_flows: String,
        /// Clear existing loans before loading
        #[arg(long)]
        replace: bool,
    },
    /// List loans and their derived metrics
    Loans {
        /// Filter by field, e.g. rating=5 or is_closed=true
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// List cash flows
    Cashflows {
        /// Filter by field, e.g. type=Funding
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Display portfolio summary
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => loanbook::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = loanbook::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
# Directory for the loan store; defaults to the platform data dir.
# data_dir: "/path/to/store"

ingest:
  # replace clears all loans before a bulk load, append keeps them.
  mode: append
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
