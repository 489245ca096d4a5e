//! Synapse CLI - agent orchestration service.
//!
//! # Usage
//!
//! ```bash
//! # Start the REST API server
//! synapse serve --port 3000
//!
//! # Use a specific configuration file
//! synapse serve --config ./synapse.toml
//!
//! # Show the effective configuration
//! synapse config show
//!
//! # Check a configuration file
//! synapse config validate --config ./synapse.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use synapse::api;
use synapse::config::{LoggingSection, SynapseConfig};
use synapse::services::AgentServices;

#[derive(Parser)]
#[command(name = "synapse")]
#[command(about = "Synapse - Agent Orchestration Service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Load and validate a configuration
    Validate {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, config } => {
            let mut config = load_config(config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate().context("Invalid configuration")?;

            init_logging(&config.logging, cli.verbose);

            let services = Arc::new(AgentServices::from_config(&config));
            api::start_server(&config, services).await?;
        }

        Commands::Config(ConfigCommands::Show { config }) => {
            let config = load_config(config)?;
            print!("{}", config.to_toml()?);
        }

        Commands::Config(ConfigCommands::Validate { config }) => {
            let config = load_config(config)?;
            println!(
                "Configuration is valid ({} training workers, {} ms default timeout)",
                config.training.workers, config.execution.default_timeout_ms
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<SynapseConfig> {
    SynapseConfig::load(path.as_deref()).context("Failed to load configuration")
}

fn init_logging(logging: &LoggingSection, verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("synapse=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("synapse={},warn", logging.level)))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
