//! gateway - multi-tenant messaging gateway CLI.
//!
//! Subcommands:
//! - `gateway serve` - run the admin surface, session supervisor, and
//!   outbound poller
//! - `gateway show-config` - print the effective configuration and exit
//!
//! Configuration is loaded from (in order, later wins):
//! 1. Compiled defaults
//! 2. /etc/gateway/config.toml
//! 3. ~/.config/gateway/config.toml
//! 4. ./gateway.toml (or --config path)
//! 5. Environment variables (GATEWAY_*)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use patch::GatewayConfig;

use gateway::telemetry;

/// Multi-tenant messaging gateway
#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "Multi-tenant messaging gateway: provider supervisor, send router, admin surface")]
#[command(version)]
struct Cli {
    /// Path to config file (overrides ./gateway.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the admin surface, session supervisor, and outbound poller
    Serve {
        /// Print the effective configuration and exit without serving
        #[arg(long)]
        show_config: bool,
    },
    /// Print the effective configuration and exit
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let use_otel = matches!(cli.command, Commands::Serve { show_config: false });
    if !use_otel {
        telemetry::init_plain("info");
    }

    match cli.command {
        Commands::ShowConfig => {
            let (config, sources) = GatewayConfig::load_with_sources_from(cli.config.as_deref())
                .context("failed to load configuration")?;
            print_config(&config, &sources);
        }
        Commands::Serve { show_config } => {
            let (config, sources) = GatewayConfig::load_with_sources_from(cli.config.as_deref())
                .context("failed to load configuration")?;

            if show_config {
                print_config(&config, &sources);
                return Ok(());
            }

            telemetry::init(&config.telemetry.otlp_endpoint)?;

            tracing::info!("configuration loaded from:");
            for path in &sources.files {
                tracing::info!("  - {}", path.display());
            }
            if !sources.env_overrides.is_empty() {
                tracing::info!(overrides = ?sources.env_overrides, "environment overrides applied");
            }

            gateway::run(config).await?;
        }
    }

    Ok(())
}

fn print_config(config: &GatewayConfig, sources: &patch::ConfigSources) {
    println!("# Configuration sources:");
    for path in &sources.files {
        println!("#   - {}", path.display());
    }
    if !sources.env_overrides.is_empty() {
        println!("# Environment overrides:");
        for var in &sources.env_overrides {
            println!("#   - {var}");
        }
    }
    println!();
    println!("{}", config.to_toml());
}
