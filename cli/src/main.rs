// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Agent Relay Node
//!
//! The `agent-relay` binary runs one node of the two-seat agent relay.
//!
//! ## Architecture
//!
//! Nodes hold no shared state of their own. Any number of them can run behind
//! a load balancer as long as they point at the same store backend; a node
//! with the in-memory backend is a complete single-node relay.
//!
//! ## Commands
//!
//! - `agent-relay serve` - Run a relay node
//! - `agent-relay config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use agent_relay_core::domain::node_config::RelayConfigManifest;

mod commands;

use commands::ConfigCommand;

/// Agent Relay - Cluster relay for two agent seats
#[derive(Parser)]
#[command(name = "agent-relay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AGENT_RELAY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP/WebSocket port (overrides spec.network.port)
    #[arg(long, global = true, env = "AGENT_RELAY_PORT")]
    port: Option<u16>,

    /// Bind address (overrides spec.network.bind_address)
    #[arg(long, global = true, env = "AGENT_RELAY_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AGENT_RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format (text or json)
    #[arg(long, global = true, env = "AGENT_RELAY_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a relay node
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Flags win over the logging section of whatever config would be loaded
    let logging = cli
        .config
        .clone()
        .or_else(RelayConfigManifest::discover_config)
        .and_then(|path| RelayConfigManifest::from_yaml_file(path).ok())
        .and_then(|config| config.logging().cloned());
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| logging.as_ref().map(|l| l.format.clone()))
        .unwrap_or_else(|| "text".to_string());

    init_logging(&level, &format)?;

    match cli.command {
        Some(Commands::Serve) => commands::serve::run(cli.config, cli.host, cli.port).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
