// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use agent_relay_core::domain::node_config::{RelayConfigManifest, StoreBackendKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./agent-relay.yaml)
        #[arg(short, long, default_value = "./agent-relay.yaml")]
        output: PathBuf,

        /// Use the Redis backend instead of in-memory
        #[arg(long)]
        redis: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, redis } => generate(output, redis).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = RelayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AGENT_RELAY_CONFIG_PATH: {}",
            std::env::var("AGENT_RELAY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./agent-relay.yaml");
        println!("  4. ~/.agent-relay/config.yaml");
        println!("  5. /etc/agent-relay/config.yaml");
        println!();
    }

    if as_yaml {
        let rendered =
            serde_yaml::to_string(&config).context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  ID: {}", spec.node.id);
    println!(
        "  Listen: {}:{}",
        spec.network.bind_address, spec.network.port
    );
    println!();

    println!("{}", "Store:".bold());
    match spec.store.backend {
        StoreBackendKind::Memory => println!("  Backend: memory (single node)"),
        StoreBackendKind::Redis => {
            println!("  Backend: redis");
            println!("  URL: {}", spec.store.url);
            if !spec.store.key_prefix.is_empty() {
                println!("  Key prefix: {}", spec.store.key_prefix);
            }
        }
    }
    println!("  Operation timeout: {}ms", spec.store.operation_timeout_ms);
    println!();

    println!("{}", "Liveness:".bold());
    println!(
        "  Heartbeat interval: {}ms",
        spec.liveness.heartbeat_interval_ms
    );
    println!("  Check delay: {}ms", spec.liveness.check_delay_ms);
    println!("  Presence TTL: {}s", spec.presence.ttl_secs);
    println!();

    println!("{}", "History:".bold());
    println!("  Capacity per scope: {}", spec.history.capacity);
    println!(
        "  Page size: {} (max {})",
        spec.history.default_page, spec.history.max_page
    );
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = RelayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, redis: bool) -> Result<()> {
    let mut sample = RelayConfigManifest::default();
    if redis {
        sample.spec.store.backend = StoreBackendKind::Redis;
    }

    sample
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
