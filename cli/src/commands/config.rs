// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use spacegate_core::domain::engine_config::EngineConfigManifest;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./spacegate.yaml)
        #[arg(short, long, default_value = "./spacegate.yaml")]
        output: PathBuf,

        /// Include a simulated host and commented examples
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. SPACEGATE_CONFIG_PATH: {}",
            std::env::var("SPACEGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./spacegate.yaml");
        println!("  4. ~/.spacegate/config.yaml");
        println!("  5. /etc/spacegate/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;
    println!("{}", "Policy Feed:".bold());
    println!("  Base URL: {}", spec.feed.base_url);
    println!("  Updates path: {}", spec.feed.updates_path);
    println!("  Algorithm: {}", spec.feed.algorithm);
    println!(
        "  Public key: {}",
        if spec.feed.public_key.is_some() {
            "configured".green()
        } else {
            "missing".red()
        }
    );
    if let Some(url) = &spec.feed.debug_position_url {
        println!("  Debug position: {}", url);
    }
    println!();

    println!("{}", "Intervals:".bold());
    println!("  Sync: {}s", spec.intervals.sync_seconds);
    println!("  Access control: {}s", spec.intervals.access_control_seconds);
    println!("  Position updates: {}s", spec.intervals.position_update_seconds);
    println!("  Debug position: {}s", spec.intervals.debug_position_seconds);
    println!("  Recency threshold: {}s", spec.recency_threshold_seconds);
    println!(
        "  Timeouts: fetch {}s, capability {}s",
        spec.timeouts.fetch_seconds, spec.timeouts.capability_seconds
    );
    println!("  Max delegation hops: {}", spec.resolver.max_delegation_hops);
    println!();

    match &spec.simulation {
        Some(simulation) => {
            println!("{}", "Simulated Host:".bold());
            println!("  Location enabled: {}", simulation.location_enabled);
            println!("  Network available: {}", simulation.network_available);
            match &simulation.position {
                Some(position) => println!("  Position: {}", position),
                None => println!("  Position: {}", "(none)".dimmed()),
            }
            for app in &simulation.installed_apps {
                println!("  {} [{}]", app.app_id.bold(), app.granted.join(", "));
            }
        }
        None => println!("{}", "Simulated Host: (not configured)".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = EngineConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
