// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aether_core::domain::console_config::ConsoleConfig;

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
        /// Output path (default: ./aether-config.yaml)
        #[arg(short, long, default_value = "./aether-config.yaml")]
        output: PathBuf,

        /// Include every section with comments
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
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ConsoleConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AETHER_CONFIG_PATH: {}",
            std::env::var("AETHER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aether-config.yaml");
        println!("  4. ~/.aether/config.yaml");
        println!("  5. /etc/aether/config.yaml");
        println!();
    }

    println!("{} ({})", "Current configuration:".bold(), config.metadata.name);
    println!();

    let spec = &config.spec;
    println!("{}", "Playback:".bold());
    println!("  Tick interval: {} ms", spec.playback.tick_interval_ms);
    println!("  Default speed: x{}", spec.playback.default_speed);
    println!();

    println!("{}", "Store:".bold());
    println!("  Max messages: {}", spec.store.max_messages);
    println!("  Max logs: {}", spec.store.max_logs);
    println!();

    println!("{}", "Generation:".bold());
    println!("  Endpoint: {}", spec.llm.endpoint);
    println!("  Model: {}", spec.llm.model);
    println!("  Temperature: {}", spec.llm.temperature);
    println!("  Max tokens: {}", spec.llm.max_tokens);
    println!();

    println!("{}", "Vault:".bold());
    println!("  Path: {}", spec.vault.path.display());
    println!();

    println!("{}", "Studio sync:".bold());
    println!("  URL: {}", spec.sync.studio_url);
    println!("  Auto sync: {}", spec.sync.auto_sync);
    println!("  Reconnect delay: {} ms", spec.sync.reconnect_delay_ms);
    println!();

    println!("{}", "Logging:".bold());
    println!("  Level: {}", spec.logging.level);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ConsoleConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_configs() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = ConsoleConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("aether-config.yaml");
        generate(output.clone(), false).await.unwrap();

        let config = ConsoleConfig::from_yaml_file(&output).unwrap();
        assert_eq!(config.spec.playback.tick_interval_ms, 100);
    }
}
