// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Aether Console CLI
//!
//! The `aether` binary drives the multi-agent operations console: scenario
//! playback, spec patches, live agent execution and the Studio sync link.
//!
//! ## Commands
//!
//! - `aether console` - Interactive session with live log/message streaming
//! - `aether scenario list|show|run` - Scenario playback
//! - `aether patch list|show` - Patch catalog
//! - `aether agent list|show|run|models` - Agents and generation
//! - `aether propose <input>` - Integrated analysis across all agents
//! - `aether vault set-key|status|clear` - Encrypted API key storage
//! - `aether config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aether_core::domain::console_config::ConsoleConfig;
use aether_console::commands::{
    self, AgentCommand, ConfigCommand, ConsoleArgs, PatchCommand, ScenarioCommand, VaultCommand,
};

/// Aether - multi-agent operations console
#[derive(Parser)]
#[command(name = "aether")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AETHER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "AETHER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console session
    #[command(name = "console")]
    Console(ConsoleArgs),

    /// Scenario playback
    #[command(name = "scenario")]
    Scenario {
        #[command(subcommand)]
        command: ScenarioCommand,
    },

    /// Spec patch catalog
    #[command(name = "patch")]
    Patch {
        #[command(subcommand)]
        command: PatchCommand,
    },

    /// Agents and live generation
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Run an integrated analysis across all agents
    #[command(name = "propose")]
    Propose {
        /// Request to analyze
        #[arg(value_name = "INPUT")]
        input: String,
    },

    /// Encrypted API key storage
    #[command(name = "vault")]
    Vault {
        #[command(subcommand)]
        command: VaultCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let level = match &cli.log_level {
        Some(level) => level.clone(),
        None => ConsoleConfig::load_or_default(cli.config.clone())
            .map(|config| config.spec.logging.level)
            .unwrap_or_else(|_| "info".to_string()),
    };
    init_logging(&level)?;

    match cli.command {
        Some(Commands::Console(args)) => commands::console::run(args, cli.config).await,
        Some(Commands::Scenario { command }) => {
            commands::scenario::handle_command(command, cli.config).await
        }
        Some(Commands::Patch { command }) => {
            commands::patch::handle_command(command, cli.config).await
        }
        Some(Commands::Agent { command }) => {
            commands::agent::handle_command(command, cli.config).await
        }
        Some(Commands::Propose { input }) => commands::propose::run(&input, cli.config).await,
        Some(Commands::Vault { command }) => {
            commands::vault::handle_command(command, cli.config).await
        }
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
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
