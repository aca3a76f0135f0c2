// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent commands
//!
//! Commands: list, show, run, models

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use aether_core::domain::credential::StaticApiKey;
use aether_core::domain::events::StoreChange;
use aether_core::domain::llm::GenerationClient;
use aether_core::infrastructure::llm::GeminiClient;

use crate::commands::{load_console, unlock_vault};
use crate::render::{print_agent, print_agents, status_label};

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List agents and their baseline state
    List,

    /// Show an agent's spec
    Show {
        /// Agent name
        #[arg(value_name = "AGENT")]
        name: String,
    },

    /// Run a task on an agent with the live generation API
    Run {
        /// Agent name
        #[arg(value_name = "AGENT")]
        name: String,

        /// Task input
        #[arg(value_name = "INPUT")]
        input: String,

        /// Stream the response as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// List generation models available to the stored API key
    Models,
}

pub async fn handle_command(command: AgentCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        AgentCommand::List => {
            let console = load_console(config_path)?;
            print_agents(console.store().lock().agents());
            Ok(())
        }
        AgentCommand::Show { name } => {
            let console = load_console(config_path)?;
            let store = console.store().lock();
            let Some(agent) = store.get_agent(&name) else {
                bail!("Unknown agent '{}'", name);
            };
            print_agent(agent);
            Ok(())
        }
        AgentCommand::Run {
            name,
            input,
            stream,
        } => run(config_path, &name, &input, stream).await,
        AgentCommand::Models => models(config_path).await,
    }
}

async fn run(config_path: Option<PathBuf>, name: &str, input: &str, stream: bool) -> Result<()> {
    let console = load_console(config_path)?;
    if console.store().lock().get_agent(name).is_none() {
        bail!("Unknown agent '{}'", name);
    }
    unlock_vault(&console)?;

    // Status transitions for this agent, printed as they happen
    let mut changes = console.event_bus().subscribe_agent(name);
    let watcher = tokio::spawn(async move {
        while let Ok(change) = changes.recv().await {
            if let StoreChange::AgentUpdated {
                agent_name, status, ..
            } = change
            {
                eprintln!("{} {} -> {}", "●".dimmed(), agent_name, status_label(status));
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let executor = console.executor();
    info!(agent = name, model = executor.model(), stream, "Running agent task");
    let result = if stream {
        executor
            .execute_stream(name, input, &cancel, |chunk| {
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            })
            .await
            .map(|_| println!())
    } else {
        executor
            .execute(name, input, &cancel)
            .await
            .map(|response| println!("{}", response))
    };

    interrupt.abort();
    watcher.abort();

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => {
            println!("{}", "Cancelled".yellow());
            Ok(())
        }
        Err(e) => Err(e).context("Agent execution failed"),
    }
}

async fn models(config_path: Option<PathBuf>) -> Result<()> {
    let console = load_console(config_path)?;
    unlock_vault(&console)?;

    let key = console
        .vault()
        .session_api_key()
        .context("Vault is locked")?;
    let llm = &console.config().spec.llm;
    let client = GeminiClient::from_config(llm, Arc::new(StaticApiKey(key)));
    let models = client.list_models().await.context("Failed to list models")?;

    if models.is_empty() {
        println!("{}", "No generation models available".yellow());
        return Ok(());
    }
    println!(" {:<35} {}", "MODEL", "NAME");
    for model in models {
        let marker = if model.id == llm.model {
            "*".green()
        } else {
            " ".normal()
        };
        println!("{}{:<35} {}", marker, model.id, model.name);
    }
    Ok(())
}
