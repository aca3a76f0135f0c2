// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scenario playback commands
//!
//! Commands: list, show, run

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use aether_core::application::console::Console;
use aether_core::domain::events::{PlaybackEvent, StoreChange};
use aether_core::domain::scenario::{Scenario, ScenarioStep};
use aether_core::infrastructure::event_bus::{DomainEvent, EventBusError};

use crate::commands::{load_console, to_document};
use crate::render::{log_line, message_line, print_agents, snapshot_line};

#[derive(Subcommand)]
pub enum ScenarioCommand {
    /// List built-in scenarios
    List,

    /// Show a scenario's timeline
    Show {
        /// Scenario name or YAML/JSON file
        #[arg(value_name = "SCENARIO")]
        scenario: String,

        /// Print the raw definition (yaml or json)
        #[arg(short, long, value_name = "FORMAT")]
        output: Option<String>,
    },

    /// Play a scenario to completion, streaming logs and messages
    Run {
        /// Scenario name or YAML/JSON file
        #[arg(value_name = "SCENARIO")]
        scenario: String,

        /// Playback speed multiplier
        #[arg(short, long)]
        speed: Option<f64>,

        /// Only print the final state
        #[arg(short, long)]
        quiet: bool,
    },
}

pub async fn handle_command(command: ScenarioCommand, config_path: Option<PathBuf>) -> Result<()> {
    let console = load_console(config_path)?;

    match command {
        ScenarioCommand::List => {
            let scenarios = console.catalog().scenarios();
            println!("{} scenarios available:", scenarios.len());
            println!("{:<24} {:>9} {:>6}  {}", "NAME", "DURATION", "STEPS", "DESCRIPTION");
            for scenario in scenarios {
                println!(
                    "{:<24} {:>7}ms {:>6}  {}",
                    scenario.name.bold(),
                    scenario.duration,
                    scenario.steps.len(),
                    scenario.description
                );
            }
            Ok(())
        }
        ScenarioCommand::Show { scenario, output } => {
            let scenario = console.resolve_scenario(&scenario)?;
            match output {
                Some(format) => println!("{}", to_document(&scenario, &format)?),
                None => show(&scenario),
            }
            Ok(())
        }
        ScenarioCommand::Run {
            scenario,
            speed,
            quiet,
        } => run(&console, &scenario, speed, quiet).await,
    }
}

fn show(scenario: &Scenario) {
    println!("{} ({} ms)", scenario.name.bold(), scenario.duration);
    if !scenario.description.is_empty() {
        println!("  {}", scenario.description);
    }
    println!();
    for step in &scenario.steps {
        println!("  {:>6} ms  {:<13} {}", step.time(), step.kind(), step_summary(step));
    }

    let unreachable = scenario.unreachable_steps();
    if !unreachable.is_empty() {
        println!();
        println!(
            "{}",
            format!(
                "⚠ {} step(s) are past the duration and will never fire: {:?}",
                unreachable.len(),
                unreachable
            )
            .yellow()
        );
    }
}

fn step_summary(step: &ScenarioStep) -> String {
    match step {
        ScenarioStep::SetState { agent, state, .. } => {
            let mut parts = Vec::new();
            if let Some(status) = state.status {
                parts.push(format!("status={}", status));
            }
            match &state.current_task {
                Some(Some(task)) => parts.push(format!("task={:?}", task)),
                Some(None) => parts.push("task=cleared".to_string()),
                None => {}
            }
            match state.progress {
                Some(Some(progress)) => parts.push(format!("progress={:.0}%", progress * 100.0)),
                Some(None) => parts.push("progress=cleared".to_string()),
                None => {}
            }
            format!("{}: {}", agent, parts.join(" "))
        }
        ScenarioStep::SendMessage {
            from, to, message, ..
        } => format!("{} -> {}: {}", from, to, message.message_type),
        ScenarioStep::ConsoleLog {
            source, message, ..
        } => match source {
            Some(source) => format!("[{}] {}", source, message),
            None => message.clone(),
        },
    }
}

async fn run(console: &Console, scenario: &str, speed: Option<f64>, quiet: bool) -> Result<()> {
    console.load_scenario(scenario)?;
    if let Some(speed) = speed {
        console.player().set_speed(speed)?;
    }

    let mut events = console.event_bus().subscribe();
    let bar = ProgressBar::new(console.player().snapshot().duration);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>6}/{len} ms")?
            .progress_chars("=> "),
    );
    let mut refresh = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(scenario, "Starting playback");
    console.player().play();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(DomainEvent::Store(StoreChange::LogAppended(entry))) if !quiet => {
                    bar.println(log_line(&entry));
                }
                Ok(DomainEvent::Store(StoreChange::MessageAppended(message))) if !quiet => {
                    bar.println(format!("  ✉ {}", message_line(&message)));
                }
                Ok(DomainEvent::Playback(PlaybackEvent::PlaybackCompleted { .. })) => {
                    bar.finish_and_clear();
                    break;
                }
                Ok(_) | Err(EventBusError::Lagged(_)) => {}
                Err(_) => break,
            },
            _ = refresh.tick() => {
                bar.set_position(console.player().snapshot().current_time as u64);
            }
            _ = &mut ctrl_c => {
                console.player().pause();
                bar.abandon();
                println!("{}", "Interrupted; playback paused".yellow());
                break;
            }
        }
    }

    println!();
    println!("{}", snapshot_line(&console.player().snapshot()));
    let store = console.store().lock();
    println!(
        "{} messages, {} log entries",
        store.message_count(),
        store.log_count()
    );
    println!();
    print_agents(store.agents());
    Ok(())
}
