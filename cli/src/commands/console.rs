// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Interactive console session
//!
//! Reads commands from stdin while streaming log entries, messages and playback
//! and sync transitions from the event bus.

use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use aether_core::application::console::Console;
use aether_core::domain::events::{PatchEvent, PlaybackEvent, StoreChange, SyncEvent};
use aether_core::infrastructure::event_bus::{DomainEvent, EventBusError};
use aether_core::infrastructure::sync_channel::ConnectionStatus;

use crate::commands::load_config;
use crate::render::{drift_lines, log_line, message_line, print_agents, snapshot_line};

#[derive(Args)]
pub struct ConsoleArgs {
    /// Scenario to load on start (name or file)
    #[arg(long, value_name = "SCENARIO")]
    scenario: Option<String>,

    /// Initial playback speed
    #[arg(long)]
    speed: Option<f64>,

    /// Studio WebSocket URL
    #[arg(long, env = "AETHER_STUDIO_URL")]
    studio_url: Option<String>,

    /// Reconnect once when the Studio connection drops
    #[arg(long)]
    auto_sync: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Empty,
    Load(String),
    Play,
    Pause,
    Resume,
    Reset,
    Speed(f64),
    Status,
    Agents,
    Messages,
    Logs(usize),
    Patches,
    Apply(String),
    Revert(String),
    Drift,
    Connect,
    Disconnect,
    Help,
    Quit,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(ReplCommand::Empty);
        };
        let arg = words.next();
        let required = |what: &str| {
            arg.map(str::to_string)
                .ok_or_else(|| format!("usage: {} <{}>", verb, what))
        };

        let command = match verb {
            "load" => ReplCommand::Load(required("name|file")?),
            "play" => ReplCommand::Play,
            "pause" => ReplCommand::Pause,
            "resume" => ReplCommand::Resume,
            "reset" => ReplCommand::Reset,
            "speed" => {
                let value = required("multiplier")?;
                let speed = value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid speed '{}'", value))?;
                ReplCommand::Speed(speed)
            }
            "status" => ReplCommand::Status,
            "agents" => ReplCommand::Agents,
            "messages" => ReplCommand::Messages,
            "logs" => match arg {
                Some(n) => ReplCommand::Logs(
                    n.parse()
                        .map_err(|_| format!("invalid count '{}'", n))?,
                ),
                None => ReplCommand::Logs(20),
            },
            "patches" => ReplCommand::Patches,
            "apply" => ReplCommand::Apply(required("patch-id")?),
            "revert" => ReplCommand::Revert(required("patch-id")?),
            "drift" => ReplCommand::Drift,
            "connect" => ReplCommand::Connect,
            "disconnect" => ReplCommand::Disconnect,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" => ReplCommand::Quit,
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(command)
    }
}

const HELP: &str = "\
Playback:  load <name|file>  play  pause  resume  reset  speed <x>  status
State:     agents  messages  logs [n]  drift
Patches:   patches  apply <id>  revert <id>
Studio:    connect  disconnect
Session:   help  quit";

pub async fn run(args: ConsoleArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(url) = args.studio_url {
        config.spec.sync.studio_url = url;
    }
    if args.auto_sync {
        config.spec.sync.auto_sync = true;
    }
    info!(studio_url = %config.spec.sync.studio_url, "Starting console session");
    let console = Console::new(config)?;
    let mut events = console.event_bus().subscribe();

    if let Some(scenario) = &args.scenario {
        console.load_scenario(scenario)?;
    }
    if let Some(speed) = args.speed {
        console.player().set_speed(speed)?;
    }

    println!("{}", "Aether console".bold());
    println!("{}", HELP.dimmed());
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match ReplCommand::parse(&line) {
                    Ok(ReplCommand::Quit) => break,
                    Ok(command) => {
                        debug!(?command, "Console command");
                        execute(&console, command).await
                    }
                    Err(message) => eprintln!("{}", message.yellow()),
                }
            }
            event = events.recv() => match event {
                Ok(event) => render_event(&event),
                Err(EventBusError::Lagged(n)) => {
                    eprintln!("{}", format!("({} events skipped)", n).dimmed());
                }
                Err(_) => break,
            },
        }
    }

    console.disconnect_studio();
    info!("Console session ended");
    Ok(())
}

async fn execute(console: &Console, command: ReplCommand) {
    let player = console.player();
    match command {
        ReplCommand::Empty | ReplCommand::Quit => {}
        ReplCommand::Load(name) => {
            if let Err(e) = console.load_scenario(&name) {
                eprintln!("{}", format!("{:#}", e).red());
            }
        }
        ReplCommand::Play => {
            if player.snapshot().scenario.is_none() {
                eprintln!("{}", "No scenario loaded; use 'load <name>'".yellow());
            }
            player.play();
        }
        ReplCommand::Pause => player.pause(),
        ReplCommand::Resume => player.resume(),
        ReplCommand::Reset => player.reset(),
        ReplCommand::Speed(speed) => {
            if let Err(e) = player.set_speed(speed) {
                eprintln!("{}", e.to_string().red());
            }
        }
        ReplCommand::Status => {
            let snapshot = player.snapshot();
            println!("{} [{:.0}%]", snapshot_line(&snapshot), snapshot.progress() * 100.0);
            let sync = console.sync().state();
            println!("Studio: {} ({})", connection_label(sync.status), sync.studio_url);
            if let Some(error) = &sync.last_error {
                println!("  last error: {}", error.red());
            }
            if let Some(synced) = sync.last_sync_time {
                println!("  last sync: {}", synced.format("%H:%M:%S"));
            }
            let applied: Vec<_> = console
                .patches()
                .applied()
                .into_iter()
                .map(|a| a.patch.id)
                .collect();
            if !applied.is_empty() {
                println!("Applied patches: {}", applied.join(", "));
            }
        }
        ReplCommand::Agents => print_agents(console.store().lock().agents()),
        ReplCommand::Messages => {
            for message in console.store().lock().messages() {
                println!("{}", message_line(message));
            }
        }
        ReplCommand::Logs(n) => {
            for entry in console.store().lock().recent_logs(n) {
                println!("{}", log_line(entry));
            }
        }
        ReplCommand::Patches => {
            for patch in console.catalog().patches() {
                let marker = if console.patches().is_applied(&patch.id) {
                    "✓".green()
                } else {
                    " ".normal()
                };
                println!("{} {:<12} {}", marker, patch.id, patch.name);
            }
        }
        ReplCommand::Apply(id) => match console.apply_patch(&id) {
            Ok(true) => {}
            Ok(false) => println!("{}", format!("{} is already applied", id).yellow()),
            Err(e) => eprintln!("{}", e.to_string().red()),
        },
        ReplCommand::Revert(id) => {
            if !console.revert_patch(&id) {
                println!("{}", format!("{} is not applied", id).yellow());
            }
        }
        ReplCommand::Drift => {
            let drift = console.store().lock().catalog_drift();
            if drift.is_empty() {
                println!("No drift from the catalog baseline");
            }
            for line in drift_lines(&drift) {
                println!("{}", line);
            }
        }
        ReplCommand::Connect => {
            if let Err(e) = console.connect_studio().await {
                eprintln!("{}", e.to_string().red());
            }
        }
        ReplCommand::Disconnect => console.disconnect_studio(),
        ReplCommand::Help => println!("{}", HELP),
    }
}

fn connection_label(status: ConnectionStatus) -> ColoredString {
    match status {
        ConnectionStatus::Connected => "connected".green(),
        ConnectionStatus::Connecting => "connecting".yellow(),
        ConnectionStatus::Disconnected => "disconnected".normal(),
        ConnectionStatus::Error => "error".red(),
    }
}

fn render_event(event: &DomainEvent) {
    match event {
        DomainEvent::Store(StoreChange::LogAppended(entry)) => println!("{}", log_line(entry)),
        DomainEvent::Store(StoreChange::MessageAppended(message)) => {
            println!("  ✉ {}", message_line(message))
        }
        DomainEvent::Playback(PlaybackEvent::ScenarioLoaded {
            scenario, duration, ..
        }) => println!("{}", format!("▸ Loaded {} ({} ms)", scenario, duration).cyan()),
        DomainEvent::Playback(PlaybackEvent::PlaybackStarted { speed, .. }) => {
            println!("{}", format!("▸ Playing at x{}", speed).cyan())
        }
        DomainEvent::Playback(PlaybackEvent::PlaybackPaused { virtual_time, .. }) => {
            println!("{}", format!("▸ Paused at {:.0} ms", virtual_time).cyan())
        }
        DomainEvent::Playback(PlaybackEvent::PlaybackResumed { .. }) => {
            println!("{}", "▸ Resumed".cyan())
        }
        DomainEvent::Playback(PlaybackEvent::PlaybackReset { .. }) => {
            println!("{}", "▸ Reset to baseline".cyan())
        }
        DomainEvent::Playback(PlaybackEvent::SpeedChanged { speed, .. }) => {
            println!("{}", format!("▸ Speed x{}", speed).cyan())
        }
        DomainEvent::Playback(PlaybackEvent::PlaybackCompleted { fired_steps, .. }) => {
            println!("{}", format!("▸ Completed ({} steps fired)", fired_steps).cyan())
        }
        DomainEvent::Sync(SyncEvent::ScenarioReceived { scenario, .. }) => println!(
            "{}",
            format!("⇄ Studio shared scenario '{}'", scenario.name).cyan()
        ),
        DomainEvent::Sync(SyncEvent::SpecUpdated { agents, .. }) => {
            println!("{}", format!("⇄ Studio updated {} agent spec(s)", agents.len()).cyan())
        }
        DomainEvent::Patch(PatchEvent::PatchApplied { .. } | PatchEvent::PatchReverted { .. })
        | DomainEvent::Playback(PlaybackEvent::StepFired { .. })
        | DomainEvent::Store(_)
        | DomainEvent::Sync(_) => {}
    }
}
