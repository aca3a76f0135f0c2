// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integrated analysis: every specialist answers, the synthesizer combines

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use aether_core::application::console::Console;
use aether_core::application::proposal::{AgentOutcome, ProposalPhase, ProposalReport};

use crate::commands::{load_console, unlock_vault};

pub async fn run(input: &str, config_path: Option<PathBuf>) -> Result<()> {
    let console = load_console(config_path)?;
    unlock_vault(&console)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let report = propose(&console, input, &cancel).await;
    interrupt.abort();
    let report = report.context("Integrated analysis failed")?;

    print_report(&report);
    Ok(())
}

async fn propose(
    console: &Console,
    input: &str,
    cancel: &CancellationToken,
) -> Result<ProposalReport, aether_core::application::agent_executor::ExecutorError> {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }

    let on_phase = |phase: ProposalPhase| match phase {
        ProposalPhase::Gathering => spinner.set_message("Gathering specialist responses..."),
        ProposalPhase::Synthesizing => {
            spinner.finish_and_clear();
            println!("{}", "Integrated proposal".bold());
            println!();
        }
        ProposalPhase::Idle | ProposalPhase::Completed => spinner.finish_and_clear(),
    };
    let on_chunk = |chunk: &str| {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    };

    console
        .proposals()
        .run(input, cancel, on_phase, on_chunk)
        .await
}

fn print_report(report: &ProposalReport) {
    if report.final_proposal.is_some() {
        println!();
    }
    println!();
    println!("{}", "Specialists".bold());
    for result in &report.agent_results {
        let (label, detail) = match &result.outcome {
            AgentOutcome::Completed { response } => {
                ("completed".green(), first_line(response).to_string())
            }
            AgentOutcome::Error { message } => ("error".red(), message.clone()),
            AgentOutcome::Cancelled => ("cancelled".yellow(), String::new()),
        };
        println!("  {:<12} {:<10} {}", result.display_name, label, detail);
    }

    if let Some(error) = &report.synthesis_error {
        println!();
        println!("{}", format!("Synthesis failed: {}", error).red());
    } else if report.final_proposal.is_none() {
        println!();
        println!("{}", "No integrated proposal was produced".yellow());
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}
