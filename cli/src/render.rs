// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal rendering for console entities

use colored::{ColoredString, Colorize};

use aether_core::application::entity_store::AgentDrift;
use aether_core::application::playback::PlaybackSnapshot;
use aether_core::domain::agent::{Agent, AgentStatus};
use aether_core::domain::message::{LogEntry, LogLevel, Message, MessagePriority};
use aether_core::domain::spec_diff::PredefinedPatch;

pub fn status_label(status: AgentStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        AgentStatus::Active => text.green(),
        AgentStatus::Idle => text.normal(),
        AgentStatus::Warning => text.yellow(),
        AgentStatus::Error => text.red(),
        AgentStatus::Offline => text.dimmed(),
    }
}

fn level_label(level: LogLevel) -> ColoredString {
    let text = format!("{:<7}", level.to_string().to_uppercase());
    match level {
        LogLevel::Info => text.cyan(),
        LogLevel::Success => text.green(),
        LogLevel::Warning => text.yellow(),
        LogLevel::Error => text.red().bold(),
        LogLevel::Debug => text.dimmed(),
    }
}

fn priority_label(priority: MessagePriority) -> ColoredString {
    let text = priority.to_string();
    match priority {
        MessagePriority::Low => text.dimmed(),
        MessagePriority::Normal => text.normal(),
        MessagePriority::High => text.yellow(),
        MessagePriority::Critical => text.red().bold(),
    }
}

pub fn log_line(entry: &LogEntry) -> String {
    let source = entry
        .source
        .as_deref()
        .map(|s| format!("[{}] ", s))
        .unwrap_or_default();
    format!(
        "{} {} {}{}",
        entry.timestamp.dimmed(),
        level_label(entry.level),
        source.bold(),
        entry.message
    )
}

pub fn message_line(message: &Message) -> String {
    format!(
        "{} {} -> {} ({}, {}) {}",
        message.id.to_string().dimmed(),
        message.from.bold(),
        message.to.bold(),
        message.message_type,
        priority_label(message.priority),
        message.content.summary
    )
}

pub fn print_agents(agents: &[Agent]) {
    println!("{:<13} {:<10} {:>6} {:>9}  {}", "NAME", "STATUS", "TASKS", "PROGRESS", "CURRENT TASK");
    for agent in agents {
        let progress = agent
            .state
            .progress
            .map(|p| format!("{:.0}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<13} {:<10} {:>6} {:>9}  {}",
            agent.name().bold(),
            status_label(agent.status()),
            agent.state.metrics.tasks_completed,
            progress,
            agent.state.current_task.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_agent(agent: &Agent) {
    let spec = &agent.spec;
    println!("{} {} ({})", spec.icon, spec.display_name.bold(), spec.name);
    println!("  {}", spec.description);
    println!();
    println!("{}", "Role:".bold());
    println!("  {}", spec.role);
    println!("{}", "Capabilities:".bold());
    for capability in &spec.capabilities {
        println!("  - {}", capability);
    }
    println!("{}", "Constraints:".bold());
    for constraint in &spec.constraints {
        println!("  - {}", constraint);
    }
    println!("{}", "Communication:".bold());
    println!("  Sends to:      {}", spec.communication.can_send_to.join(", "));
    println!("  Receives from: {}", spec.communication.can_receive_from.join(", "));
    println!("{}", "State:".bold());
    println!("  Status: {}", status_label(agent.status()));
    if let Some(task) = &agent.state.current_task {
        println!("  Task: {}", task);
    }
    let metrics = &agent.state.metrics;
    println!(
        "  Tasks completed: {}  Avg response: {}  Error rate: {:.1}%",
        metrics.tasks_completed,
        metrics.average_response_time,
        metrics.error_rate * 100.0
    );
}

pub fn print_patch(patch: &PredefinedPatch) {
    println!("{} {} ({})", patch.icon, patch.name.bold(), patch.id);
    if !patch.description.is_empty() {
        println!("  {}", patch.description);
    }
    for diff in &patch.diffs {
        let before = diff
            .before
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let after = diff
            .after
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:?} {}.{}: {} -> {} [{:?}]",
            diff.operation, diff.agent_name, diff.path, before, after, diff.impact
        );
    }
}

pub fn snapshot_line(snapshot: &PlaybackSnapshot) -> String {
    format!(
        "{} {} {:>6.0}/{} ms x{} ({}/{} steps)",
        snapshot.scenario.as_deref().unwrap_or("(none)").bold(),
        snapshot.status,
        snapshot.current_time,
        snapshot.duration,
        snapshot.speed,
        snapshot.fired_count,
        snapshot.step_count
    )
}

pub fn drift_lines(drift: &[AgentDrift]) -> Vec<String> {
    drift
        .iter()
        .map(|d| format!("{}: {}", d.agent, d.fields.join(", ")))
        .collect()
}
