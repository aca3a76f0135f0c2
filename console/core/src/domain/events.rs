// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentStatus;
use crate::domain::message::{LogEntry, Message};
use crate::domain::scenario::Scenario;
use crate::domain::spec_diff::PatchOrigin;

/// Typed change notification emitted by the entity store after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreChange {
    AgentsReset {
        agent_count: usize,
        reset_at: DateTime<Utc>,
    },
    AgentUpdated {
        agent_name: String,
        status: AgentStatus,
        current_task: Option<String>,
        updated_at: DateTime<Utc>,
    },
    MessageAppended(Message),
    LogAppended(LogEntry),
    MessagesCleared {
        cleared_at: DateTime<Utc>,
    },
    LogsCleared {
        cleared_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlaybackEvent {
    ScenarioLoaded {
        scenario: String,
        duration: u64,
        step_count: usize,
        loaded_at: DateTime<Utc>,
    },
    PlaybackStarted {
        scenario: String,
        speed: f64,
        started_at: DateTime<Utc>,
    },
    PlaybackPaused {
        scenario: String,
        virtual_time: f64,
        paused_at: DateTime<Utc>,
    },
    PlaybackResumed {
        scenario: String,
        virtual_time: f64,
        resumed_at: DateTime<Utc>,
    },
    PlaybackReset {
        scenario: Option<String>,
        reset_at: DateTime<Utc>,
    },
    SpeedChanged {
        speed: f64,
        changed_at: DateTime<Utc>,
    },
    StepFired {
        scenario: String,
        index: usize,
        kind: String,
        step_time: u64,
        virtual_time: f64,
    },
    PlaybackCompleted {
        scenario: String,
        fired_steps: usize,
        completed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PatchEvent {
    PatchApplied {
        patch_id: String,
        patch_name: String,
        origin: PatchOrigin,
        diff_count: usize,
        applied_at: DateTime<Utc>,
    },
    PatchReverted {
        patch_id: String,
        patch_name: String,
        origin: PatchOrigin,
        reverted_at: DateTime<Utc>,
    },
}

/// Events surfaced by the remote sync channel that have no direct store effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    Connected {
        studio_url: String,
        connected_at: DateTime<Utc>,
    },
    Disconnected {
        reason: String,
        disconnected_at: DateTime<Utc>,
    },
    SpecUpdated {
        agents: Vec<serde_json::Value>,
        received_at: DateTime<Utc>,
    },
    ScenarioReceived {
        scenario: Scenario,
        received_at: DateTime<Utc>,
    },
    SyncCompleted {
        synced_at: DateTime<Utc>,
    },
}
