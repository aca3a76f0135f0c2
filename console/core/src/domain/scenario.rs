// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scenario Timelines
//!
//! A [`Scenario`] is an authored, time-indexed script replayed against the entity
//! store. Steps are identified by their position in `steps`, not by `time`: two
//! steps may share a time, and a later step may carry a smaller time than an
//! earlier one. Playback dispatches due steps in array order.
//!
//! Scenario files use the same tagged shape as the built-in catalog:
//!
//! ```yaml
//! name: basic-analysis-flow
//! description: Analyzer -> Predictor -> Monitor
//! duration: 15000
//! steps:
//!   - time: 1000
//!     action: set-state
//!     agent: analyzer
//!     state: { status: active, currentTask: waiting for input }
//!   - time: 5000
//!     action: send-message
//!     from: analyzer
//!     to: predictor
//!     message: { type: analysis-complete, content: { summary: done } }
//!   - time: 14000
//!     action: console-log
//!     source: System
//!     message: scenario complete
//! ```

use crate::domain::agent::AgentStatePatch;
use crate::domain::message::{LogLevel, MessageContent, MessagePriority};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Total virtual milliseconds.
    pub duration: u64,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ScenarioStep {
    SetState {
        time: u64,
        agent: String,
        state: AgentStatePatch,
    },
    SendMessage {
        time: u64,
        from: String,
        to: String,
        message: ScenarioMessage,
    },
    ConsoleLog {
        time: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<LogLevel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        message: String,
    },
}

impl ScenarioStep {
    /// Virtual-ms offset at which this step becomes due.
    pub fn time(&self) -> u64 {
        match self {
            ScenarioStep::SetState { time, .. }
            | ScenarioStep::SendMessage { time, .. }
            | ScenarioStep::ConsoleLog { time, .. } => *time,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioStep::SetState { .. } => "set-state",
            ScenarioStep::SendMessage { .. } => "send-message",
            ScenarioStep::ConsoleLog { .. } => "console-log",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<MessagePriority>,
    pub content: MessageContent,
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scenario YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid scenario JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scenario '{0}' has zero duration")]
    ZeroDuration(String),
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario file; `.json` is parsed as JSON, everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.duration == 0 {
            return Err(ScenarioError::ZeroDuration(self.name.clone()));
        }
        Ok(())
    }

    /// Indices of steps whose time lies past `duration`; they can never fire.
    pub fn unreachable_steps(&self) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.time() > self.duration)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Playback state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    Completed,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}
