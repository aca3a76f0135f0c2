// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! An [`Agent`] pairs a static, declarative [`AgentSpec`] (role, capabilities,
//! constraints, communication graph) with a mutable [`AgentState`] driven by
//! scenario playback, spec patches and generation callbacks.
//!
//! The wire shape is camelCase so catalog files and remote sync payloads can be
//! exchanged with the editor unchanged.
//!
//! ## Invariants
//!
//! - `name` is the identity and never changes.
//! - `state.last_activity` is stamped on every state mutation and is never read by
//!   business logic (audit only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Runtime status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Idle,
    Warning,
    Error,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Warning => "warning",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "idle" => Ok(AgentStatus::Idle),
            "warning" => Ok(AgentStatus::Warning),
            "error" => Ok(AgentStatus::Error),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(format!("unknown agent status '{}'", other)),
        }
    }
}

/// Who an agent may talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationSpec {
    #[serde(default)]
    pub can_send_to: Vec<String>,
    #[serde(default)]
    pub can_receive_from: Vec<String>,
}

/// Declarative agent definition, consumed when building generation prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub communication: CommunicationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub tasks_completed: u32,
    /// Rendered duration, e.g. "1.2s".
    pub average_response_time: String,
    pub error_rate: f64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            average_response_time: "0s".to_string(),
            error_rate: 0.0,
        }
    }
}

/// Mutable runtime state of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default = "Utc::now")]
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub metrics: AgentMetrics,
}

impl AgentState {
    /// Compare everything except the audit timestamp.
    pub fn same_as(&self, other: &AgentState) -> bool {
        self.status == other.status
            && self.current_task == other.current_task
            && self.progress == other.progress
            && self.metrics == other.metrics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub spec: AgentSpec,
    pub state: AgentState,
}

impl Agent {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn status(&self) -> AgentStatus {
        self.state.status
    }

    /// Merge a partial state into this agent and stamp `last_activity`.
    ///
    /// Absent fields are left untouched; `Some(None)` clears an optional field.
    pub fn apply_state(&mut self, patch: &AgentStatePatch) {
        if let Some(status) = patch.status {
            self.state.status = status;
        }
        if let Some(task) = &patch.current_task {
            self.state.current_task = task.clone();
        }
        if let Some(progress) = patch.progress {
            self.state.progress = progress.map(|p| p.clamp(0.0, 1.0));
        }
        if let Some(metrics) = &patch.metrics {
            self.state.metrics = metrics.clone();
        }
        self.state.last_activity = Utc::now();
    }
}

/// Partial agent state used by `set-state` steps, patches and executor callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub current_task: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub progress: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
}

impl AgentStatePatch {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(Some(task.into()));
        self
    }

    pub fn clear_task(mut self) -> Self {
        self.current_task = Some(None);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(Some(progress));
        self
    }

    pub fn clear_progress(mut self) -> Self {
        self.progress = Some(None);
        self
    }

    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

// A present key (even `null`) becomes `Some(..)`, an absent key stays `None` via `default`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_agent() -> Agent {
        Agent {
            spec: AgentSpec {
                name: "analyzer".to_string(),
                display_name: "Analyzer".to_string(),
                description: String::new(),
                icon: String::new(),
                role: "analyze".to_string(),
                capabilities: vec!["data-analysis".to_string()],
                constraints: vec![],
                communication: CommunicationSpec::default(),
            },
            state: AgentState {
                status: AgentStatus::Idle,
                current_task: None,
                progress: None,
                last_activity: Utc::now(),
                metrics: AgentMetrics::default(),
            },
        }
    }

    #[test]
    fn test_patch_absent_fields_are_untouched() {
        let mut agent = sample_agent();
        agent.apply_state(&AgentStatePatch::status(AgentStatus::Active).with_task("work"));
        agent.apply_state(&AgentStatePatch::default().with_progress(0.4));

        assert_eq!(agent.status(), AgentStatus::Active);
        assert_eq!(agent.state.current_task.as_deref(), Some("work"));
        assert_eq!(agent.state.progress, Some(0.4));
    }

    #[test]
    fn test_explicit_null_clears_optional_fields() {
        let mut agent = sample_agent();
        agent.apply_state(&AgentStatePatch::default().with_task("work").with_progress(1.0));

        let patch: AgentStatePatch =
            serde_json::from_str(r#"{"status":"idle","currentTask":null,"progress":null}"#).unwrap();
        assert_eq!(patch.current_task, Some(None));
        agent.apply_state(&patch);

        assert_eq!(agent.state.current_task, None);
        assert_eq!(agent.state.progress, None);
    }

    #[test]
    fn test_absent_key_deserializes_to_none() {
        let patch: AgentStatePatch = serde_json::from_str(r#"{"progress":0.7}"#).unwrap();
        assert_eq!(patch.current_task, None);
        assert_eq!(patch.progress, Some(Some(0.7)));
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut agent = sample_agent();
        agent.apply_state(&AgentStatePatch::default().with_progress(1.7));
        assert_eq!(agent.state.progress, Some(1.0));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("offline".parse::<AgentStatus>().unwrap(), AgentStatus::Offline);
        assert!("sleeping".parse::<AgentStatus>().is_err());
        assert_eq!(AgentStatus::Warning.to_string(), "warning");
    }

    #[test]
    fn test_agent_wire_shape_is_flat_camel_case() {
        let json = serde_json::to_value(sample_agent()).unwrap();
        assert_eq!(json["displayName"], "Analyzer");
        assert_eq!(json["state"]["status"], "idle");
        assert_eq!(json["state"]["metrics"]["tasksCompleted"], 0);
    }
}
