// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Spec Diffs and Patches
//!
//! A [`SpecDiff`] is a single field-level change against one agent, addressed by a
//! dotted/bracketed locator (`capabilities`, `constraints[0]`,
//! `communication.canSendTo`, `state.status`). A [`PredefinedPatch`] groups an
//! ordered list of diffs under one id.
//!
//! Every diff is representable; only `state.status` is actuated against live
//! agents by the patch engine, the rest are recorded and logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOperation {
    Add,
    Remove,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchCategory {
    #[default]
    Capability,
    Constraint,
    Communication,
    Observability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDiff {
    pub agent_name: String,
    pub operation: DiffOperation,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    #[serde(default)]
    pub description: String,
    pub impact: Impact,
}

impl SpecDiff {
    pub fn spec_path(&self) -> SpecPath {
        SpecPath::parse(&self.path)
    }

    pub fn before_str(&self) -> Option<&str> {
        self.before.as_ref().and_then(|v| v.as_str())
    }

    pub fn after_str(&self) -> Option<&str> {
        self.after.as_ref().and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredefinedPatch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: PatchCategory,
    pub diffs: Vec<SpecDiff>,
}

/// Where an applied patch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOrigin {
    Local,
    Remote,
}

impl fmt::Display for PatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOrigin::Local => f.write_str("local"),
            PatchOrigin::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPatch {
    pub patch: PredefinedPatch,
    pub origin: PatchOrigin,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationField {
    CanSendTo,
    CanReceiveFrom,
}

/// Parsed form of a diff locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecPath {
    Status,
    Capabilities { index: Option<usize> },
    Constraints { index: Option<usize> },
    Communication(CommunicationField),
    /// Any locator this engine has no structural knowledge of, kept verbatim.
    Other(String),
}

impl SpecPath {
    pub fn parse(path: &str) -> Self {
        let (head, index) = split_index(path);
        match (head, index) {
            ("state.status", None) => SpecPath::Status,
            ("capabilities", index) => SpecPath::Capabilities { index },
            ("constraints", index) => SpecPath::Constraints { index },
            ("communication.canSendTo", None) => {
                SpecPath::Communication(CommunicationField::CanSendTo)
            }
            ("communication.canReceiveFrom", None) => {
                SpecPath::Communication(CommunicationField::CanReceiveFrom)
            }
            _ => SpecPath::Other(path.to_string()),
        }
    }

    /// Whether the locator sits under the top-level field `field`, including
    /// nested or unparsed forms such as `constraints.maxLatency`.
    pub fn is_under(&self, field: &str) -> bool {
        match self {
            SpecPath::Status => field == "state",
            SpecPath::Capabilities { .. } => field == "capabilities",
            SpecPath::Constraints { .. } => field == "constraints",
            SpecPath::Communication(_) => field == "communication",
            SpecPath::Other(path) => path.starts_with(field),
        }
    }
}

// "constraints[0]" -> ("constraints", Some(0)); malformed brackets keep the whole path.
fn split_index(path: &str) -> (&str, Option<usize>) {
    if let Some(open) = path.find('[') {
        if let Some(inner) = path[open + 1..].strip_suffix(']') {
            if let Ok(index) = inner.parse::<usize>() {
                return (&path[..open], Some(index));
            }
        }
    }
    (path, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_path_parsing() {
        assert_eq!(SpecPath::parse("state.status"), SpecPath::Status);
        assert_eq!(
            SpecPath::parse("capabilities"),
            SpecPath::Capabilities { index: None }
        );
        assert_eq!(
            SpecPath::parse("constraints[0]"),
            SpecPath::Constraints { index: Some(0) }
        );
        assert_eq!(
            SpecPath::parse("communication.canReceiveFrom"),
            SpecPath::Communication(CommunicationField::CanReceiveFrom)
        );
        assert_eq!(
            SpecPath::parse("observability.logLevel"),
            SpecPath::Other("observability.logLevel".to_string())
        );
        assert_eq!(
            SpecPath::parse("constraints[x]"),
            SpecPath::Other("constraints[x]".to_string())
        );
    }

    #[test]
    fn test_is_under_matches_field_prefix() {
        assert!(SpecPath::parse("constraints[0]").is_under("constraints"));
        assert!(SpecPath::parse("constraints.maxLatency").is_under("constraints"));
        assert!(SpecPath::parse("constraints[x]").is_under("constraints"));
        assert!(SpecPath::parse("communication.broadcast").is_under("communication"));
        assert!(!SpecPath::parse("capabilities").is_under("constraints"));
        assert!(!SpecPath::parse("observability.logLevel").is_under("communication"));
    }

    #[test]
    fn test_diff_wire_shape() {
        let diff: SpecDiff = serde_json::from_str(
            r#"{"agentName":"planner","operation":"modify","path":"state.status",
                "before":"offline","after":"active","description":"online","impact":"high"}"#,
        )
        .unwrap();
        assert_eq!(diff.spec_path(), SpecPath::Status);
        assert_eq!(diff.before_str(), Some("offline"));
        assert_eq!(diff.after_str(), Some("active"));
    }
}
