// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Remote sync wire protocol.
//!
//! JSON frames exchanged with the external spec editor over a WebSocket, tagged by
//! a SCREAMING_SNAKE_CASE `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::scenario::Scenario;
use crate::domain::spec_diff::{
    DiffOperation, Impact, PatchCategory, PredefinedPatch, SpecDiff,
};

/// Frames received from the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundSyncEvent {
    SpecUpdated {
        #[serde(default)]
        agents: Vec<serde_json::Value>,
    },
    PatchCreated {
        patch: RemotePatch,
    },
    ScenarioCreated {
        scenario: Scenario,
    },
    SyncResponse {
        #[serde(flatten)]
        payload: serde_json::Map<String, serde_json::Value>,
    },
}

impl InboundSyncEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            InboundSyncEvent::SpecUpdated { .. } => "SPEC_UPDATED",
            InboundSyncEvent::PatchCreated { .. } => "PATCH_CREATED",
            InboundSyncEvent::ScenarioCreated { .. } => "SCENARIO_CREATED",
            InboundSyncEvent::SyncResponse { .. } => "SYNC_RESPONSE",
        }
    }
}

/// Frames sent to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundSyncEvent {
    PatchApplied {
        patch: RemotePatch,
    },
    PatchReverted {
        #[serde(rename = "patchId")]
        patch_id: String,
    },
    SyncRequest,
}

/// A patch as the editor sees it: diffs carry their own ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePatch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub diffs: Vec<RemoteDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDiff {
    #[serde(default)]
    pub id: String,
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

impl RemotePatch {
    /// Convert an editor patch into a local patch record.
    pub fn into_predefined(self) -> PredefinedPatch {
        PredefinedPatch {
            id: self.id,
            name: self.name,
            description: self.description,
            icon: "🔄".to_string(),
            category: PatchCategory::Capability,
            diffs: self
                .diffs
                .into_iter()
                .map(|d| SpecDiff {
                    agent_name: d.agent_name,
                    operation: d.operation,
                    path: d.path,
                    before: d.before,
                    after: d.after,
                    description: d.description,
                    impact: d.impact,
                })
                .collect(),
        }
    }

    /// Build the `PATCH_APPLIED` payload for a local patch; diff ids are `<patch>-diff-<i>`.
    pub fn from_applied(patch: &PredefinedPatch, applied_at: DateTime<Utc>) -> Self {
        Self {
            id: patch.id.clone(),
            name: patch.name.clone(),
            description: patch.description.clone(),
            diffs: patch
                .diffs
                .iter()
                .enumerate()
                .map(|(i, d)| RemoteDiff {
                    id: format!("{}-diff-{}", patch.id, i),
                    agent_name: d.agent_name.clone(),
                    operation: d.operation,
                    path: d.path.clone(),
                    before: d.before.clone(),
                    after: d.after.clone(),
                    description: d.description.clone(),
                    impact: d.impact,
                })
                .collect(),
            created_at: None,
            applied_at: Some(applied_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_created_frame() {
        let frame = r#"{
            "type": "PATCH_CREATED",
            "patch": {
                "id": "remote-1",
                "name": "Planner online",
                "description": "",
                "diffs": [{
                    "id": "d1",
                    "agentName": "planner",
                    "operation": "modify",
                    "path": "state.status",
                    "before": "offline",
                    "after": "active",
                    "description": "",
                    "impact": "high"
                }]
            }
        }"#;
        let event: InboundSyncEvent = serde_json::from_str(frame).unwrap();
        assert_eq!(event.type_name(), "PATCH_CREATED");

        let InboundSyncEvent::PatchCreated { patch } = event else {
            panic!("expected PATCH_CREATED");
        };
        let local = patch.into_predefined();
        assert_eq!(local.id, "remote-1");
        assert_eq!(local.category, PatchCategory::Capability);
        assert_eq!(local.diffs[0].after_str(), Some("active"));
    }

    #[test]
    fn test_sync_response_keeps_payload() {
        let event: InboundSyncEvent =
            serde_json::from_str(r#"{"type":"SYNC_RESPONSE","agents":[],"patches":[]}"#).unwrap();
        match event {
            InboundSyncEvent::SyncResponse { payload } => assert!(payload.contains_key("patches")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_outbound_frames() {
        let json = serde_json::to_value(OutboundSyncEvent::SyncRequest).unwrap();
        assert_eq!(json, serde_json::json!({"type": "SYNC_REQUEST"}));

        let json = serde_json::to_value(OutboundSyncEvent::PatchReverted {
            patch_id: "patch-003".to_string(),
        })
        .unwrap();
        assert_eq!(json["patchId"], "patch-003");
        assert_eq!(json["type"], "PATCH_REVERTED");
    }

    #[test]
    fn test_applied_payload_numbers_diffs() {
        let patch = PredefinedPatch {
            id: "patch-004".to_string(),
            name: "link".to_string(),
            description: String::new(),
            icon: String::new(),
            category: PatchCategory::Communication,
            diffs: vec![
                SpecDiff {
                    agent_name: "predictor".to_string(),
                    operation: DiffOperation::Add,
                    path: "communication.canSendTo".to_string(),
                    before: None,
                    after: Some(serde_json::json!("analyzer")),
                    description: String::new(),
                    impact: Impact::Medium,
                };
                2
            ],
        };
        let remote = RemotePatch::from_applied(&patch, Utc::now());
        assert_eq!(remote.diffs[1].id, "patch-004-diff-1");
        assert!(remote.applied_at.is_some());
    }
}
