// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Patch Engine - reversible spec patches against the live agent table
//!
//! Applies and reverts [`PredefinedPatch`]es. The applied set is keyed by patch
//! id: re-applying an id is a no-op, and any applied id can be reverted, not just
//! the most recent one.
//!
//! Only `state.status` diffs mutate live agents. Capability, constraint and
//! communication diffs are recorded with the patch and announced as log entries;
//! the static spec on the agent is left untouched.
//!
//! Lock order: applied set, then the entity store.

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::application::entity_store::{EntityStore, SharedEntityStore};
use crate::domain::agent::{AgentStatePatch, AgentStatus};
use crate::domain::events::PatchEvent;
use crate::domain::message::NewLogEntry;
use crate::domain::spec_diff::{
    AppliedPatch, DiffOperation, PatchOrigin, PredefinedPatch, SpecDiff, SpecPath,
};
use crate::infrastructure::event_bus::EventBus;

const LOCAL_SOURCE: &str = "SpecKit";
const REMOTE_SOURCE: &str = "Studio";

pub struct PatchEngine {
    store: SharedEntityStore,
    event_bus: EventBus,
    applied: Mutex<Vec<AppliedPatch>>,
}

impl PatchEngine {
    pub fn new(store: SharedEntityStore, event_bus: EventBus) -> Self {
        Self {
            store,
            event_bus,
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Apply a catalog patch. Returns `false` if it was already applied.
    pub fn apply(&self, patch: &PredefinedPatch) -> bool {
        self.apply_with_origin(patch.clone(), PatchOrigin::Local)
    }

    /// Apply a patch received from the remote editor.
    pub fn apply_from_remote(&self, patch: PredefinedPatch) -> bool {
        self.apply_with_origin(patch, PatchOrigin::Remote)
    }

    /// Revert an applied patch by replaying each diff's `before` value.
    /// Returns `false` if the id is not applied.
    pub fn revert(&self, patch_id: &str) -> bool {
        let record = {
            let mut applied = self.applied.lock();
            let Some(position) = applied.iter().position(|a| a.patch.id == patch_id) else {
                debug!(patch_id, "Revert ignored: patch not applied");
                return false;
            };
            let record = applied.remove(position);

            let mut store = self.store.lock();
            for diff in &record.patch.diffs {
                revert_diff(diff, &mut store);
            }
            store.append_log(NewLogEntry::warning(
                LOCAL_SOURCE,
                format!("Patch reverted: {}", record.patch.name),
            ));
            record
        };

        info!(patch_id, origin = %record.origin, "Patch reverted");
        self.event_bus.publish_patch_event(PatchEvent::PatchReverted {
            patch_id: record.patch.id,
            patch_name: record.patch.name,
            origin: record.origin,
            reverted_at: Utc::now(),
        });
        true
    }

    pub fn is_applied(&self, patch_id: &str) -> bool {
        self.applied.lock().iter().any(|a| a.patch.id == patch_id)
    }

    /// Applied patches in application order.
    pub fn applied(&self) -> Vec<AppliedPatch> {
        self.applied.lock().clone()
    }

    pub fn applied_record(&self, patch_id: &str) -> Option<AppliedPatch> {
        self.applied
            .lock()
            .iter()
            .find(|a| a.patch.id == patch_id)
            .cloned()
    }

    /// Forget the applied set without reverting anything.
    pub fn clear(&self) {
        self.applied.lock().clear();
    }

    fn apply_with_origin(&self, patch: PredefinedPatch, origin: PatchOrigin) -> bool {
        let applied_at = Utc::now();
        {
            let mut applied = self.applied.lock();
            if applied.iter().any(|a| a.patch.id == patch.id) {
                debug!(patch_id = %patch.id, "Apply ignored: patch already applied");
                return false;
            }

            let mut store = self.store.lock();
            for diff in &patch.diffs {
                apply_diff(diff, &mut store);
            }
            let log = match origin {
                PatchOrigin::Local => {
                    NewLogEntry::success(LOCAL_SOURCE, format!("Patch applied: {}", patch.name))
                }
                PatchOrigin::Remote => NewLogEntry::success(
                    REMOTE_SOURCE,
                    format!("Patch received from Studio: {}", patch.name),
                ),
            };
            store.append_log(log);
            drop(store);

            applied.push(AppliedPatch {
                patch: patch.clone(),
                origin,
                applied_at,
            });
        }

        info!(patch_id = %patch.id, %origin, diffs = patch.diffs.len(), "Patch applied");
        self.event_bus.publish_patch_event(PatchEvent::PatchApplied {
            patch_id: patch.id,
            patch_name: patch.name,
            origin,
            diff_count: patch.diffs.len(),
            applied_at,
        });
        true
    }
}

fn apply_diff(diff: &SpecDiff, store: &mut EntityStore) {
    let agent = diff.agent_name.as_str();
    match (diff.spec_path(), diff.operation) {
        (SpecPath::Status, _) => set_status(agent, diff.after_str(), store),
        (SpecPath::Capabilities { .. }, DiffOperation::Add) => {
            store.append_log(NewLogEntry::info(
                agent,
                format!("New capability: {}", render(&diff.after)),
            ));
        }
        (path, DiffOperation::Modify) if path.is_under("constraints") => {
            store.append_log(NewLogEntry::info(
                agent,
                format!(
                    "Constraint updated: {} -> {}",
                    render(&diff.before),
                    render(&diff.after)
                ),
            ));
        }
        (path, DiffOperation::Add) if path.is_under("communication") => {
            store.append_log(NewLogEntry::info(
                agent,
                format!("Communication allowed: {}", render(&diff.after)),
            ));
        }
        (path, operation) => {
            debug!(agent, ?path, ?operation, "Diff recorded without live effect");
        }
    }
}

fn revert_diff(diff: &SpecDiff, store: &mut EntityStore) {
    if diff.spec_path() == SpecPath::Status {
        set_status(&diff.agent_name, diff.before_str(), store);
    }
}

fn set_status(agent: &str, value: Option<&str>, store: &mut EntityStore) {
    let Some(value) = value else {
        return;
    };
    match value.parse::<AgentStatus>() {
        Ok(status) => {
            store.update_agent_state(agent, &AgentStatePatch::status(status));
        }
        Err(e) => warn!(agent, "Ignoring status diff: {}", e),
    }
}

fn render(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}
