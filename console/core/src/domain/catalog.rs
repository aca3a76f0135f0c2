// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Built-in Catalog
//!
//! Read-only definitions the console boots from: the agent roster (with initial
//! state), demo scenarios and predefined patches. The YAML sources are embedded at
//! compile time so the binary is self-contained.
//!
//! The catalog is the reset baseline for the entity store. Nothing writes back to
//! it; the store always works on a deep copy.

use thiserror::Error;

use crate::domain::agent::Agent;
use crate::domain::scenario::{Scenario, ScenarioError};
use crate::domain::spec_diff::PredefinedPatch;

const AGENTS_YAML: &str = include_str!("../../catalog/agents.yaml");
const SCENARIOS_YAML: &str = include_str!("../../catalog/scenarios.yaml");
const PATCHES_YAML: &str = include_str!("../../catalog/patches.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse {section} catalog: {source}")]
    Parse {
        section: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("duplicate {section} entry '{key}'")]
    Duplicate { section: &'static str, key: String },

    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    agents: Vec<Agent>,
    scenarios: Vec<Scenario>,
    patches: Vec<PredefinedPatch>,
}

impl Catalog {
    /// Parse the embedded catalog.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml(AGENTS_YAML, SCENARIOS_YAML, PATCHES_YAML)
    }

    pub fn from_yaml(agents: &str, scenarios: &str, patches: &str) -> Result<Self, CatalogError> {
        let agents: Vec<Agent> = parse("agent", agents)?;
        let scenarios: Vec<Scenario> = parse("scenario", scenarios)?;
        let patches: Vec<PredefinedPatch> = parse("patch", patches)?;

        for scenario in &scenarios {
            scenario.validate()?;
        }

        ensure_unique("agent", agents.iter().map(|a| a.name()))?;
        ensure_unique("scenario", scenarios.iter().map(|s| s.name.as_str()))?;
        ensure_unique("patch", patches.iter().map(|p| p.id.as_str()))?;

        Ok(Self {
            agents,
            scenarios,
            patches,
        })
    }

    pub fn new(agents: Vec<Agent>, scenarios: Vec<Scenario>, patches: Vec<PredefinedPatch>) -> Self {
        Self {
            agents,
            scenarios,
            patches,
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn patches(&self) -> &[PredefinedPatch] {
        &self.patches
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn patch(&self, id: &str) -> Option<&PredefinedPatch> {
        self.patches.iter().find(|p| p.id == id)
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    section: &'static str,
    yaml: &str,
) -> Result<Vec<T>, CatalogError> {
    serde_yaml::from_str(yaml).map_err(|source| CatalogError::Parse { section, source })
}

fn ensure_unique<'a>(
    section: &'static str,
    keys: impl Iterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen = std::collections::HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(CatalogError::Duplicate {
                section,
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentStatus;
    use crate::domain::scenario::ScenarioStep;
    use crate::domain::spec_diff::SpecPath;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.agents().len(), 5);
        assert_eq!(catalog.patches().len(), 5);
        assert!(catalog.scenario("basic-analysis-flow").is_some());
    }

    #[test]
    fn test_planner_starts_offline() {
        let catalog = Catalog::builtin().unwrap();
        let planner = catalog.agent("planner").unwrap();
        assert_eq!(planner.status(), AgentStatus::Offline);
        assert_eq!(planner.state.metrics.tasks_completed, 12);
    }

    #[test]
    fn test_basic_flow_shape() {
        let catalog = Catalog::builtin().unwrap();
        let flow = catalog.scenario("basic-analysis-flow").unwrap();
        assert_eq!(flow.duration, 15000);
        assert!(flow.unreachable_steps().is_empty());

        let first_message = flow
            .steps
            .iter()
            .find(|s| matches!(s, ScenarioStep::SendMessage { .. }))
            .unwrap();
        assert_eq!(first_message.time(), 5000);
    }

    #[test]
    fn test_patch_003_targets_status() {
        let catalog = Catalog::builtin().unwrap();
        let patch = catalog.patch("patch-003").unwrap();
        assert_eq!(patch.diffs[0].spec_path(), SpecPath::Status);
        assert_eq!(patch.diffs[0].before_str(), Some("offline"));
        assert_eq!(patch.diffs[0].after_str(), Some("active"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let patches = r#"
- { id: p, name: a, diffs: [] }
- { id: p, name: b, diffs: [] }
"#;
        let err = Catalog::from_yaml("[]", "[]", patches).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { section: "patch", .. }));
    }
}
