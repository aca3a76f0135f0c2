// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console - composition root
//!
//! Wires the catalog, entity store, event bus, playback, patch engine, vault,
//! generation client, executor and sync channel from one [`ConsoleConfig`].
//! Front-ends hold a single `Console` and reach every engine through it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::agent_executor::AgentExecutor;
use crate::application::entity_store::{EntityStore, SharedEntityStore};
use crate::application::patch_engine::PatchEngine;
use crate::application::playback::{Playback, ScenarioPlayer};
use crate::application::proposal::ProposalService;
use crate::domain::catalog::Catalog;
use crate::domain::console_config::ConsoleConfig;
use crate::domain::llm::GenerationClient;
use crate::domain::scenario::Scenario;
use crate::infrastructure::credential_vault::CredentialVault;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::llm::GeminiClient;
use crate::infrastructure::sync_channel::{SyncChannel, SyncError};

pub struct Console {
    config: ConsoleConfig,
    catalog: Arc<Catalog>,
    store: SharedEntityStore,
    event_bus: EventBus,
    player: ScenarioPlayer,
    patches: Arc<PatchEngine>,
    vault: Arc<CredentialVault>,
    executor: Arc<AgentExecutor>,
    proposals: ProposalService,
    sync: SyncChannel,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Console {
    /// Build against the built-in catalog and the Gemini API.
    pub fn new(config: ConsoleConfig) -> anyhow::Result<Self> {
        let catalog = Arc::new(Catalog::builtin().context("Failed to load built-in catalog")?);
        let vault = Arc::new(CredentialVault::new(config.spec.vault.path.clone()));
        let client = Arc::new(GeminiClient::from_config(&config.spec.llm, vault.clone()));
        Ok(Self::from_parts(config, catalog, client, vault))
    }

    pub fn from_parts(
        config: ConsoleConfig,
        catalog: Arc<Catalog>,
        client: Arc<dyn GenerationClient>,
        vault: Arc<CredentialVault>,
    ) -> Self {
        let event_bus = EventBus::with_default_capacity();

        let mut store = EntityStore::new(catalog.clone(), &config.spec.store);
        store.add_observer(Arc::new(event_bus.clone()));
        let store = store.into_shared();

        let player = ScenarioPlayer::new(
            Playback::new(
                config.spec.playback.tick_interval_ms,
                config.spec.playback.default_speed,
            ),
            store.clone(),
            event_bus.clone(),
        );
        let patches = Arc::new(PatchEngine::new(store.clone(), event_bus.clone()));

        let llm = &config.spec.llm;
        let executor = Arc::new(
            AgentExecutor::new(store.clone(), client, vault.clone(), llm.model.clone())
                .with_generation_defaults(llm.temperature, llm.max_tokens),
        );
        let proposals = ProposalService::new(executor.clone(), store.clone());
        let sync = SyncChannel::new(
            &config.spec.sync,
            store.clone(),
            patches.clone(),
            event_bus.clone(),
        );

        info!(
            agents = catalog.agents().len(),
            scenarios = catalog.scenarios().len(),
            patches = catalog.patches().len(),
            "Console initialized"
        );

        Self {
            config,
            catalog,
            store,
            event_bus,
            player,
            patches,
            vault,
            executor,
            proposals,
            sync,
            forwarder: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &SharedEntityStore {
        &self.store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn player(&self) -> &ScenarioPlayer {
        &self.player
    }

    pub fn patches(&self) -> &PatchEngine {
        &self.patches
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn executor(&self) -> &AgentExecutor {
        &self.executor
    }

    pub fn proposals(&self) -> &ProposalService {
        &self.proposals
    }

    pub fn sync(&self) -> &SyncChannel {
        &self.sync
    }

    /// Look a scenario up by catalog name, falling back to a YAML/JSON file path.
    pub fn resolve_scenario(&self, name_or_path: &str) -> anyhow::Result<Scenario> {
        if let Some(scenario) = self.catalog.scenario(name_or_path) {
            return Ok(scenario.clone());
        }
        let path = Path::new(name_or_path);
        if path.is_file() {
            return Scenario::from_file(path)
                .with_context(|| format!("Failed to load scenario from {:?}", path));
        }
        bail!("Unknown scenario '{}'", name_or_path)
    }

    pub fn load_scenario(&self, name_or_path: &str) -> anyhow::Result<()> {
        let scenario = self.resolve_scenario(name_or_path)?;
        self.player.load(scenario);
        Ok(())
    }

    /// Apply a catalog patch by id. `Ok(false)` if it was already applied.
    pub fn apply_patch(&self, patch_id: &str) -> anyhow::Result<bool> {
        let Some(patch) = self.catalog.patch(patch_id) else {
            bail!("Unknown patch '{}'", patch_id);
        };
        Ok(self.patches.apply(patch))
    }

    pub fn revert_patch(&self, patch_id: &str) -> bool {
        self.patches.revert(patch_id)
    }

    /// Connect to Studio and start forwarding local patches.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect_studio(&self) -> Result<(), SyncError> {
        {
            let mut forwarder = self.forwarder.lock();
            if forwarder.as_ref().map(|h| h.is_finished()).unwrap_or(true) {
                *forwarder = Some(self.sync.spawn_forwarder());
            }
        }
        self.sync.connect().await
    }

    pub fn disconnect_studio(&self) {
        self.sync.disconnect();
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.sync.disconnect();
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
    }
}
