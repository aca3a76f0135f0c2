// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod entity_store;
pub mod playback;
pub mod patch_engine;
pub mod agent_executor;
pub mod proposal;
pub mod console;

// Re-export services for convenience
pub use agent_executor::{AgentExecutor, ExecutorError};
pub use console::Console;
pub use entity_store::{EntityStore, SharedEntityStore, StoreObserver};
pub use patch_engine::PatchEngine;
pub use playback::{Playback, PlaybackError, PlaybackSnapshot, ScenarioPlayer};
pub use proposal::{ProposalPhase, ProposalReport, ProposalService};
