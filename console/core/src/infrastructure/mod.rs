// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod llm;
pub mod credential_vault;
pub mod sync_channel;

pub use credential_vault::CredentialVault;
pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use sync_channel::{ConnectionState, ConnectionStatus, SyncChannel, SyncError};
