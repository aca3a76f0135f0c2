// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Console Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Store changes, playback transitions, patch applications and sync traffic
// all flow through here to the CLI renderer and the remote sync forwarder.

use crate::application::entity_store::StoreObserver;
use crate::domain::events::{PatchEvent, PlaybackEvent, StoreChange, SyncEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Store(StoreChange),
    Playback(PlaybackEvent),
    Patch(PatchEvent),
    Sync(SyncEvent),
}

/// Event bus for publishing and subscribing to console events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_store_change(&self, change: StoreChange) {
        self.publish(DomainEvent::Store(change));
    }

    pub fn publish_playback_event(&self, event: PlaybackEvent) {
        self.publish(DomainEvent::Playback(event));
    }

    pub fn publish_patch_event(&self, event: PatchEvent) {
        self.publish(DomainEvent::Patch(event));
    }

    pub fn publish_sync_event(&self, event: SyncEvent) {
        self.publish(DomainEvent::Sync(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to store changes concerning one agent: its state updates and
    /// messages it sent or received
    pub fn subscribe_agent(&self, agent_name: impl Into<String>) -> AgentEventReceiver {
        AgentEventReceiver {
            receiver: self.sender.subscribe(),
            agent_name: agent_name.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl StoreObserver for EventBus {
    fn on_change(&self, change: &StoreChange) {
        self.publish_store_change(change.clone());
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for one agent's store changes (filtered)
pub struct AgentEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    agent_name: String,
}

impl AgentEventReceiver {
    pub async fn recv(&mut self) -> Result<StoreChange, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Store(change) = event {
                if self.matches_agent(&change) {
                    return Ok(change);
                }
            }
        }
    }

    fn matches_agent(&self, change: &StoreChange) -> bool {
        match change {
            StoreChange::AgentUpdated { agent_name, .. } => agent_name == &self.agent_name,
            StoreChange::MessageAppended(message) => {
                message.from == self.agent_name || message.to == self.agent_name
            }
            StoreChange::AgentsReset { .. }
            | StoreChange::LogAppended(_)
            | StoreChange::MessagesCleared { .. }
            | StoreChange::LogsCleared { .. } => false,
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
