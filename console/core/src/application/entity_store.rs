// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Entity Store - canonical mutable state of the console
//!
//! Holds the live agent table, the bounded message log and the bounded log
//! stream. Every mutation goes through one of the methods here and is announced
//! to registered [`StoreObserver`]s as a typed [`StoreChange`].
//!
//! The store has no notion of time or scenarios. Playback, the patch engine and
//! the agent executor all coordinate through it.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Local, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::domain::agent::{Agent, AgentStatePatch, AgentStatus};
use crate::domain::catalog::Catalog;
use crate::domain::console_config::StoreConfig;
use crate::domain::events::StoreChange;
use crate::domain::message::{LogEntry, Message, MessageId, NewLogEntry, NewMessage};

/// Receives every store mutation, synchronously, while the store is locked.
///
/// Implementations must not call back into the store.
pub trait StoreObserver: Send + Sync {
    fn on_change(&self, change: &StoreChange);
}

/// The store as shared between engines. Never hold the guard across an `.await`.
pub type SharedEntityStore = Arc<Mutex<EntityStore>>;

/// One agent whose live definition no longer matches the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDrift {
    pub agent: String,
    pub fields: Vec<&'static str>,
}

pub struct EntityStore {
    catalog: Arc<Catalog>,
    agents: Vec<Agent>,
    messages: VecDeque<Message>,
    logs: VecDeque<LogEntry>,
    next_message_id: u64,
    max_messages: usize,
    max_logs: usize,
    observers: Vec<Arc<dyn StoreObserver>>,
}

impl EntityStore {
    pub fn new(catalog: Arc<Catalog>, limits: &StoreConfig) -> Self {
        let agents = catalog.agents().to_vec();
        Self {
            catalog,
            agents,
            messages: VecDeque::new(),
            logs: VecDeque::new(),
            next_message_id: 1,
            max_messages: limits.max_messages.max(1),
            max_logs: limits.max_logs.max(1),
            observers: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedEntityStore {
        Arc::new(Mutex::new(self))
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Replace the live agent table with a fresh copy of the catalog.
    pub fn reset_agents(&mut self) {
        self.agents = self.catalog.agents().to_vec();
        debug!(agent_count = self.agents.len(), "Agent table reset from catalog");
        self.notify(StoreChange::AgentsReset {
            agent_count: self.agents.len(),
            reset_at: Utc::now(),
        });
    }

    /// Merge `patch` into the named agent's state. Unknown names are a silent no-op.
    ///
    /// Returns whether an agent was updated.
    pub fn update_agent_state(&mut self, name: &str, patch: &AgentStatePatch) -> bool {
        let Some(agent) = self.agents.iter_mut().find(|a| a.name() == name) else {
            debug!(agent = name, "State update for unknown agent ignored");
            return false;
        };
        agent.apply_state(patch);

        let change = StoreChange::AgentUpdated {
            agent_name: agent.spec.name.clone(),
            status: agent.state.status,
            current_task: agent.state.current_task.clone(),
            updated_at: agent.state.last_activity,
        };
        self.notify(change);
        true
    }

    pub fn append_message(&mut self, message: NewMessage) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;

        let message = Message {
            id,
            from: message.from,
            to: message.to,
            timestamp: Utc::now(),
            message_type: message.message_type,
            priority: message.priority,
            content: message.content,
        };
        self.messages.push_back(message.clone());
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }

        self.notify(StoreChange::MessageAppended(message));
        id
    }

    pub fn append_log(&mut self, entry: NewLogEntry) {
        let entry = LogEntry {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            level: entry.level,
            source: entry.source,
            message: entry.message,
        };
        self.logs.push_back(entry.clone());
        while self.logs.len() > self.max_logs {
            self.logs.pop_front();
        }

        self.notify(StoreChange::LogAppended(entry));
    }

    /// Drop all messages and restart id assignment at `msg-1`.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.next_message_id = 1;
        self.notify(StoreChange::MessagesCleared {
            cleared_at: Utc::now(),
        });
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.notify(StoreChange::LogsCleared {
            cleared_at: Utc::now(),
        });
    }

    /// Agents from the catalog, empty message log, empty log stream.
    pub fn reset_baseline(&mut self) {
        self.reset_agents();
        self.clear_messages();
        self.clear_logs();
    }

    pub fn get_agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn active_agents(&self) -> Vec<&Agent> {
        self.agents
            .iter()
            .filter(|a| a.status() == AgentStatus::Active)
            .collect()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The last `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<&Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).collect()
    }

    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn recent_logs(&self, n: usize) -> Vec<&LogEntry> {
        let skip = self.logs.len().saturating_sub(n);
        self.logs.iter().skip(skip).collect()
    }

    /// Per-agent differences between the live table and the catalog.
    ///
    /// `lastActivity` is ignored. Empty right after [`reset_agents`](Self::reset_agents).
    pub fn catalog_drift(&self) -> Vec<AgentDrift> {
        let mut drift = Vec::new();
        for original in self.catalog.agents() {
            let Some(live) = self.get_agent(original.name()) else {
                drift.push(AgentDrift {
                    agent: original.name().to_string(),
                    fields: vec!["missing"],
                });
                continue;
            };

            let mut fields = Vec::new();
            if live.spec != original.spec {
                fields.push("spec");
            }
            if live.state.status != original.state.status {
                fields.push("status");
            }
            if live.state.current_task != original.state.current_task {
                fields.push("currentTask");
            }
            if live.state.progress != original.state.progress {
                fields.push("progress");
            }
            if live.state.metrics != original.state.metrics {
                fields.push("metrics");
            }
            if !fields.is_empty() {
                drift.push(AgentDrift {
                    agent: original.name().to_string(),
                    fields,
                });
            }
        }
        drift
    }

    fn notify(&self, change: StoreChange) {
        for observer in &self.observers {
            observer.on_change(&change);
        }
    }
}
