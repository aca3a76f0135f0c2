// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inter-agent messages and console log entries.
//!
//! Both are append-only records owned by the entity store; callers hand in the
//! `New*` form and the store assigns identity and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned, monotonic message identifier. Renders as `msg-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessagePriority::Low => "low",
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
            MessagePriority::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Message body: a required summary plus arbitrary structured fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub summary: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessageContent {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub priority: MessagePriority,
    pub content: MessageContent,
}

/// A message before the store has assigned `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub from: String,
    pub to: String,
    pub message_type: String,
    pub priority: MessagePriority,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// A console log line. `timestamp` is already rendered (`HH:MM:SS`, local time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub source: Option<String>,
    pub message: String,
}

impl NewLogEntry {
    pub fn new(level: LogLevel, source: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn info(source: &str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, Some(source), message)
    }

    pub fn success(source: &str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, Some(source), message)
    }

    pub fn warning(source: &str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, Some(source), message)
    }

    pub fn error(source: &str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, Some(source), message)
    }
}
