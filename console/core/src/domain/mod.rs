// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entity and value types for the console: agents, messages, logs, scenarios,
//! spec diffs and the contracts boundary adapters implement.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure data and traits, no I/O beyond file loading helpers

pub mod agent;
pub mod message;
pub mod scenario;
pub mod spec_diff;
pub mod events;
pub mod catalog;
pub mod console_config;
pub mod credential;
pub mod llm;
pub mod sync;
