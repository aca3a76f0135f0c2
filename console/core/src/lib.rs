// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Aether Console Core
//!
//! Multi-agent operations console: an entity store of agents, messages and logs,
//! a deterministic scenario playback engine, a reversible spec patch engine and
//! the boundary adapters (generation, credential vault, remote sync).
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library consumed by the `aether` CLI

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
