// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Generation client contract (anti-corruption layer).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Isolates agent execution from the vendor generation API.
//!   Implementations live in `infrastructure/llm/`.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Domain interface for a text generation endpoint
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a complete response for the given conversation
    async fn generate(
        &self,
        turns: &[ChatTurn],
        config: &AgentConfig,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError>;

    /// Generate a response as a stream of text chunks
    async fn generate_stream(
        &self,
        turns: &[ChatTurn],
        config: &AgentConfig,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, GenerationError>;

    /// List models usable for generation
    async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerationError>;
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One role-tagged turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub system_prompt: String,

    /// Sampling temperature (0.0 = deterministic)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Errors surfaced by a generation client
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("API key is not set; store one with `aether vault set-key`")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("The model returned no candidates")]
    EmptyResponse,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }
}
