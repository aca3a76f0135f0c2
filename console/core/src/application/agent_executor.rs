// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Executor - runs a live agent against the generation client
//!
//! Builds a system prompt from the agent's current spec, drives the agent's
//! status through the entity store while the call is in flight and reconciles
//! the outcome afterwards:
//!
//! | outcome   | status  | current task | log     |
//! |-----------|---------|--------------|---------|
//! | success   | idle    | cleared      | success |
//! | cancelled | idle    | cleared      | warning |
//! | failure   | error   | "error"      | error   |
//!
//! The store lock is only taken for those synchronous updates, never across the
//! generation await.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::entity_store::SharedEntityStore;
use crate::domain::agent::{Agent, AgentStatePatch, AgentStatus};
use crate::domain::credential::ApiKeySource;
use crate::domain::llm::{AgentConfig, ChatTurn, GenerationClient, GenerationError};
use crate::domain::message::NewLogEntry;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl ExecutorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutorError::Generation(e) if e.is_cancelled())
    }
}

pub struct AgentExecutor {
    store: SharedEntityStore,
    client: Arc<dyn GenerationClient>,
    key_source: Arc<dyn ApiKeySource>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AgentExecutor {
    pub fn new(
        store: SharedEntityStore,
        client: Arc<dyn GenerationClient>,
        key_source: Arc<dyn ApiKeySource>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            client,
            key_source,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_generation_defaults(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether an API key is available for this session.
    pub fn is_ready(&self) -> bool {
        self.key_source.api_key().is_some()
    }

    pub async fn execute(
        &self,
        agent_name: &str,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError> {
        self.execute_with_limit(agent_name, input, self.max_tokens, cancel)
            .await
    }

    /// Same as [`execute`](Self::execute) with an explicit output token budget.
    pub async fn execute_with_limit(
        &self,
        agent_name: &str,
        input: &str,
        max_tokens: u32,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError> {
        let (agent, config) = self.begin(agent_name, input, max_tokens)?;
        let turns = [ChatTurn::user(input)];
        let result = self
            .client
            .generate(&turns, &config, &self.model, cancel)
            .await;
        self.finish(&agent, result)
    }

    /// Stream the response, handing each chunk to `on_chunk` as it arrives.
    /// Returns the full concatenated text.
    pub async fn execute_stream<F>(
        &self,
        agent_name: &str,
        input: &str,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<String, ExecutorError>
    where
        F: FnMut(&str) + Send,
    {
        let (agent, config) = self.begin(agent_name, input, self.max_tokens)?;
        let turns = [ChatTurn::user(input)];

        let result = async {
            let mut stream = self
                .client
                .generate_stream(&turns, &config, &self.model, cancel)
                .await?;
            let mut full = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                on_chunk(&chunk);
                full.push_str(&chunk);
            }
            Ok(full)
        }
        .await;

        self.finish(&agent, result)
    }

    fn begin(
        &self,
        agent_name: &str,
        input: &str,
        max_tokens: u32,
    ) -> Result<(Agent, AgentConfig), ExecutorError> {
        let agent = self
            .store
            .lock()
            .get_agent(agent_name)
            .cloned()
            .ok_or_else(|| ExecutorError::AgentNotFound(agent_name.to_string()))?;

        if !self.is_ready() {
            return Err(GenerationError::MissingApiKey.into());
        }

        let config = AgentConfig {
            system_prompt: build_system_prompt(&agent),
            temperature: Some(self.temperature),
            max_tokens: Some(max_tokens),
        };

        {
            let mut store = self.store.lock();
            store.update_agent_state(
                agent_name,
                &AgentStatePatch::status(AgentStatus::Active).with_task("Running..."),
            );
            store.append_log(NewLogEntry::info(
                &agent.spec.display_name,
                format!("Task started: {}", preview(input)),
            ));
        }
        info!(agent = agent_name, model = %self.model, "Agent execution started");

        Ok((agent, config))
    }

    fn finish(
        &self,
        agent: &Agent,
        result: Result<String, GenerationError>,
    ) -> Result<String, ExecutorError> {
        let name = agent.name();
        let source = agent.spec.display_name.as_str();
        let mut store = self.store.lock();

        match result {
            Ok(response) => {
                let mut metrics = store
                    .get_agent(name)
                    .map(|a| a.state.metrics.clone())
                    .unwrap_or_default();
                metrics.tasks_completed += 1;
                store.update_agent_state(
                    name,
                    &AgentStatePatch::status(AgentStatus::Idle)
                        .clear_task()
                        .with_metrics(metrics),
                );
                store.append_log(NewLogEntry::success(source, "Task complete"));
                info!(agent = name, chars = response.len(), "Agent execution completed");
                Ok(response)
            }
            Err(GenerationError::Cancelled) => {
                store.update_agent_state(
                    name,
                    &AgentStatePatch::status(AgentStatus::Idle).clear_task(),
                );
                store.append_log(NewLogEntry::warning(source, "Task cancelled"));
                info!(agent = name, "Agent execution cancelled");
                Err(GenerationError::Cancelled.into())
            }
            Err(e) => {
                store.update_agent_state(
                    name,
                    &AgentStatePatch::status(AgentStatus::Error).with_task("error"),
                );
                store.append_log(NewLogEntry::error(source, format!("Error: {}", e)));
                warn!(agent = name, "Agent execution failed: {}", e);
                Err(e.into())
            }
        }
    }
}

/// System prompt describing the agent's live spec.
pub fn build_system_prompt(agent: &Agent) -> String {
    let spec = &agent.spec;
    let bullets = |items: &[String]| {
        items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let peers = |names: &[String]| {
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    };

    format!(
        "# You are the AI agent \"{display}\"\n\n\
         ## Role\n{role}\n\n\
         ## Capabilities\n{capabilities}\n\n\
         ## Constraints\n{constraints}\n\n\
         ## Reachable agents\n\
         - Sends to: {send}\n\
         - Receives from: {receive}\n\n\
         ## Response format\n\
         - Answer concisely and stay within your role\n\
         - Be concrete about analyses and forecasts\n\
         - Say so explicitly when you are uncertain\n",
        display = spec.display_name,
        role = spec.role,
        capabilities = bullets(&spec.capabilities),
        constraints = bullets(&spec.constraints),
        send = peers(&spec.communication.can_send_to),
        receive = peers(&spec.communication.can_receive_from),
    )
}

fn preview(input: &str) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::entity_store::EntityStore;
    use crate::domain::catalog::Catalog;
    use crate::domain::console_config::StoreConfig;
    use crate::domain::credential::StaticApiKey;
    use crate::domain::llm::{ChunkStream, ModelInfo};
    use crate::domain::message::LogLevel;
    use async_trait::async_trait;

    /// Replies with a fixed outcome; streams it in two halves.
    struct ScriptedClient(Result<String, GenerationError>);

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(
            &self,
            _turns: &[ChatTurn],
            _config: &AgentConfig,
            _model: &str,
            cancel: &CancellationToken,
        ) -> Result<String, GenerationError> {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            self.0.clone()
        }

        async fn generate_stream(
            &self,
            _turns: &[ChatTurn],
            _config: &AgentConfig,
            _model: &str,
            _cancel: &CancellationToken,
        ) -> Result<ChunkStream, GenerationError> {
            let text = self.0.clone()?;
            let (a, b) = text.split_at(text.len() / 2);
            let chunks = vec![Ok(a.to_string()), Ok(b.to_string())];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerationError> {
            Ok(Vec::new())
        }
    }

    fn executor(reply: Result<String, GenerationError>, key: &str) -> (AgentExecutor, SharedEntityStore) {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let store = EntityStore::new(catalog, &StoreConfig::default()).into_shared();
        let executor = AgentExecutor::new(
            store.clone(),
            Arc::new(ScriptedClient(reply)),
            Arc::new(StaticApiKey(key.to_string())),
            "gemini-2.0-flash",
        );
        (executor, store)
    }

    #[tokio::test]
    async fn test_success_increments_tasks_completed() {
        let (executor, store) = executor(Ok("all good".to_string()), "k");
        let response = executor
            .execute("analyzer", "check cpu", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response, "all good");

        let store = store.lock();
        let analyzer = store.get_agent("analyzer").unwrap();
        assert_eq!(analyzer.status(), AgentStatus::Idle);
        assert_eq!(analyzer.state.current_task, None);
        assert_eq!(analyzer.state.metrics.tasks_completed, 43);
        assert_eq!(store.recent_logs(1)[0].level, LogLevel::Success);
    }

    #[tokio::test]
    async fn test_failure_sets_error_status() {
        let (executor, store) = executor(Err(GenerationError::Network("down".to_string())), "k");
        let err = executor
            .execute("monitor", "x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());

        let store = store.lock();
        let monitor = store.get_agent("monitor").unwrap();
        assert_eq!(monitor.status(), AgentStatus::Error);
        assert_eq!(monitor.state.current_task.as_deref(), Some("error"));
        assert_eq!(store.recent_logs(1)[0].message, "Error: Network error: down");
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_failure() {
        let (executor, store) = executor(Ok("unused".to_string()), "k");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor.execute("predictor", "x", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());

        let store = store.lock();
        assert_eq!(store.get_agent("predictor").unwrap().status(), AgentStatus::Idle);
        assert_eq!(store.recent_logs(1)[0].level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn test_missing_key_leaves_agent_untouched() {
        let (executor, store) = executor(Ok("unused".to_string()), "");
        let err = executor
            .execute("analyzer", "x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Generation(GenerationError::MissingApiKey)));
        assert!(store.lock().catalog_drift().is_empty());
    }

    #[tokio::test]
    async fn test_stream_forwards_chunks() {
        let (executor, _store) = executor(Ok("abcdef".to_string()), "k");
        let mut seen = Vec::new();
        let full = executor
            .execute_stream("analyzer", "x", &CancellationToken::new(), |c| {
                seen.push(c.to_string())
            })
            .await
            .unwrap();
        assert_eq!(full, "abcdef");
        assert_eq!(seen, vec!["abc", "def"]);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let (executor, _store) = executor(Ok(String::new()), "k");
        let err = executor
            .execute("ghost", "x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::AgentNotFound(_)));
    }

    #[test]
    fn test_system_prompt_mentions_spec() {
        let catalog = Catalog::builtin().unwrap();
        let prompt = build_system_prompt(catalog.agent("synthesizer").unwrap());
        assert!(prompt.contains("\"Synthesizer\""));
        assert!(prompt.contains("- Sends to: none"));
        assert!(prompt.contains("- synthesis"));
    }

    #[test]
    fn test_preview_truncates_long_input() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(60)), format!("{}...", "x".repeat(50)));
    }
}
