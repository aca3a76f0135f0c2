// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Proposal Service - fan-out/fan-in over the specialist agents
//!
//! Gathering runs every specialist concurrently with a reduced token budget.
//! Synthesis then streams one integrated answer from the synthesizer, built from
//! the specialists that completed.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::agent_executor::{AgentExecutor, ExecutorError};
use crate::application::entity_store::SharedEntityStore;
use crate::domain::llm::GenerationError;
use crate::domain::message::NewLogEntry;

pub const SPECIALISTS: [&str; 4] = ["analyzer", "predictor", "monitor", "planner"];
pub const SYNTHESIZER: &str = "synthesizer";

const GATHER_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalPhase {
    Idle,
    Gathering,
    Synthesizing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentOutcome {
    Completed { response: String },
    Error { message: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub display_name: String,
    pub outcome: AgentOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalReport {
    pub phase: ProposalPhase,
    pub agent_results: Vec<AgentResult>,
    /// `None` when no specialist completed, the synthesizer is absent, or it failed.
    pub final_proposal: Option<String>,
    pub synthesis_error: Option<String>,
}

impl ProposalReport {
    pub fn completed(&self) -> impl Iterator<Item = (&AgentResult, &str)> {
        self.agent_results.iter().filter_map(|r| match &r.outcome {
            AgentOutcome::Completed { response } => Some((r, response.as_str())),
            _ => None,
        })
    }
}

pub struct ProposalService {
    executor: Arc<AgentExecutor>,
    store: SharedEntityStore,
}

impl ProposalService {
    pub fn new(executor: Arc<AgentExecutor>, store: SharedEntityStore) -> Self {
        Self { executor, store }
    }

    /// Run gathering then synthesis for `input`.
    ///
    /// `on_phase` observes phase transitions; `on_chunk` receives synthesis text
    /// as it streams. Only a missing API key fails the whole run.
    pub async fn run<P, C>(
        &self,
        input: &str,
        cancel: &CancellationToken,
        mut on_phase: P,
        on_chunk: C,
    ) -> Result<ProposalReport, ExecutorError>
    where
        P: FnMut(ProposalPhase) + Send,
        C: FnMut(&str) + Send,
    {
        if !self.executor.is_ready() {
            return Err(GenerationError::MissingApiKey.into());
        }

        let specialists: Vec<(String, String)> = {
            let store = self.store.lock();
            SPECIALISTS
                .iter()
                .filter_map(|name| store.get_agent(name))
                .map(|a| (a.name().to_string(), a.spec.display_name.clone()))
                .collect()
        };

        on_phase(ProposalPhase::Gathering);
        info!(agents = specialists.len(), "Proposal gathering started");

        let runs = specialists.iter().map(|(name, _)| {
            self.executor
                .execute_with_limit(name, input, GATHER_MAX_TOKENS, cancel)
        });
        let agent_results: Vec<AgentResult> = join_all(runs)
            .await
            .into_iter()
            .zip(specialists)
            .map(|(result, (agent_name, display_name))| AgentResult {
                agent_name,
                display_name,
                outcome: match result {
                    Ok(response) => AgentOutcome::Completed { response },
                    Err(e) if e.is_cancelled() => AgentOutcome::Cancelled,
                    Err(e) => AgentOutcome::Error {
                        message: e.to_string(),
                    },
                },
            })
            .collect();

        let mut report = ProposalReport {
            phase: ProposalPhase::Gathering,
            agent_results,
            final_proposal: None,
            synthesis_error: None,
        };

        let has_synthesizer = self.store.lock().get_agent(SYNTHESIZER).is_some();
        if cancel.is_cancelled() || !has_synthesizer || report.completed().next().is_none() {
            report.phase = ProposalPhase::Completed;
            on_phase(ProposalPhase::Completed);
            return Ok(report);
        }

        report.phase = ProposalPhase::Synthesizing;
        on_phase(ProposalPhase::Synthesizing);
        self.store.lock().append_log(NewLogEntry::info(
            "System",
            "Integrated analysis started",
        ));

        let prompt = synthesis_prompt(input, &report);
        match self
            .executor
            .execute_stream(SYNTHESIZER, &prompt, cancel, on_chunk)
            .await
        {
            Ok(text) => {
                self.store.lock().append_log(NewLogEntry::success(
                    "System",
                    "Integrated analysis complete",
                ));
                report.final_proposal = Some(text);
            }
            Err(e) => report.synthesis_error = Some(e.to_string()),
        }

        report.phase = ProposalPhase::Completed;
        on_phase(ProposalPhase::Completed);
        info!(
            completed = report.completed().count(),
            synthesized = report.final_proposal.is_some(),
            "Proposal finished"
        );
        Ok(report)
    }
}

fn synthesis_prompt(input: &str, report: &ProposalReport) -> String {
    let findings = report
        .completed()
        .map(|(result, response)| format!("### {}\n{}", result.display_name, response))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "## Request\n{input}\n\n\
         ## Specialist findings\n{findings}\n\n\
         Combine these findings into one proposal:\n\
         1. Key observations\n\
         2. Recommended actions, highest priority first\n\
         3. Risks and open disagreements\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::entity_store::EntityStore;
    use crate::domain::agent::AgentStatus;
    use crate::domain::catalog::Catalog;
    use crate::domain::console_config::StoreConfig;
    use crate::domain::credential::StaticApiKey;
    use crate::domain::llm::{AgentConfig, ChatTurn, ChunkStream, GenerationClient, ModelInfo};
    use async_trait::async_trait;

    /// Answers with the first line of the system prompt; fails for the monitor.
    struct EchoClient;

    fn reply_for(config: &AgentConfig) -> Result<String, GenerationError> {
        if config.system_prompt.contains("\"Monitor\"") {
            return Err(GenerationError::Provider("monitor offline".to_string()));
        }
        Ok(config.system_prompt.lines().next().unwrap_or_default().to_string())
    }

    #[async_trait]
    impl GenerationClient for EchoClient {
        async fn generate(
            &self,
            _turns: &[ChatTurn],
            config: &AgentConfig,
            _model: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, GenerationError> {
            assert_eq!(config.max_tokens, Some(GATHER_MAX_TOKENS));
            reply_for(config)
        }

        async fn generate_stream(
            &self,
            turns: &[ChatTurn],
            config: &AgentConfig,
            _model: &str,
            _cancel: &CancellationToken,
        ) -> Result<ChunkStream, GenerationError> {
            let reply = reply_for(config)?;
            let echoed = turns[0].content.contains("### Analyzer");
            let chunks = vec![Ok(reply), Ok(format!(" saw-analyzer={}", echoed))];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerationError> {
            Ok(Vec::new())
        }
    }

    fn service(key: &str) -> (ProposalService, SharedEntityStore) {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let store = EntityStore::new(catalog, &StoreConfig::default()).into_shared();
        let executor = AgentExecutor::new(
            store.clone(),
            Arc::new(EchoClient),
            Arc::new(StaticApiKey(key.to_string())),
            "gemini-2.0-flash",
        );
        (ProposalService::new(Arc::new(executor), store.clone()), store)
    }

    #[tokio::test]
    async fn test_gathers_then_synthesizes() {
        let (service, store) = service("k");
        let mut phases = Vec::new();
        let mut streamed = String::new();

        let report = service
            .run(
                "plan the rollout",
                &CancellationToken::new(),
                |p| phases.push(p),
                |c| streamed.push_str(c),
            )
            .await
            .unwrap();

        assert_eq!(
            phases,
            vec![
                ProposalPhase::Gathering,
                ProposalPhase::Synthesizing,
                ProposalPhase::Completed
            ]
        );
        assert_eq!(report.agent_results.len(), 4);
        assert_eq!(report.completed().count(), 3);
        assert!(matches!(
            report.agent_results[2].outcome,
            AgentOutcome::Error { .. }
        ));

        let proposal = report.final_proposal.unwrap();
        assert_eq!(proposal, streamed);
        assert!(proposal.contains("Synthesizer"));
        assert!(proposal.ends_with("saw-analyzer=true"));

        let store = store.lock();
        assert_eq!(store.get_agent("monitor").unwrap().status(), AgentStatus::Error);
        assert_eq!(store.get_agent("synthesizer").unwrap().state.metrics.tasks_completed, 1);
        assert_eq!(store.recent_logs(1)[0].message, "Integrated analysis complete");
    }

    #[tokio::test]
    async fn test_missing_key_fails_up_front() {
        let (service, store) = service("");
        let result = service
            .run("x", &CancellationToken::new(), |_| {}, |_| {})
            .await;
        assert!(result.is_err());
        assert_eq!(store.lock().log_count(), 0);
    }

    #[tokio::test]
    async fn test_skips_synthesis_without_synthesizer() {
        let catalog = Catalog::builtin().unwrap();
        let agents = catalog
            .agents()
            .iter()
            .filter(|a| a.name() != SYNTHESIZER)
            .cloned()
            .collect();
        let catalog = Arc::new(Catalog::new(
            agents,
            catalog.scenarios().to_vec(),
            catalog.patches().to_vec(),
        ));
        let store = EntityStore::new(catalog, &StoreConfig::default()).into_shared();
        let executor = AgentExecutor::new(
            store.clone(),
            Arc::new(EchoClient),
            Arc::new(StaticApiKey("k".to_string())),
            "m",
        );
        let service = ProposalService::new(Arc::new(executor), store);

        let report = service
            .run("x", &CancellationToken::new(), |_| {}, |_| {})
            .await
            .unwrap();
        assert_eq!(report.phase, ProposalPhase::Completed);
        assert!(report.final_proposal.is_none());
        assert_eq!(report.completed().count(), 3);
    }
}
