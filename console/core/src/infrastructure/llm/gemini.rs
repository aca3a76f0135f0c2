// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gemini Generation Client Adapter
//
// Anti-Corruption Layer for the Google Generative Language API
// (generateContent / streamGenerateContent / models).

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::console_config::LlmConfig;
use crate::domain::credential::ApiKeySource;
use crate::domain::llm::{
    AgentConfig, ChatTurn, ChunkStream, GenerationClient, GenerationError, ModelInfo, TurnRole,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    key_source: Arc<dyn ApiKeySource>,
    default_temperature: f32,
    default_max_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GeminiInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: Option<GeminiErrorDetail>,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    display_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiClient {
    pub fn new(endpoint: impl Into<String>, key_source: Arc<dyn ApiKeySource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            key_source,
            default_temperature: 0.7,
            default_max_tokens: 1024,
        }
    }

    pub fn from_config(config: &LlmConfig, key_source: Arc<dyn ApiKeySource>) -> Self {
        let mut client = Self::new(config.endpoint.clone(), key_source);
        client.default_temperature = config.temperature;
        client.default_max_tokens = config.max_tokens;
        client
    }

    fn api_key(&self) -> Result<String, GenerationError> {
        self.key_source.api_key().ok_or(GenerationError::MissingApiKey)
    }

    fn build_request(&self, turns: &[ChatTurn], config: &AgentConfig) -> GeminiRequest {
        let contents = turns
            .iter()
            .map(|turn| GeminiContent {
                role: match turn.role {
                    TurnRole::User => "user".to_string(),
                    TurnRole::Assistant => "model".to_string(),
                },
                parts: vec![GeminiPart {
                    text: turn.content.clone(),
                }],
            })
            .collect();

        let system_instruction = (!config.system_prompt.is_empty()).then(|| GeminiInstruction {
            parts: vec![GeminiPart {
                text: config.system_prompt.clone(),
            }],
        });

        GeminiRequest {
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: config.temperature.unwrap_or(self.default_temperature),
                max_output_tokens: config.max_tokens.unwrap_or(self.default_max_tokens),
            },
            system_instruction,
        }
    }

    async fn post(
        &self,
        url: String,
        api_key: &str,
        request: &GeminiRequest,
    ) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }

    async fn generate_inner(
        &self,
        turns: &[ChatTurn],
        config: &AgentConfig,
        model: &str,
    ) -> Result<String, GenerationError> {
        let api_key = self.api_key()?;
        let request = self.build_request(turns, config);
        let url = format!("{}/{}:generateContent", self.endpoint, model);

        debug!(model, turns = turns.len(), "Calling generateContent");
        let response = self.post(url, &api_key, &request).await?;
        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(format!("Failed to parse response: {}", e)))?;

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or(GenerationError::EmptyResponse)?;

        Ok(candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default())
    }
}

// The request URL is dropped so error text never carries endpoint details.
fn network_error(e: reqwest::Error) -> GenerationError {
    GenerationError::Network(e.without_url().to_string())
}

async fn api_error(response: reqwest::Response) -> GenerationError {
    let status = response.status().as_u16();
    let message = response
        .json::<GeminiErrorBody>()
        .await
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("API Error: {}", status));
    GenerationError::Api { status, message }
}

// Text of the first part of the first candidate in one SSE `data:` payload.
fn chunk_text(data: &str) -> Option<String> {
    let body: GeminiResponse = serde_json::from_str(data).ok()?;
    let text = body
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text;
    (!text.is_empty()).then_some(text)
}

fn sse_data(line: &[u8]) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let line = line.trim_end_matches('\r');
    line.strip_prefix("data: ").and_then(chunk_text)
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        turns: &[ChatTurn],
        config: &AgentConfig,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = self.generate_inner(turns, config, model) => result,
        }
    }

    async fn generate_stream(
        &self,
        turns: &[ChatTurn],
        config: &AgentConfig,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, GenerationError> {
        let api_key = self.api_key()?;
        let request = self.build_request(turns, config);
        let url = format!("{}/{}:streamGenerateContent?alt=sse", self.endpoint, model);

        debug!(model, turns = turns.len(), "Calling streamGenerateContent");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            response = self.post(url, &api_key, &request) => response?,
        };

        let cancel = cancel.clone();
        let stream = async_stream::try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = bytes.next() => Some(chunk),
                };
                let chunk = match next {
                    None => Err(GenerationError::Cancelled)?,
                    Some(None) => break,
                    Some(Some(chunk)) => chunk.map_err(network_error)?,
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(text) = sse_data(&line[..line.len() - 1]) {
                        yield text;
                    }
                }
            }

            if let Some(text) = sse_data(&buffer) {
                yield text;
            }
        };

        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerationError> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(&self.endpoint)
            .header(API_KEY_HEADER, &api_key)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let list: GeminiModelList = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(format!("Failed to parse model list: {}", e)))?;

        let mut models: Vec<ModelInfo> = list
            .models
            .into_iter()
            .filter(|m| {
                m.name.contains("gemini")
                    && m.supported_generation_methods.iter().any(|g| g == "generateContent")
            })
            .map(|m| {
                let id = m.name.trim_start_matches("models/").to_string();
                ModelInfo {
                    name: m.display_name.unwrap_or_else(|| id.clone()),
                    description: m.description.unwrap_or_default(),
                    id,
                }
            })
            .collect();

        // Flash models first, then newest id first
        models.sort_by(|a, b| {
            let a_flash = a.id.contains("flash");
            let b_flash = b.id.contains("flash");
            b_flash.cmp(&a_flash).then_with(|| b.id.cmp(&a.id))
        });

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credential::StaticApiKey;
    use mockito::Matcher;
    use serde_json::json;

    fn client(endpoint: String) -> GeminiClient {
        GeminiClient::new(endpoint, Arc::new(StaticApiKey("test-key".to_string())))
    }

    fn key_header() -> Matcher {
        Matcher::Exact("test-key".into())
    }

    #[tokio::test]
    async fn test_generate_sends_system_instruction() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gemini-2.0-flash:generateContent")
            .match_header(API_KEY_HEADER, key_header())
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"temperature": 0.7, "maxOutputTokens": 1024}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"hi "},{"text":"there"}]}}]}"#)
            .create_async()
            .await;

        let text = client(server.url())
            .generate(
                &[ChatTurn::user("hello")],
                &AgentConfig::new("be brief"),
                "gemini-2.0-flash",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(text, "hi there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gemini-2.0-flash:generateContent")
            .match_header(API_KEY_HEADER, key_header())
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/broken:generateContent")
            .match_header(API_KEY_HEADER, key_header())
            .with_status(503)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = client(server.url());
        let cancel = CancellationToken::new();
        let config = AgentConfig::new("");

        let err = client
            .generate(&[ChatTurn::user("x")], &config, "gemini-2.0-flash", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API key not valid");

        let err = client
            .generate(&[ChatTurn::user("x")], &config, "broken", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API Error: 503");
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gemini-2.0-flash:generateContent")
            .match_header(API_KEY_HEADER, key_header())
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .generate(
                &[ChatTurn::user("x")],
                &AgentConfig::new(""),
                "gemini-2.0-flash",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let client = GeminiClient::new(
            "http://127.0.0.1:9",
            Arc::new(StaticApiKey(String::new())),
        );
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_network_error_does_not_expose_api_key() {
        let client = GeminiClient::new(
            "http://127.0.0.1:9",
            Arc::new(StaticApiKey("SECRET-KEY-123".to_string())),
        );
        let cancel = CancellationToken::new();
        let config = AgentConfig::new("");

        let err = client
            .generate(&[ChatTurn::user("x")], &config, "m", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Network(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));

        let err = client
            .generate_stream(&[ChatTurn::user("x")], &config, "m", &cancel)
            .await
            .err()
            .unwrap();
        assert!(!err.to_string().contains("SECRET-KEY-123"));

        let err = client.list_models().await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client("http://127.0.0.1:9".to_string())
            .generate(&[ChatTurn::user("x")], &AgentConfig::new(""), "m", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_stream_parses_sse_lines() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            ": keep-alive\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\n\n",
            "data: not-json\n",
        );
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gemini-2.0-flash:streamGenerateContent")
            .match_header(API_KEY_HEADER, key_header())
            .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = client(server.url())
            .generate_stream(
                &[ChatTurn::user("x")],
                &AgentConfig::new(""),
                "gemini-2.0-flash",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_list_models_filters_and_sorts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_header(API_KEY_HEADER, key_header())
            .with_status(200)
            .with_body(
                json!({
                    "models": [
                        {"name": "models/gemini-1.5-pro", "displayName": "Gemini 1.5 Pro",
                         "supportedGenerationMethods": ["generateContent"]},
                        {"name": "models/gemini-1.5-flash",
                         "supportedGenerationMethods": ["generateContent", "countTokens"]},
                        {"name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash",
                         "supportedGenerationMethods": ["generateContent"]},
                        {"name": "models/text-embedding-004",
                         "supportedGenerationMethods": ["embedContent"]},
                        {"name": "models/gemini-embedding",
                         "supportedGenerationMethods": ["embedContent"]}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let models = client(format!("{}/", server.url())).list_models().await.unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"]);
        assert_eq!(models[1].name, "gemini-1.5-flash");
    }
}
