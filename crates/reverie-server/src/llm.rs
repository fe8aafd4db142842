//! LLM provider glue
//!
//! The runtime only needs two operations from a provider: a full completion
//! and a chunk stream. [`OllamaProvider`] talks to an Ollama-compatible HTTP
//! API with NDJSON streaming and bounded retry; [`ScriptedProvider`] is the
//! deterministic fallback used when no LLM is configured (and in tests).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use reverie_core::{LlmConfig, Persona};

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("llm request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm protocol error: {0}")]
    Protocol(String),
}

/// A chat reply source. Implementations stay in character for the persona
/// and respect the token budget as a soft output cap.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// One full reply.
    async fn complete(
        &self,
        persona: &Persona,
        message: &str,
        token_budget: u32,
    ) -> Result<String, ProviderError>;

    /// A streaming reply; chunks arrive on the returned channel in order.
    async fn stream(
        &self,
        persona: &Persona,
        message: &str,
        token_budget: u32,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError>;
}

/// Build the configured provider.
pub fn provider_from_config(config: &LlmConfig) -> Arc<dyn ChatProvider> {
    match config.provider.as_str() {
        "ollama" => Arc::new(OllamaProvider::new(config)),
        other => {
            if other != "scripted" {
                warn!("unknown llm provider '{other}', falling back to scripted");
            }
            Arc::new(ScriptedProvider)
        }
    }
}

fn build_prompt(persona: &Persona, message: &str) -> String {
    format!(
        "You are {name}, {description}. Stay in character and answer briefly.\nUser: {message}\n{name}:",
        name = persona.name,
        description = persona.description,
    )
}

// ============================================================================
// OLLAMA PROVIDER
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Ollama-compatible HTTP provider (`POST /api/generate`).
pub struct OllamaProvider {
    client: reqwest::Client,
    host: String,
    model: String,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
        }
    }

    fn request_body(&self, persona: &Persona, message: &str, budget: u32, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(persona, message),
            "stream": stream,
            "options": { "num_predict": budget },
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn complete(
        &self,
        persona: &Persona,
        message: &str,
        token_budget: u32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.host);
        let body = self.request_body(persona, message, token_budget, false);

        let mut attempt = 0;
        loop {
            let outcome = async {
                let response = self
                    .client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
                let chunk: GenerateChunk = response.json().await?;
                Ok::<_, ProviderError>(chunk.response)
            }
            .await;

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    let backoff = Duration::from_millis(500u64 << attempt);
                    warn!(attempt, "llm request failed, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn stream(
        &self,
        persona: &Persona,
        message: &str,
        token_budget: u32,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let url = format!("{}/api/generate", self.host);
        let body = self.request_body(persona, message, token_budget, true);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            'outer: while let Some(part) = bytes.next().await {
                let part = match part {
                    Ok(p) => p,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Http(e))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&part));
                // NDJSON: one generate chunk per line.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<GenerateChunk>(&line) {
                        Ok(chunk) => {
                            if !chunk.response.is_empty()
                                && tx.send(Ok(chunk.response)).await.is_err()
                            {
                                break 'outer;
                            }
                            if chunk.done {
                                break 'outer;
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::Protocol(format!(
                                    "bad stream line: {e}"
                                ))))
                                .await;
                            break 'outer;
                        }
                    }
                }
            }
            debug!("llm stream finished");
        });
        Ok(rx)
    }
}

// ============================================================================
// SCRIPTED PROVIDER
// ============================================================================

/// Deterministic in-character replies without any external service.
pub struct ScriptedProvider;

impl ScriptedProvider {
    fn reply(persona: &Persona, message: &str) -> String {
        let favorite = persona
            .topic_preferences
            .iter()
            .max_by_key(|(topic, interest)| (**interest, std::cmp::Reverse(topic.as_str())))
            .map(|(topic, _)| topic.replace('_', " "));
        let excerpt: String = message.chars().take(80).collect();
        match favorite {
            Some(topic) => format!(
                "{} considers your words. \"{}... is that so? Around here the talk is mostly of {}.\"",
                persona.name, excerpt, topic
            ),
            None => format!(
                "{} nods slowly. \"{}... I will remember that.\"",
                persona.name, excerpt
            ),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(
        &self,
        persona: &Persona,
        message: &str,
        _token_budget: u32,
    ) -> Result<String, ProviderError> {
        Ok(Self::reply(persona, message))
    }

    async fn stream(
        &self,
        persona: &Persona,
        message: &str,
        _token_budget: u32,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let reply = Self::reply(persona, message);
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let words: Vec<&str> = reply.split_inclusive(' ').collect();
            for word in words {
                if tx.send(Ok(word.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

// ============================================================================
// TESTS
// ============================================================================
