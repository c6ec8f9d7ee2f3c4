//! Completion provider implementations.
//!
//! Concrete backends for the core [`CompletionProvider`] trait:
//! - **[`OpenAIChatProvider`]**: `POST {base_url}/v1/chat/completions` on any
//!   OpenAI-compatible endpoint, in complete or SSE streaming mode.
//! - **[`ExtractiveProvider`]**: answers by quoting the best-ranked context
//!   chunk. Needs no network and no key, so the whole pipeline can run
//!   offline.
//!
//! # Streaming wire format
//!
//! With `"stream": true` the endpoint answers with Server-Sent Events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"We "}}]}
//!
//! data: {"choices":[{"delta":{"content":"rent"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Lines may be split across network reads, so bytes are buffered until a
//! full line is available. Events without `delta.content` (role headers,
//! finish markers) are skipped.

use anyhow::bail;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use rental_rag_core::error::{RagError, Result};
use rental_rag_core::generate::{CompletionProvider, FragmentStream};
use rental_rag_core::prompt::Prompt;

use crate::config::LlmConfig;
use crate::embedding::status_error;

// ============ OpenAI-compatible chat ============

/// Chat completion provider for an OpenAI-compatible API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIChatProvider {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAIChatProvider {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }

    fn request_body(&self, prompt: &Prompt, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": prompt.messages(),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, prompt: &Prompt, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %self.model, stream, "requesting chat completion");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|e| RagError::upstream("openai", e.to_string()))?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_bad_request(&body_text, prompt.token_estimate()));
        }
        if !response.status().is_success() {
            return Err(status_error("openai", response).await);
        }
        Ok(response)
    }
}

/// A 400 carrying `context_length_exceeded` means the prompt was too large;
/// anything else is an upstream failure.
fn classify_bad_request(body_text: &str, prompt_tokens: usize) -> RagError {
    let code = serde_json::from_str::<serde_json::Value>(body_text)
        .ok()
        .and_then(|v| v["error"]["code"].as_str().map(str::to_string));
    if code.as_deref() == Some("context_length_exceeded") {
        RagError::ContextTooLarge {
            prompt_tokens,
            limit: 0,
        }
    } else {
        RagError::upstream("openai", format!("HTTP 400 Bad Request: {}", body_text))
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RagError::upstream("openai", "invalid response: missing message content"))
}

/// One parsed SSE `data:` line.
#[derive(Debug, PartialEq, Eq)]
enum SseData {
    Fragment(String),
    Done,
}

/// Parse one SSE line. Returns `None` for blank lines, comments, and
/// events carrying no text.
fn parse_sse_line(line: &str) -> Result<Option<SseData>> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(Some(SseData::Done));
    }
    let json: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| RagError::upstream("openai", format!("malformed stream event: {}", e)))?;
    if let Some(message) = json["error"]["message"].as_str() {
        return Err(RagError::upstream("openai", message.to_string()));
    }
    Ok(json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| SseData::Fragment(s.to_string())))
}

/// Remove and return every complete line held in `buffer`.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
    }
    lines
}

#[async_trait]
impl CompletionProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let response = self.send(prompt, false).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::upstream("openai", e.to_string()))?;
        parse_completion(&json)
    }

    async fn complete_stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let response = self.send(prompt, true).await?;
        Ok(Box::pin(sse_fragments(Box::pin(response.bytes_stream()))))
    }
}

/// Decode an SSE byte stream into completion fragments.
///
/// A last line that arrives without a trailing newline is still parsed
/// once the byte stream ends.
fn sse_fragments<S, B, E>(mut bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;
        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    yield Err(RagError::upstream("openai", e.to_string()));
                    return;
                }
                None if buffer.is_empty() => return,
                None => {
                    buffer.push(b'\n');
                    finished = true;
                }
            }
            for line in drain_lines(&mut buffer) {
                match parse_sse_line(&line) {
                    Ok(Some(SseData::Fragment(text))) => yield Ok(text),
                    Ok(Some(SseData::Done)) => return,
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            if finished {
                return;
            }
        }
    }
}

// ============ Extractive ============

/// Offline provider that quotes the top-ranked context chunk.
///
/// With no context it returns the prompt's insufficient-information
/// sentence, so it never invents an answer.
#[derive(Debug, Default, Clone)]
pub struct ExtractiveProvider;

impl ExtractiveProvider {
    pub fn new() -> Self {
        Self
    }

    fn answer(prompt: &Prompt) -> String {
        match prompt.context().first() {
            Some(top) => {
                let label = if top.title.trim().is_empty() {
                    top.source.as_str()
                } else {
                    top.title.trim()
                };
                format!("From {}: {}\n\nSource: {}", label, top.text, top.source)
            }
            None => prompt.insufficient_information().to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for ExtractiveProvider {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        Ok(Self::answer(prompt))
    }

    async fn complete_stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let words: Vec<Result<String>> = Self::answer(prompt)
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }
}

/// Create the [`CompletionProvider`] named in the configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIChatProvider`] |
/// | `"extractive"` | [`ExtractiveProvider`] |
pub fn create_llm(config: &LlmConfig) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChatProvider::new(config)?)),
        "extractive" => Ok(Arc::new(ExtractiveProvider::new())),
        other => bail!("Unknown llm provider: {}", other),
    }
}
