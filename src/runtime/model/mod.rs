// SPDX-License-Identifier: MIT

//! Model module - LLM client trait and local-runtime implementations
//!
//! This module provides the core LlmClient trait and shared types.
//! Client implementations are in their own submodules:
//! - [ollama] - Ollama's native completion API
//! - [lmstudio] - LM Studio's OpenAI-compatible chat API

pub mod lmstudio;
pub mod ollama;

use crate::runtime::error::{TransportError, WaypointError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Cost charged per 1000 tokens when a provider reports token counts
/// but no price. Matches the estimation constant used by budget filtering.
pub const COST_PER_1K_TOKENS: f64 = 0.002;

/// A single completion request to a local LLM runtime
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Completion output with the measurements the engine rolls up
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub total_tokens: Option<u64>,
    pub latency_ms: u64,
}

/// Accumulated LLM usage across one or more calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmUsage {
    pub calls: u64,
    pub tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl LlmUsage {
    /// Record one completed call into the rollup
    pub fn record(&mut self, response: &CompletionResponse) {
        self.calls += 1;
        let tokens = response.total_tokens.unwrap_or(0);
        self.tokens += tokens;
        self.cost_usd += tokens as f64 / 1000.0 * COST_PER_1K_TOKENS;
        self.latency_ms += response.latency_ms;
    }

    /// Merge another rollup into this one
    pub fn merge(&mut self, other: &LlmUsage) {
        self.calls += other.calls;
        self.tokens += other.tokens;
        self.cost_usd += other.cost_usd;
        self.latency_ms += other.latency_ms;
    }

    /// Mean latency per call, zero when no calls were made
    pub fn avg_latency_ms(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.latency_ms / self.calls
        }
    }
}

/// Core trait for local LLM runtime clients
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name used in error messages and usage rollups
    fn provider(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest)
        -> Result<CompletionResponse, TransportError>;
}

/// Build a client for the named provider
///
/// Providers are local runtimes; unknown names are a configuration error
/// rather than a fallback, so a typo never silently routes to the wrong
/// endpoint.
pub fn client_for_provider(
    provider: &str,
    endpoint: Option<&str>,
) -> Result<Arc<dyn LlmClient>, WaypointError> {
    match provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(ollama::OllamaClient::new(endpoint))),
        "lmstudio" | "lm-studio" | "openai-compatible" => {
            Ok(Arc::new(lmstudio::LmStudioClient::new(endpoint)))
        }
        other => Err(WaypointError::config(format!(
            "Unknown LLM provider: {}",
            other
        ))),
    }
}

/// Classify a reqwest failure into the transport taxonomy
pub(crate) fn classify_reqwest_error(
    provider: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            provider: provider.to_string(),
            elapsed_ms: timeout.as_millis() as u64,
        }
    } else {
        TransportError::Connection {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}
