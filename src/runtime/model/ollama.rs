// SPDX-License-Identifier: MIT

//! Ollama client - native /api/generate completion endpoint

use super::{classify_reqwest_error, CompletionRequest, CompletionResponse, LlmClient};
use crate::runtime::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a local Ollama runtime
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a new OllamaClient
    ///
    /// The endpoint argument wins over the `OLLAMA_BASE_URL` environment
    /// variable, which wins over the localhost default.
    pub fn new(endpoint: Option<&str>) -> Self {
        let base_url = endpoint
            .map(|s| s.to_string())
            .or_else(|| env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Parse the non-streaming /api/generate response body
    fn parse_response(
        body: &serde_json::Value,
        latency_ms: u64,
    ) -> Result<CompletionResponse, TransportError> {
        let text = body["response"]
            .as_str()
            .ok_or_else(|| TransportError::Connection {
                provider: "ollama".to_string(),
                message: "missing 'response' field in completion body".to_string(),
            })?
            .to_string();

        // eval_count / prompt_eval_count are Ollama's token counters
        let total_tokens = match (
            body["prompt_eval_count"].as_u64(),
            body["eval_count"].as_u64(),
        ) {
            (Some(p), Some(e)) => Some(p + e),
            (None, Some(e)) => Some(e),
            _ => None,
        };

        Ok(CompletionResponse {
            text,
            total_tokens,
            latency_ms,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": request.temperature }
        });

        log::debug!("Ollama request to {}: model={}", url, request.model);

        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error("ollama", request.timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                provider: "ollama".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| classify_reqwest_error("ollama", request.timeout, e))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Self::parse_response(&resp_json, latency_ms)
    }
}
