// SPDX-License-Identifier: MIT

//! LM Studio client - OpenAI-compatible /v1/chat/completions endpoint

use super::{classify_reqwest_error, CompletionRequest, CompletionResponse, LlmClient};
use crate::runtime::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "http://localhost:1234";

/// Client for a local LM Studio runtime (or any OpenAI-compatible server)
pub struct LmStudioClient {
    client: Client,
    base_url: String,
}

impl LmStudioClient {
    /// Create a new LmStudioClient
    ///
    /// The endpoint argument wins over the `LMSTUDIO_BASE_URL` environment
    /// variable, which wins over the localhost default.
    pub fn new(endpoint: Option<&str>) -> Self {
        let base_url = endpoint
            .map(|s| s.to_string())
            .or_else(|| env::var("LMSTUDIO_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Parse an OpenAI-style chat completion response body
    fn parse_response(
        body: &serde_json::Value,
        latency_ms: u64,
    ) -> Result<CompletionResponse, TransportError> {
        let text = body["choices"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| TransportError::Connection {
                provider: "lmstudio".to_string(),
                message: "no choices in chat completion body".to_string(),
            })?
            .to_string();

        let total_tokens = body["usage"]["total_tokens"].as_u64();

        Ok(CompletionResponse {
            text,
            total_tokens,
            latency_ms,
        })
    }
}

#[async_trait]
impl LlmClient for LmStudioClient {
    fn provider(&self) -> &str {
        "lmstudio"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "stream": false
        });

        log::debug!("LM Studio request to {}: model={}", url, request.model);

        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error("lmstudio", request.timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                provider: "lmstudio".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| classify_reqwest_error("lmstudio", request.timeout, e))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Self::parse_response(&resp_json, latency_ms)
    }
}
