// SPDX-License-Identifier: MIT

//! Dry-run simulation of candidate paths against a local LLM
//!
//! Two calls per candidate: a relevance judgment and a validation pass.
//! Malformed responses degrade to deterministic fallback judgments via
//! [super::schema]; transport failures are raised so the queue layer can
//! retry or fall back, never silently swallowed.

use super::candidate::PathCandidate;
use super::schema::{parse_evaluation, parse_validation};
use crate::runtime::error::WaypointError;
use crate::runtime::model::{CompletionRequest, LlmClient, LlmUsage};
use crate::waypoint::config::LlmSettings;
use std::sync::Arc;
use std::time::Duration;

/// Runs the two-stage dry-run protocol for each candidate
pub struct SmartPathEvaluator {
    client: Arc<dyn LlmClient>,
    settings: LlmSettings,
}

impl SmartPathEvaluator {
    pub fn new(client: Arc<dyn LlmClient>, settings: LlmSettings) -> Self {
        Self { client, settings }
    }

    /// Enrich candidates with LLM judgments; returns the usage incurred
    ///
    /// Every candidate ends up with an evaluation and a validation, real
    /// or fallback. Only transport errors abort the pass.
    pub async fn simulate_candidates(
        &self,
        candidates: &mut [PathCandidate],
        question: &str,
    ) -> Result<LlmUsage, WaypointError> {
        let mut usage = LlmUsage::default();

        for candidate in candidates.iter_mut() {
            let response = self
                .complete(&self.evaluation_prompt(candidate, question))
                .await?;
            usage.record(&response);
            let evaluation = parse_evaluation(&response.text);

            let response = self
                .complete(&self.validation_prompt(candidate, question, &evaluation.reasoning))
                .await?;
            usage.record(&response);
            let validation = parse_validation(&response.text);

            candidate.confidence = evaluation.confidence;
            candidate.llm_evaluation = Some(evaluation);
            candidate.validation = Some(validation);
        }

        log::debug!(
            "dry-run evaluated {} candidate(s) in {} call(s)",
            candidates.len(),
            usage.calls
        );
        Ok(usage)
    }

    async fn complete(
        &self,
        prompt: &str,
    ) -> Result<crate::runtime::model::CompletionResponse, WaypointError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            prompt: prompt.to_string(),
            temperature: self.settings.temperature,
            timeout: Duration::from_millis(self.settings.timeout_ms),
        };
        Ok(self.client.complete(&request).await?)
    }

    fn evaluation_prompt(&self, candidate: &PathCandidate, question: &str) -> String {
        format!(
            "You are a routing evaluator for an agent workflow.\n\
             Question: {question}\n\
             Candidate path ({} hop(s)): {}\n\n\
             Judge how well executing this path would answer the question.\n\
             Respond with a JSON object only:\n\
             {{\"relevance_score\": <0.0-1.0>, \"confidence\": <0.0-1.0>, \
             \"reasoning\": \"<one sentence>\", \"complexity\": \"low|medium|high\", \
             \"risk_factors\": [\"<risk>\", ...]}}",
            candidate.path.len(),
            candidate.preview
        )
    }

    fn validation_prompt(&self, candidate: &PathCandidate, question: &str, reasoning: &str) -> String {
        format!(
            "You are validating a routing judgment for an agent workflow.\n\
             Question: {question}\n\
             Candidate path: {}\n\
             Prior judgment: {reasoning}\n\n\
             Assess the path's efficiency and risk.\n\
             Respond with a JSON object only:\n\
             {{\"is_valid\": <true|false>, \"efficiency_score\": <0.0-1.0>, \
             \"confidence\": <0.0-1.0>, \"risk_assessment\": \"<one sentence>\"}}",
            candidate.preview
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::TransportError;
    use crate::runtime::model::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns canned responses in order; errors once exhausted
    struct ScriptedClient {
        responses: Vec<Result<String, ()>>,
        index: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, ()>>) -> Self {
            Self {
                responses,
                index: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, TransportError> {
            let idx = self.index.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(idx) {
                Some(Ok(text)) => Ok(CompletionResponse {
                    text: text.clone(),
                    total_tokens: Some(50),
                    latency_ms: 10,
                }),
                Some(Err(())) => Err(TransportError::Timeout {
                    provider: "scripted".to_string(),
                    elapsed_ms: 30_000,
                }),
                None => Ok(CompletionResponse {
                    text: "{}".to_string(),
                    total_tokens: None,
                    latency_ms: 1,
                }),
            }
        }
    }

    fn settings() -> LlmSettings {
        LlmSettings {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            temperature: 0.1,
            timeout_ms: 30_000,
        }
    }

    fn candidate(id: &str) -> PathCandidate {
        PathCandidate::new(id, vec![id.to_string()], format!("{id}: do the work"))
    }

    #[tokio::test]
    async fn test_simulate_enriches_candidates() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(r#"{"relevance_score": 0.8, "confidence": 0.9, "reasoning": "good fit"}"#.to_string()),
            Ok(r#"{"is_valid": true, "efficiency_score": 0.7}"#.to_string()),
        ]));
        let evaluator = SmartPathEvaluator::new(client, settings());

        let mut candidates = vec![candidate("search")];
        let usage = evaluator
            .simulate_candidates(&mut candidates, "find the docs")
            .await
            .unwrap();

        let eval = candidates[0].llm_evaluation.as_ref().unwrap();
        assert!((eval.relevance_score - 0.8).abs() < f64::EPSILON);
        assert!((candidates[0].confidence - 0.9).abs() < f64::EPSILON);
        let validation = candidates[0].validation.as_ref().unwrap();
        assert!(validation.is_valid);
        assert_eq!(usage.calls, 2);
        assert_eq!(usage.tokens, 100);
    }

    #[tokio::test]
    async fn test_malformed_response_yields_fallback_not_error() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("I'd rather chat about the weather".to_string()),
            Ok("also not json".to_string()),
        ]));
        let evaluator = SmartPathEvaluator::new(client, settings());

        let mut candidates = vec![candidate("search")];
        evaluator
            .simulate_candidates(&mut candidates, "find the docs")
            .await
            .unwrap();

        let eval = candidates[0].llm_evaluation.as_ref().unwrap();
        assert!(eval.is_fallback());
        assert!((eval.confidence - 0.3).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = Arc::new(ScriptedClient::new(vec![Err(())]));
        let evaluator = SmartPathEvaluator::new(client, settings());

        let mut candidates = vec![candidate("search")];
        let err = evaluator
            .simulate_candidates(&mut candidates, "find the docs")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert!(candidates[0].llm_evaluation.is_none());
    }

    #[tokio::test]
    async fn test_single_quoted_response_is_repaired() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("{'relevance_score': 0.6, 'confidence': 0.5, 'reasoning': 'ok'}".to_string()),
            Ok("{'is_valid': True}".to_string()),
        ]));
        let evaluator = SmartPathEvaluator::new(client, settings());

        let mut candidates = vec![candidate("search")];
        evaluator
            .simulate_candidates(&mut candidates, "find the docs")
            .await
            .unwrap();

        let eval = candidates[0].llm_evaluation.as_ref().unwrap();
        assert!(!eval.is_fallback());
        assert!((eval.relevance_score - 0.6).abs() < f64::EPSILON);
        assert!(candidates[0].validation.as_ref().unwrap().is_valid);
    }
}
