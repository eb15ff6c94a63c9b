// SPDX-License-Identifier: MIT

//! Agent module - the runnable step contract
//!
//! Every workflow node kind that executes work implements [Agent]. The
//! engine matches on [AgentKind] at the queue boundary; kinds that need
//! engine-owned resources (scout, fork) are executed there directly.

use crate::runtime::error::WaypointError;
use crate::runtime::model::LlmUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Closed set of node kinds the queue processor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Renders a prompt and calls the configured LLM
    Prompt,
    /// Maps a value from previous outputs to a list of next agents
    Router,
    /// Runs its branches concurrently
    Fork,
    /// Merges branch outputs after a fork
    Join,
    /// Runs the GraphScout routing pipeline
    Scout,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Prompt => "prompt",
            AgentKind::Router => "router",
            AgentKind::Fork => "fork",
            AgentKind::Join => "join",
            AgentKind::Scout => "scout",
        }
    }
}

/// Execution context handed to each step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: String,
    pub step_index: u64,
    /// Original workflow input (the user question)
    pub input: String,
    /// Payloads of previously completed agents, keyed by agent id
    pub previous_outputs: HashMap<String, Value>,
}

/// Outcome of one agent step
///
/// `payload: None` is the soft-failure signal: the agent ran without
/// raising but produced nothing, and the queue retries it. A payload of
/// `{"status": "waiting"}` asks for re-enqueueing without spending a
/// retry slot.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub payload: Option<Value>,
    /// LLM usage incurred by this step, if any
    pub usage: Option<LlmUsage>,
}

impl StepResult {
    /// A completed step with a payload
    pub fn completed(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            usage: None,
        }
    }

    /// A completed step that also spent LLM budget
    pub fn with_usage(payload: Value, usage: LlmUsage) -> Self {
        Self {
            payload: Some(payload),
            usage: Some(usage),
        }
    }

    /// The soft-failure result: nothing produced, no error raised
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cooperative backpressure: re-enqueue me, my inputs are not ready
    pub fn waiting() -> Self {
        Self {
            payload: Some(json!({ "status": "waiting" })),
            usage: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.payload
            .as_ref()
            .and_then(|p| p.get("status"))
            .and_then(|s| s.as_str())
            .map(|s| s == "waiting")
            .unwrap_or(false)
    }
}

/// Core trait for runnable workflow steps
#[async_trait]
pub trait Agent: Send + Sync {
    /// Node id this agent was built for
    fn id(&self) -> &str;

    fn kind(&self) -> AgentKind;

    /// Run one step with the given context
    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WaypointError>;
}

/// Events emitted by the engine while a run progresses
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    StepStarted {
        agent_id: String,
        step_index: u64,
    },
    StepCompleted {
        agent_id: String,
        step_index: u64,
    },
    StepRetried {
        agent_id: String,
        attempt: u32,
    },
    Decision {
        agent_id: String,
        decision_type: String,
        reasoning: String,
    },
    RunFinished {
        run_id: String,
        status: String,
    },
    Error {
        agent_id: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple mock agent that echoes its context input
    struct MockAgent {
        id: String,
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> AgentKind {
            AgentKind::Prompt
        }

        async fn run(&self, ctx: &StepContext) -> Result<StepResult, WaypointError> {
            Ok(StepResult::completed(json!({ "echo": ctx.input })))
        }
    }

    fn ctx() -> StepContext {
        StepContext {
            run_id: "run-1".to_string(),
            step_index: 0,
            input: "hello".to_string(),
            previous_outputs: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_agent_runs() {
        let agent = MockAgent {
            id: "echo".to_string(),
        };
        assert_eq!(agent.id(), "echo");
        assert_eq!(agent.kind(), AgentKind::Prompt);

        let result = agent.run(&ctx()).await.unwrap();
        assert_eq!(result.payload.unwrap()["echo"], "hello");
    }

    #[test]
    fn test_waiting_result_detected() {
        assert!(StepResult::waiting().is_waiting());
        assert!(!StepResult::completed(json!({"status": "done"})).is_waiting());
        assert!(!StepResult::empty().is_waiting());
    }

    #[test]
    fn test_empty_result_has_no_payload() {
        assert!(StepResult::empty().payload.is_none());
    }

    #[test]
    fn test_agent_kind_serde_round_trip() {
        let kind: AgentKind = serde_json::from_str("\"scout\"").unwrap();
        assert_eq!(kind, AgentKind::Scout);
        assert_eq!(serde_json::to_string(&AgentKind::Fork).unwrap(), "\"fork\"");
        assert_eq!(AgentKind::Router.as_str(), "router");
    }

    #[test]
    fn test_step_event_serializes_tagged() {
        let event = StepEvent::StepStarted {
            agent_id: "a".to_string(),
            step_index: 3,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "step_started");
        assert_eq!(v["agent_id"], "a");
    }
}
