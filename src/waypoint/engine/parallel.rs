// SPDX-License-Identifier: MIT

//! Fork/join group execution
//!
//! Branches run concurrently; within a branch, agents run in queue
//! order. A branch that errors or times out never aborts its siblings,
//! and partial completion is a first-class outcome. Join logic upstream
//! must therefore be commutative over branch completion order.

use crate::runtime::agent::{Agent, StepContext};
use crate::runtime::model::LlmUsage;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Result of one branch of a fork group
struct BranchResult {
    outputs: HashMap<String, Value>,
    usage: LlmUsage,
    error: Option<(String, String)>,
}

/// Result of a whole fork group
pub struct ForkOutcome {
    /// "completed" when every branch finished, "partial" otherwise
    pub status: &'static str,
    /// Payload recorded under the fork node's id
    pub payload: Value,
    /// Per-agent payloads from every branch that produced them
    pub outputs: HashMap<String, Value>,
    pub usage: LlmUsage,
    /// (agent_id, message) for each branch failure
    pub errors: Vec<(String, String)>,
    /// Number of branches that ran to completion
    pub branches_done: usize,
}

/// Concurrently awaits fork branches with a per-branch deadline
pub struct ParallelExecutor {
    branch_timeout: Duration,
}

impl ParallelExecutor {
    pub fn new(branch_timeout_ms: u64) -> Self {
        Self {
            branch_timeout: Duration::from_millis(branch_timeout_ms),
        }
    }

    /// Run all branches of `fork_id` and merge their results
    pub async fn run_group(
        &self,
        fork_id: &str,
        branches: &[Vec<String>],
        agents: &HashMap<String, Arc<dyn Agent>>,
        base_ctx: &StepContext,
    ) -> ForkOutcome {
        let futures = branches
            .iter()
            .map(|branch| self.run_branch(branch, agents, base_ctx));
        let results = join_all(futures).await;

        let mut outputs = HashMap::new();
        let mut usage = LlmUsage::default();
        let mut errors = Vec::new();
        let mut branches_done = 0usize;

        for result in results {
            usage.merge(&result.usage);
            outputs.extend(result.outputs);
            match result.error {
                Some(err) => errors.push(err),
                None => branches_done += 1,
            }
        }

        let status = if errors.is_empty() { "completed" } else { "partial" };
        let branch_payloads: serde_json::Map<String, Value> = outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let payload = json!({
            "status": status,
            "branches": Value::Object(branch_payloads),
            "branches_done": branches_done,
            "branch_count": branches.len(),
        });

        log::info!(
            "fork '{fork_id}' finished {}: {branches_done}/{} branch(es)",
            status,
            branches.len()
        );

        ForkOutcome {
            status,
            payload,
            outputs,
            usage,
            errors,
            branches_done,
        }
    }

    /// One branch: sequential agents, each seeing the branch's outputs
    /// so far on top of the fork-time context
    async fn run_branch(
        &self,
        branch: &[String],
        agents: &HashMap<String, Arc<dyn Agent>>,
        base_ctx: &StepContext,
    ) -> BranchResult {
        let mut result = BranchResult {
            outputs: HashMap::new(),
            usage: LlmUsage::default(),
            error: None,
        };

        for agent_id in branch {
            let Some(agent) = agents.get(agent_id) else {
                result.error = Some((agent_id.clone(), "agent not found".to_string()));
                return result;
            };

            let mut ctx = base_ctx.clone();
            ctx.previous_outputs.extend(result.outputs.clone());

            let run = tokio::time::timeout(self.branch_timeout, agent.run(&ctx)).await;
            match run {
                Ok(Ok(step)) => {
                    if let Some(usage) = &step.usage {
                        result.usage.merge(usage);
                    }
                    match step.payload {
                        Some(payload) => {
                            result.outputs.insert(agent_id.clone(), payload);
                        }
                        None => {
                            // no retry loop inside a branch
                            result.error =
                                Some((agent_id.clone(), "empty result in branch".to_string()));
                            return result;
                        }
                    }
                }
                Ok(Err(e)) => {
                    result.error = Some((agent_id.clone(), e.to_string()));
                    return result;
                }
                Err(_) => {
                    result.error = Some((
                        agent_id.clone(),
                        format!("branch timeout after {}ms", self.branch_timeout.as_millis()),
                    ));
                    return result;
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::agent::{AgentKind, StepResult};
    use crate::runtime::error::WaypointError;
    use async_trait::async_trait;

    enum Behavior {
        Echo,
        Fail,
        Sleep(u64),
    }

    struct BranchAgent {
        id: String,
        behavior: Behavior,
    }

    #[async_trait]
    impl Agent for BranchAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> AgentKind {
            AgentKind::Prompt
        }

        async fn run(&self, ctx: &StepContext) -> Result<StepResult, WaypointError> {
            match self.behavior {
                Behavior::Echo => Ok(StepResult::completed(json!({
                    "id": self.id,
                    "saw": ctx.previous_outputs.keys().cloned().collect::<Vec<_>>(),
                }))),
                Behavior::Fail => Err(WaypointError::agent(&self.id, "branch blew up")),
                Behavior::Sleep(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(StepResult::completed(json!({ "id": self.id })))
                }
            }
        }
    }

    fn agents(list: Vec<(&str, Behavior)>) -> HashMap<String, Arc<dyn Agent>> {
        list.into_iter()
            .map(|(id, behavior)| {
                (
                    id.to_string(),
                    Arc::new(BranchAgent {
                        id: id.to_string(),
                        behavior,
                    }) as Arc<dyn Agent>,
                )
            })
            .collect()
    }

    fn ctx() -> StepContext {
        StepContext {
            run_id: "run-1".to_string(),
            step_index: 1,
            input: "go".to_string(),
            previous_outputs: HashMap::new(),
        }
    }

    fn branch(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_branches_complete() {
        let agents = agents(vec![("a", Behavior::Echo), ("b", Behavior::Echo)]);
        let executor = ParallelExecutor::new(5000);

        let outcome = executor
            .run_group("split", &[branch(&["a"]), branch(&["b"])], &agents, &ctx())
            .await;

        assert_eq!(outcome.status, "completed");
        assert_eq!(outcome.branches_done, 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.payload["branches"]["a"]["id"], "a");
        assert_eq!(outcome.payload["branch_count"], 2);
    }

    #[tokio::test]
    async fn test_branch_failure_is_partial_not_fatal() {
        let agents = agents(vec![("ok", Behavior::Echo), ("bad", Behavior::Fail)]);
        let executor = ParallelExecutor::new(5000);

        let outcome = executor
            .run_group("split", &[branch(&["ok"]), branch(&["bad"])], &agents, &ctx())
            .await;

        assert_eq!(outcome.status, "partial");
        assert_eq!(outcome.branches_done, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, "bad");
        // the surviving branch's output is kept
        assert!(outcome.outputs.contains_key("ok"));
    }

    #[tokio::test]
    async fn test_branch_timeout_recorded() {
        let agents = agents(vec![("slow", Behavior::Sleep(200)), ("fast", Behavior::Echo)]);
        let executor = ParallelExecutor::new(20);

        let outcome = executor
            .run_group("split", &[branch(&["slow"]), branch(&["fast"])], &agents, &ctx())
            .await;

        assert_eq!(outcome.status, "partial");
        assert!(outcome.errors[0].1.contains("timeout"));
        assert!(outcome.outputs.contains_key("fast"));
    }

    #[tokio::test]
    async fn test_branch_agents_run_sequentially_with_shared_outputs() {
        let agents = agents(vec![("first", Behavior::Echo), ("second", Behavior::Echo)]);
        let executor = ParallelExecutor::new(5000);

        let outcome = executor
            .run_group("split", &[branch(&["first", "second"])], &agents, &ctx())
            .await;

        assert_eq!(outcome.status, "completed");
        let saw = outcome.outputs["second"]["saw"].as_array().unwrap();
        assert!(saw.iter().any(|v| v == "first"));
    }

    #[tokio::test]
    async fn test_unknown_branch_agent_fails_that_branch_only() {
        let agents = agents(vec![("ok", Behavior::Echo)]);
        let executor = ParallelExecutor::new(5000);

        let outcome = executor
            .run_group("split", &[branch(&["ok"]), branch(&["ghost"])], &agents, &ctx())
            .await;

        assert_eq!(outcome.status, "partial");
        assert_eq!(outcome.errors[0].0, "ghost");
        assert_eq!(outcome.branches_done, 1);
    }
}
