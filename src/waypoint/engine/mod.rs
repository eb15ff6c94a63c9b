// SPDX-License-Identifier: MIT

//! Queue processor - turns a workflow definition into an executed run
//!
//! The main loop pops one agent id at a time, executes it, classifies
//! the result (success, soft failure, waiting, router expansion, scout
//! decision, fork group) and mutates the queue accordingly. Failures
//! are recorded into per-run telemetry and retried within bounds; a run
//! always ends with a persisted report, even when it could not finish.

pub mod parallel;
pub mod scout_handler;

pub use parallel::{ForkOutcome, ParallelExecutor};
pub use scout_handler::{highest_score_selector, AppliedDecision, GraphScoutHandler, ShortlistSelector};

use crate::runtime::agent::{Agent, AgentKind, StepContext, StepEvent, StepResult};
use crate::runtime::error::WaypointError;
use crate::waypoint::agents::build_agents;
use crate::waypoint::config::WorkflowDefinition;
use crate::waypoint::graph::{GraphState, RuntimeState};
use crate::waypoint::memory::MemoryBackend;
use crate::waypoint::scout::{BudgetController, GraphScout, SmartPathEvaluator};
use crate::waypoint::telemetry::{ErrorTelemetry, ExecutionStatus, ReportWriter, RunReport};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// What one finished run hands back to the caller
pub struct RunOutcome {
    pub run_id: String,
    pub status: ExecutionStatus,
    /// Payload of the last completed step
    pub final_output: Value,
    pub logs: Vec<Value>,
    /// Full report document, also persisted to disk and memory
    pub report: Value,
    pub report_path: Option<PathBuf>,
}

/// The execution engine for one workflow definition
pub struct Engine {
    def: WorkflowDefinition,
    agents: HashMap<String, Arc<dyn Agent>>,
    memory: Arc<dyn MemoryBackend>,
    scout: GraphScout,
    handler: GraphScoutHandler,
    parallel: ParallelExecutor,
    report_writer: ReportWriter,
    events: Option<mpsc::Sender<StepEvent>>,
}

impl Engine {
    /// Build an engine with explicit agents, for callers that assemble
    /// their own (tests, embedders). The scout runs heuristics-only.
    pub fn new(
        def: WorkflowDefinition,
        agents: HashMap<String, Arc<dyn Agent>>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        let scout = GraphScout::new(def.scout.clone(), None);
        Self::assemble(def, agents, memory, scout)
    }

    /// Build an engine from a workflow definition, wiring real LLM
    /// clients for prompt agents and the scout's dry-run stage
    pub fn from_definition(
        def: WorkflowDefinition,
        memory: Arc<dyn MemoryBackend>,
    ) -> Result<Self, WaypointError> {
        let agents = build_agents(&def)?;
        let evaluator = match def.scout_llm() {
            Some(settings) => {
                let client = crate::runtime::model::client_for_provider(
                    &settings.provider,
                    settings.endpoint.as_deref(),
                )?;
                Some(SmartPathEvaluator::new(client, settings.clone()))
            }
            None => None,
        };
        let scout = GraphScout::new(def.scout.clone(), evaluator);
        Ok(Self::assemble(def, agents, memory, scout))
    }

    fn assemble(
        def: WorkflowDefinition,
        agents: HashMap<String, Arc<dyn Agent>>,
        memory: Arc<dyn MemoryBackend>,
        scout: GraphScout,
    ) -> Self {
        let handler =
            GraphScoutHandler::new(def.execution.defer_shortlist, highest_score_selector());
        let parallel = ParallelExecutor::new(def.execution.fork_timeout_ms);
        let report_writer = ReportWriter::new(&def.execution.log_dir);
        Self {
            def,
            agents,
            memory,
            scout,
            handler,
            parallel,
            report_writer,
            events: None,
        }
    }

    /// Stream step events to a channel (consumed by the SSE endpoint)
    pub fn with_events(mut self, tx: mpsc::Sender<StepEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Replace the shortlist selection function
    pub fn with_selector(mut self, selector: ShortlistSelector) -> Self {
        self.handler = GraphScoutHandler::new(self.def.execution.defer_shortlist, selector);
        self
    }

    async fn emit(&self, event: StepEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Execute the workflow to queue exhaustion
    ///
    /// Never aborts mid-run on agent failures; whatever happened is in
    /// the report. Memory is closed on every path out.
    pub async fn run(&self, input: &str) -> Result<RunOutcome, WaypointError> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let max_retries = self.def.execution.max_retries;

        let mut telemetry = ErrorTelemetry::new();
        let mut budget = BudgetController::new(self.def.budgets);
        let mut queue: VecDeque<String> = VecDeque::from(vec![self.def.entry.clone()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut previous_outputs: HashMap<String, Value> = HashMap::new();
        let mut logs: Vec<Value> = Vec::new();
        let mut step_index: u64 = 0;

        log::info!("run {run_id}: starting workflow '{}'", self.def.name);

        while let Some(agent_id) = queue.pop_front() {
            step_index += 1;
            if step_index > self.def.execution.max_steps {
                telemetry.record_critical(
                    "engine",
                    &agent_id,
                    format!("step ceiling {} reached", self.def.execution.max_steps),
                    step_index,
                    &run_id,
                );
                break;
            }

            let Some(node) = self.def.node(&agent_id) else {
                telemetry.record_critical(
                    "engine",
                    &agent_id,
                    "agent id not in workflow definition",
                    step_index,
                    &run_id,
                );
                continue;
            };

            self.emit(StepEvent::StepStarted {
                agent_id: agent_id.clone(),
                step_index,
            })
            .await;

            let ctx = StepContext {
                run_id: run_id.clone(),
                step_index,
                input: input.to_string(),
                previous_outputs: previous_outputs.clone(),
            };

            match node.kind {
                AgentKind::Scout => {
                    self.run_scout_step(
                        &agent_id,
                        input,
                        &ctx,
                        &mut budget,
                        &mut queue,
                        &mut visited,
                        &mut previous_outputs,
                        &mut logs,
                        &mut telemetry,
                        max_retries,
                    )
                    .await;
                }
                AgentKind::Fork => {
                    let outcome = self
                        .parallel
                        .run_group(&agent_id, &node.branches, &self.agents, &ctx)
                        .await;
                    budget.update_usage(
                        outcome.usage.tokens,
                        outcome.usage.cost_usd,
                        outcome.usage.latency_ms,
                    );
                    for (branch_agent, payload) in &outcome.outputs {
                        previous_outputs.insert(branch_agent.clone(), payload.clone());
                        visited.insert(branch_agent.clone());
                        self.memory.record_outcome(branch_agent, true).await;
                    }
                    for _ in 0..outcome.branches_done {
                        self.memory
                            .increment_counter(&run_id, &format!("fork:{agent_id}:branches_done"))
                            .await;
                    }
                    for (branch_agent, message) in &outcome.errors {
                        telemetry.record_error(
                            "branch",
                            branch_agent,
                            message,
                            step_index,
                            &run_id,
                            None,
                        );
                        self.memory.record_outcome(branch_agent, false).await;
                    }
                    if outcome.status == "partial" {
                        telemetry.record_partial_success(format!(
                            "fork '{agent_id}' completed {}/{} branch(es)",
                            outcome.branches_done,
                            node.branches.len()
                        ));
                    }
                    logs.push(json!({
                        "agent_id": agent_id,
                        "step_index": step_index,
                        "payload": outcome.payload,
                    }));
                    previous_outputs.insert(agent_id.clone(), outcome.payload);
                    visited.insert(agent_id.clone());
                    self.emit(StepEvent::StepCompleted {
                        agent_id: agent_id.clone(),
                        step_index,
                    })
                    .await;
                    self.enqueue_successors(&agent_id, &mut queue, &visited);
                }
                _ => {
                    self.run_plain_step(
                        &agent_id,
                        node.kind,
                        &ctx,
                        &mut budget,
                        &mut queue,
                        &mut visited,
                        &mut previous_outputs,
                        &mut logs,
                        &mut telemetry,
                        max_retries,
                    )
                    .await;
                }
            }
        }

        self.finish(run_id, started, step_index, telemetry, budget, logs)
            .await
    }

    /// One scout step: snapshot, pipeline, queue mutation
    #[allow(clippy::too_many_arguments)]
    async fn run_scout_step(
        &self,
        agent_id: &str,
        input: &str,
        ctx: &StepContext,
        budget: &mut BudgetController,
        queue: &mut VecDeque<String>,
        visited: &mut HashSet<String>,
        previous_outputs: &mut HashMap<String, Value>,
        logs: &mut Vec<Value>,
        telemetry: &mut ErrorTelemetry,
        max_retries: u32,
    ) {
        let mut available: HashSet<String> = previous_outputs.keys().cloned().collect();
        for id in visited.iter() {
            if let Some(node) = self.def.node(id) {
                available.extend(node.contract.outputs.iter().cloned());
            }
        }

        let state = GraphState::snapshot(
            &self.def,
            agent_id,
            visited.clone(),
            RuntimeState {
                run_id: ctx.run_id.clone(),
                step_index: ctx.step_index,
            },
            budget.remaining(),
            available,
        );

        let mut priors: HashMap<String, f64> = HashMap::new();
        for node in &self.def.nodes {
            if let Some(rate) = self.memory.success_rate(&node.id).await {
                priors.insert(node.id.clone(), rate);
            }
        }

        match self.scout.route(&state, input, budget, &priors, agent_id).await {
            Ok(outcome) => {
                budget.update_usage(
                    outcome.usage.tokens,
                    outcome.usage.cost_usd,
                    outcome.usage.latency_ms,
                );
                self.memory
                    .persist_trace(&ctx.run_id, outcome.decision.trace.clone())
                    .await;
                self.emit(StepEvent::Decision {
                    agent_id: agent_id.to_string(),
                    decision_type: outcome.decision.decision_type.as_str().to_string(),
                    reasoning: outcome.decision.reasoning.clone(),
                })
                .await;

                let applied = self.handler.apply(&outcome, queue);
                let shortlist_ids: Vec<String> =
                    outcome.shortlist.iter().map(|c| c.node_id.clone()).collect();
                let payload = json!({
                    "decision_type": outcome.decision.decision_type.as_str(),
                    "target": outcome.decision.target,
                    "confidence": outcome.decision.confidence,
                    "reasoning": outcome.decision.reasoning,
                    "shortlist": shortlist_ids,
                });

                if let AppliedDecision::Paused(reason) = &applied {
                    telemetry.record_error(
                        "routing",
                        agent_id,
                        reason,
                        ctx.step_index,
                        &ctx.run_id,
                        None,
                    );
                    telemetry
                        .record_partial_success(format!("run paused at scout '{agent_id}'"));
                }

                logs.push(json!({
                    "agent_id": agent_id,
                    "step_index": ctx.step_index,
                    "payload": payload,
                }));
                previous_outputs.insert(agent_id.to_string(), payload);
                visited.insert(agent_id.to_string());
                self.emit(StepEvent::StepCompleted {
                    agent_id: agent_id.to_string(),
                    step_index: ctx.step_index,
                })
                .await;
            }
            // transport failures from the dry-run stage reach the retry policy
            Err(e) => {
                self.handle_step_error(agent_id, e, ctx, queue, telemetry, max_retries)
                    .await;
            }
        }
    }

    /// One prompt/router/join step with retry classification
    #[allow(clippy::too_many_arguments)]
    async fn run_plain_step(
        &self,
        agent_id: &str,
        kind: AgentKind,
        ctx: &StepContext,
        budget: &mut BudgetController,
        queue: &mut VecDeque<String>,
        visited: &mut HashSet<String>,
        previous_outputs: &mut HashMap<String, Value>,
        logs: &mut Vec<Value>,
        telemetry: &mut ErrorTelemetry,
        max_retries: u32,
    ) {
        let Some(agent) = self.agents.get(agent_id) else {
            telemetry.record_critical(
                "engine",
                agent_id,
                "no runnable agent built for this node",
                ctx.step_index,
                &ctx.run_id,
            );
            return;
        };

        match agent.run(ctx).await {
            Ok(result) if result.is_waiting() => {
                // cooperative backpressure: no retry slot consumed
                log::debug!("agent '{agent_id}' is waiting; re-enqueueing");
                queue.push_back(agent_id.to_string());
            }
            Ok(StepResult { payload: None, .. }) => {
                // soft failure: ran clean but produced nothing
                let attempts = telemetry.record_retry(agent_id);
                if attempts > max_retries {
                    telemetry.record_critical(
                        "agent",
                        agent_id,
                        format!("empty result after {max_retries} retries"),
                        ctx.step_index,
                        &ctx.run_id,
                    );
                    self.memory.record_outcome(agent_id, false).await;
                } else {
                    self.emit(StepEvent::StepRetried {
                        agent_id: agent_id.to_string(),
                        attempt: attempts,
                    })
                    .await;
                    queue.push_front(agent_id.to_string());
                }
            }
            Ok(StepResult {
                payload: Some(payload),
                usage,
            }) => {
                if let Some(usage) = usage {
                    budget.update_usage(usage.tokens, usage.cost_usd, usage.latency_ms);
                }
                if kind == AgentKind::Router {
                    if let Some(next) = payload.get("next").and_then(Value::as_array) {
                        for id in next.iter().rev().filter_map(Value::as_str) {
                            queue.push_front(id.to_string());
                        }
                    }
                }
                logs.push(json!({
                    "agent_id": agent_id,
                    "step_index": ctx.step_index,
                    "payload": payload,
                }));
                previous_outputs.insert(agent_id.to_string(), payload);
                visited.insert(agent_id.to_string());
                self.memory.record_outcome(agent_id, true).await;
                self.emit(StepEvent::StepCompleted {
                    agent_id: agent_id.to_string(),
                    step_index: ctx.step_index,
                })
                .await;
                if kind != AgentKind::Router {
                    self.enqueue_successors(agent_id, queue, visited);
                }
            }
            Err(e) => {
                self.handle_step_error(agent_id, e, ctx, queue, telemetry, max_retries)
                    .await;
            }
        }
    }

    /// Bounded retry for hard failures
    async fn handle_step_error(
        &self,
        agent_id: &str,
        error: WaypointError,
        ctx: &StepContext,
        queue: &mut VecDeque<String>,
        telemetry: &mut ErrorTelemetry,
        max_retries: u32,
    ) {
        if let WaypointError::Transport(t) = &error {
            if let Some(code) = t.status_code() {
                telemetry.record_status_code(code);
            }
        }
        telemetry.record_error(
            "agent",
            agent_id,
            error.to_string(),
            ctx.step_index,
            &ctx.run_id,
            Some("retry"),
        );
        self.emit(StepEvent::Error {
            agent_id: agent_id.to_string(),
            message: error.to_string(),
        })
        .await;

        let attempts = telemetry.record_retry(agent_id);
        if attempts > max_retries {
            telemetry.record_critical(
                "agent",
                agent_id,
                format!("failed after {max_retries} retries: {error}"),
                ctx.step_index,
                &ctx.run_id,
            );
            self.memory.record_outcome(agent_id, false).await;
        } else {
            self.emit(StepEvent::StepRetried {
                agent_id: agent_id.to_string(),
                attempt: attempts,
            })
            .await;
            queue.push_front(agent_id.to_string());
        }
    }

    /// Static advancement: queue unvisited graph successors
    fn enqueue_successors(
        &self,
        agent_id: &str,
        queue: &mut VecDeque<String>,
        visited: &HashSet<String>,
    ) {
        let mut successors: Vec<(&String, f64)> = self
            .def
            .edges
            .iter()
            .filter(|e| e.from == agent_id)
            .map(|e| (&e.to, e.weight))
            .collect();
        successors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (target, _) in successors {
            if visited.contains(target) || queue.iter().any(|q| q == target) {
                continue;
            }
            queue.push_back(target.clone());
        }
    }

    /// Build and persist the report; always closes memory
    async fn finish(
        &self,
        run_id: String,
        started: Instant,
        steps_attempted: u64,
        mut telemetry: ErrorTelemetry,
        budget: BudgetController,
        logs: Vec<Value>,
    ) -> Result<RunOutcome, WaypointError> {
        let status = telemetry.finalize();
        let usage = budget.usage_snapshot();
        let meta_report = json!({
            "duration_ms": started.elapsed().as_millis() as u64,
            "steps_attempted": steps_attempted,
            "llm": {
                "tokens": usage.tokens,
                "cost_usd": usage.cost_usd,
                "latency_ms": usage.latency_ms,
            },
        });

        let report = RunReport {
            run_id: run_id.clone(),
            status,
            telemetry,
            meta_report,
            execution_logs: logs.clone(),
            steps_attempted,
            memory_snapshot: self.memory.snapshot().await,
        };
        let report_json = report.to_json();
        self.memory.persist_report(&run_id, report_json.clone()).await;

        // best-effort: a run that cannot write its artifact still returns
        let report_path = match self.report_writer.write(&report) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("failed to write report artifact: {e}");
                None
            }
        };

        self.memory.close().await;
        self.emit(StepEvent::RunFinished {
            run_id: run_id.clone(),
            status: status.as_str().to_string(),
        })
        .await;

        let final_output = logs
            .last()
            .and_then(|l| l.get("payload"))
            .cloned()
            .unwrap_or(Value::Null);

        log::info!(
            "run {run_id} finished {} after {} step(s)",
            status.as_str(),
            steps_attempted
        );

        Ok(RunOutcome {
            run_id,
            status,
            final_output,
            logs,
            report: report_json,
            report_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::config::WorkflowLoader;
    use crate::waypoint::memory::InMemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Steps through scripted results, one per invocation
    struct ScriptedAgent {
        id: String,
        script: Vec<Result<StepResult, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedAgent {
        fn new(id: &str, script: Vec<Result<StepResult, String>>) -> Arc<dyn Agent> {
            Arc::new(Self {
                id: id.to_string(),
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> AgentKind {
            AgentKind::Prompt
        }

        async fn run(&self, _ctx: &StepContext) -> Result<StepResult, WaypointError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(idx) {
                Some(Ok(result)) => Ok(result.clone()),
                Some(Err(message)) => Err(WaypointError::agent(&self.id, message)),
                None => Ok(StepResult::completed(json!({ "response": "done" }))),
            }
        }
    }

    fn single_node_def(log_dir: &str) -> WorkflowDefinition {
        let yaml = format!(
            r#"
name: single
description: "One agent"
entry: work
llm:
  model: llama3.2
execution:
  log_dir: "{log_dir}"
nodes:
  - id: work
    kind: prompt
    prompt: "do it"
"#
        );
        WorkflowLoader::parse_yaml(&yaml).unwrap()
    }

    fn tmp_dir(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("waypoint-engine-{tag}-{}", std::process::id()))
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn test_waiting_agent_re_enqueued_without_retry() {
        let dir = tmp_dir("waiting");
        let def = single_node_def(&dir);
        let agents: HashMap<String, Arc<dyn Agent>> = [(
            "work".to_string(),
            ScriptedAgent::new(
                "work",
                vec![
                    Ok(StepResult::waiting()),
                    Ok(StepResult::completed(json!({ "response": "ready now" }))),
                ],
            ),
        )]
        .into();

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("go").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.logs.len(), 1);
        let report = &outcome.report["waypoint_execution_report"];
        assert_eq!(report["totals"]["retries"], 0);
        assert!(report["agents_with_errors"].as_array().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_two_empty_results_then_success() {
        let dir = tmp_dir("retries");
        let def = single_node_def(&dir);
        let agents: HashMap<String, Arc<dyn Agent>> = [(
            "work".to_string(),
            ScriptedAgent::new(
                "work",
                vec![
                    Ok(StepResult::empty()),
                    Ok(StepResult::empty()),
                    Ok(StepResult::completed(json!({ "response": "third time" }))),
                ],
            ),
        )]
        .into();

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("go").await.unwrap();

        // exactly two retries recorded and one successful log entry
        let report = &outcome.report["waypoint_execution_report"];
        assert_eq!(report["totals"]["retries"], 2);
        assert_eq!(outcome.logs.len(), 1);
        assert_eq!(outcome.final_output["response"], "third time");
        // soft failures are not telemetry errors
        assert_eq!(report["totals"]["errors"], 0);
        assert_eq!(outcome.status, ExecutionStatus::Completed);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_critical_failure() {
        let dir = tmp_dir("exhausted");
        let def = single_node_def(&dir);
        let agents: HashMap<String, Arc<dyn Agent>> = [(
            "work".to_string(),
            ScriptedAgent::new(
                "work",
                vec![
                    Err("boom".to_string()),
                    Err("boom".to_string()),
                    Err("boom".to_string()),
                ],
            ),
        )]
        .into();

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("go").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        let report = &outcome.report["waypoint_execution_report"];
        assert_eq!(report["agents_with_errors"][0], "work");
        assert!(outcome.logs.is_empty());
        // the report artifact still exists for the failed run
        assert!(outcome.report_path.is_some());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_scout_routes_and_run_continues() {
        let dir = tmp_dir("scout");
        let yaml = format!(
            r#"
name: routed
description: "Scout picks between two branches"
entry: pick
llm:
  model: llama3.2
execution:
  log_dir: "{dir}"
nodes:
  - id: pick
    kind: scout
  - id: search
    kind: prompt
    prompt: "Search for {{{{input}}}}"
    capabilities: [search]
  - id: answer
    kind: prompt
    prompt: "Answer {{{{input}}}}"
edges:
  - from: pick
    to: search
  - from: pick
    to: answer
"#
        );
        let def = WorkflowLoader::parse_yaml(&yaml).unwrap();
        let agents: HashMap<String, Arc<dyn Agent>> = [
            (
                "search".to_string(),
                ScriptedAgent::new(
                    "search",
                    vec![Ok(StepResult::completed(json!({ "response": "found it" })))],
                ),
            ),
            (
                "answer".to_string(),
                ScriptedAgent::new(
                    "answer",
                    vec![Ok(StepResult::completed(json!({ "response": "answered" })))],
                ),
            ),
        ]
        .into();

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("search the web for rust").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        // scout log + the routed agent's log
        assert_eq!(outcome.logs[0]["agent_id"], "pick");
        assert_eq!(outcome.logs[0]["payload"]["decision_type"], "commit_next");
        assert_eq!(outcome.logs[1]["agent_id"], "search");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_scout_dead_end_pauses_run_as_partial() {
        let dir = tmp_dir("deadend");
        let yaml = format!(
            r#"
name: dead-end
description: "Scout with no successors"
entry: pick
llm:
  model: llama3.2
execution:
  log_dir: "{dir}"
nodes:
  - id: pick
    kind: scout
"#
        );
        let def = WorkflowLoader::parse_yaml(&yaml).unwrap();

        let engine = Engine::new(def, HashMap::new(), Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("anything").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Partial);
        let report = &outcome.report["waypoint_execution_report"];
        assert_eq!(
            report["error_telemetry"]["partial_successes"][0],
            "run paused at scout 'pick'"
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_router_expands_queue_dynamically() {
        let dir = tmp_dir("router");
        let yaml = format!(
            r#"
name: routed
description: "Router fans into the chosen branch"
entry: route
llm:
  model: llama3.2
execution:
  log_dir: "{dir}"
nodes:
  - id: route
    kind: router
    route_key: "route_source.intent"
    routes:
      helpful: [answer]
    default_route: [answer]
  - id: answer
    kind: prompt
    prompt: "reply"
  - id: route_source
    kind: prompt
    prompt: "classify"
"#
        );
        let def = WorkflowLoader::parse_yaml(&yaml).unwrap();
        let agents: HashMap<String, Arc<dyn Agent>> = [
            (
                "route".to_string(),
                crate::waypoint::agents::build_agents(&def)
                    .unwrap()
                    .remove("route")
                    .unwrap(),
            ),
            (
                "answer".to_string(),
                ScriptedAgent::new(
                    "answer",
                    vec![Ok(StepResult::completed(json!({ "response": "hi" })))],
                ),
            ),
            (
                "route_source".to_string(),
                ScriptedAgent::new(
                    "route_source",
                    vec![Ok(StepResult::completed(json!({ "intent": "helpful" })))],
                ),
            ),
        ]
        .into();

        // seed the route source before the router runs
        let mut def = def;
        def.entry = "route_source".to_string();
        def.edges.push(crate::waypoint::config::EdgeDefinition {
            from: "route_source".to_string(),
            to: "route".to_string(),
            weight: 1.0,
        });

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("go").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        let executed: Vec<&str> = outcome
            .logs
            .iter()
            .map(|l| l["agent_id"].as_str().unwrap())
            .collect();
        assert_eq!(executed, vec!["route_source", "route", "answer"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_fork_partial_branch_downgrades_status() {
        let dir = tmp_dir("fork");
        let yaml = format!(
            r#"
name: forked
description: "One branch fails"
entry: split
llm:
  model: llama3.2
execution:
  log_dir: "{dir}"
nodes:
  - id: split
    kind: fork
    branches:
      - [left]
      - [right]
  - id: left
    kind: prompt
    prompt: "l"
  - id: right
    kind: prompt
    prompt: "r"
  - id: merge
    kind: join
edges:
  - from: split
    to: merge
"#
        );
        let def = WorkflowLoader::parse_yaml(&yaml).unwrap();
        let agents: HashMap<String, Arc<dyn Agent>> = [
            (
                "left".to_string(),
                ScriptedAgent::new(
                    "left",
                    vec![Ok(StepResult::completed(json!({ "response": "l" })))],
                ),
            ),
            (
                "right".to_string(),
                ScriptedAgent::new("right", vec![Err("branch died".to_string())]),
            ),
            (
                "merge".to_string(),
                crate::waypoint::agents::build_agents(&def)
                    .unwrap()
                    .remove("merge")
                    .unwrap(),
            ),
        ]
        .into();

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("go").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Partial);
        let fork_log = outcome.logs.iter().find(|l| l["agent_id"] == "split").unwrap();
        assert_eq!(fork_log["payload"]["status"], "partial");
        // join still ran over the surviving branch
        let join_log = outcome.logs.iter().find(|l| l["agent_id"] == "merge").unwrap();
        assert_eq!(join_log["payload"]["merged"]["left"]["response"], "l");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_step_ceiling_stops_runaway_queue() {
        let dir = tmp_dir("ceiling");
        let yaml = format!(
            r#"
name: runaway
description: "Agent that waits forever"
entry: work
llm:
  model: llama3.2
execution:
  max_steps: 5
  log_dir: "{dir}"
nodes:
  - id: work
    kind: prompt
    prompt: "never ready"
"#
        );
        let def = WorkflowLoader::parse_yaml(&yaml).unwrap();
        let script: Vec<Result<StepResult, String>> =
            (0..10).map(|_| Ok(StepResult::waiting())).collect();
        let agents: HashMap<String, Arc<dyn Agent>> =
            [("work".to_string(), ScriptedAgent::new("work", script))].into();

        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new()));
        let outcome = engine.run("go").await.unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        let report = &outcome.report["waypoint_execution_report"];
        assert_eq!(report["totals"]["steps_attempted"], 6);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_events_streamed_in_order() {
        let dir = tmp_dir("events");
        let def = single_node_def(&dir);
        let agents: HashMap<String, Arc<dyn Agent>> = [(
            "work".to_string(),
            ScriptedAgent::new(
                "work",
                vec![Ok(StepResult::completed(json!({ "response": "ok" })))],
            ),
        )]
        .into();

        let (tx, mut rx) = mpsc::channel(16);
        let engine = Engine::new(def, agents, Arc::new(InMemoryBackend::new())).with_events(tx);
        engine.run("go").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(serde_json::to_value(&event).unwrap()["event"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds, vec!["step_started", "step_completed", "run_finished"]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
