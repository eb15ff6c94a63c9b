// SPDX-License-Identifier: MIT

//! GraphScout - the per-step routing pipeline
//!
//! One invocation runs discover -> budget filter -> safety screen ->
//! dry-run evaluation -> gate -> score -> decide over a frozen
//! [GraphState] snapshot and emits a [ScoutDecision] plus an audit
//! trace. The queue processor applies the decision; nothing here
//! touches the queue.

pub mod budget;
pub mod candidate;
pub mod decision;
pub mod evaluator;
pub mod gate;
pub mod safety;
pub mod schema;
pub mod scorer;

pub use budget::{BudgetController, BudgetUsage};
pub use candidate::PathCandidate;
pub use decision::{DecisionEngine, DecisionTarget, DecisionType, ScoutDecision};
pub use evaluator::SmartPathEvaluator;
pub use gate::BooleanGate;
pub use safety::SafetyController;
pub use scorer::PathScorer;

use crate::runtime::error::WaypointError;
use crate::runtime::model::LlmUsage;
use crate::waypoint::config::ScoutSettings;
use crate::waypoint::graph::{GraphIntrospector, GraphState};
use serde_json::{json, Value};
use std::collections::HashMap;

const GRAPH_SCOUT_VERSION: &str = "1.0";

/// Everything one scout invocation produced
pub struct ScoutOutcome {
    pub decision: ScoutDecision,
    /// Scored candidates as they stood at decision time, for shortlist
    /// selection downstream
    pub shortlist: Vec<PathCandidate>,
    /// LLM spend of the dry-run stage
    pub usage: LlmUsage,
}

/// End-to-end routing pipeline for one workflow step
pub struct GraphScout {
    settings: ScoutSettings,
    introspector: GraphIntrospector,
    safety: SafetyController,
    gate: BooleanGate,
    scorer: PathScorer,
    decisions: DecisionEngine,
    evaluator: Option<SmartPathEvaluator>,
}

impl GraphScout {
    /// Build the pipeline from its settings
    ///
    /// Without an evaluator the dry-run stage is skipped and scoring
    /// falls back to keyword heuristics.
    pub fn new(settings: ScoutSettings, evaluator: Option<SmartPathEvaluator>) -> Self {
        let safety = SafetyController::new(&settings);
        let gate = BooleanGate::new(settings.gates.clone().unwrap_or_default());
        let scorer = PathScorer::new(settings.clone());
        let decisions = DecisionEngine::new(settings.commit_margin);
        let introspector = GraphIntrospector::new(settings.max_depth);
        Self {
            settings,
            introspector,
            safety,
            gate,
            scorer,
            decisions,
            evaluator,
        }
    }

    /// Run the full pipeline for one step
    ///
    /// Errors are transport failures from the dry-run stage only; every
    /// other problem resolves into a decision.
    pub async fn route(
        &self,
        state: &GraphState,
        question: &str,
        budget: &BudgetController,
        priors: &HashMap<String, f64>,
        current_agent_id: &str,
    ) -> Result<ScoutOutcome, WaypointError> {
        if budget.is_exhausted(self.settings.exhaustion_threshold) {
            let mut decision = ScoutDecision::human_gate(format!(
                "budget exhausted past the {:.0}% threshold; pausing for review",
                self.settings.exhaustion_threshold * 100.0
            ));
            decision.trace = self.trace(state, question, &[], &[], &decision);
            return Ok(ScoutOutcome {
                decision,
                shortlist: Vec::new(),
                usage: LlmUsage::default(),
            });
        }

        let discovered = self.introspector.discover_paths(state);
        let discovered_ids: Vec<String> = discovered.iter().map(|c| c.node_id.clone()).collect();
        let had_candidates = !discovered.is_empty();

        let candidates = budget.filter_candidates(discovered, state);
        if candidates.is_empty() && had_candidates {
            let mut decision = ScoutDecision::new(
                DecisionType::Shortlist,
                DecisionTarget::List(Vec::new()),
                0.0,
                "no candidate fits the remaining budget",
            );
            decision.trace = self.trace(state, question, &discovered_ids, &[], &decision);
            return Ok(ScoutOutcome {
                decision,
                shortlist: Vec::new(),
                usage: LlmUsage::default(),
            });
        }

        let before_safety = candidates.len();
        let mut candidates = self.safety.assess_candidates(candidates, state);
        if candidates.is_empty() && before_safety > 0 {
            // fail-closed: screened-out routing pauses instead of degrading
            let mut decision =
                ScoutDecision::human_gate("all candidates failed safety screening");
            decision.trace = self.trace(state, question, &discovered_ids, &[], &decision);
            return Ok(ScoutOutcome {
                decision,
                shortlist: Vec::new(),
                usage: LlmUsage::default(),
            });
        }

        let mut usage = LlmUsage::default();
        if let Some(evaluator) = &self.evaluator {
            usage = evaluator.simulate_candidates(&mut candidates, question).await?;
        }

        let candidates = self.gate.admit_candidates(candidates);
        let scored = self
            .scorer
            .score_candidates(candidates, question, state, priors);

        let mut decision = self.decisions.decide(&scored, current_agent_id);
        decision.trace = self.trace(state, question, &discovered_ids, &scored, &decision);

        log::info!(
            "scout at '{}' decided {} (confidence {:.2}): {}",
            current_agent_id,
            decision.decision_type.as_str(),
            decision.confidence,
            decision.reasoning
        );

        Ok(ScoutOutcome {
            decision,
            shortlist: scored,
            usage,
        })
    }

    /// Audit artifact for one invocation
    fn trace(
        &self,
        state: &GraphState,
        question: &str,
        discovered_ids: &[String],
        scored: &[PathCandidate],
        decision: &ScoutDecision,
    ) -> Value {
        let top_scores: Vec<Value> = scored
            .iter()
            .take(3)
            .map(|c| json!({ "node_id": c.node_id, "score": c.score, "components": c.components }))
            .collect();

        json!({
            "graph_scout_version": GRAPH_SCOUT_VERSION,
            "question": question,
            "config": {
                "k_beam": self.settings.k_beam,
                "max_depth": self.settings.max_depth,
                "commit_margin": self.settings.commit_margin,
                "score_weights": self.settings.score_weights,
            },
            "discovery": {
                "candidate_count": discovered_ids.len(),
                "candidate_ids": discovered_ids,
            },
            "scoring": { "top_scores": top_scores },
            "decision": {
                "type": decision.decision_type.as_str(),
                "target": decision.target,
                "confidence": decision.confidence,
                "reasoning": decision.reasoning,
            },
            "execution_metadata": {
                "node_id": state.current_node,
                "run_id": state.runtime.run_id,
                "step_index": state.runtime.step_index,
            },
        })
    }
}
