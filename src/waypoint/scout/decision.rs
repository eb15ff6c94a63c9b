// SPDX-License-Identifier: MIT

//! Margin-based decision over scored candidates
//!
//! Single-shot classification: each invocation looks at one ranked
//! list and commits to exactly one decision. Re-evaluation only happens
//! because the queue loop runs the scout again at a later step.

use super::candidate::PathCandidate;
use serde::Serialize;
use serde_json::Value;

/// The five decision shapes a scout invocation can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Commit to a single next node
    CommitNext,
    /// Commit to a multi-hop path
    CommitPath,
    /// Defer the choice to a downstream component
    Shortlist,
    /// Pause for external (human) input
    HumanGate,
    /// No viable routing; the run degrades
    Fallback,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::CommitNext => "commit_next",
            DecisionType::CommitPath => "commit_path",
            DecisionType::Shortlist => "shortlist",
            DecisionType::HumanGate => "human_gate",
            DecisionType::Fallback => "fallback",
        }
    }
}

/// Target shape matches the decision type: a single node for
/// commit_next, a list for commit_path/shortlist, none otherwise
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecisionTarget {
    Node(String),
    List(Vec<String>),
    None,
}

/// Terminal output of one scout invocation
#[derive(Debug, Clone, Serialize)]
pub struct ScoutDecision {
    pub decision_type: DecisionType,
    pub target: DecisionTarget,
    pub confidence: f64,
    pub reasoning: String,
    /// Audit trail attached by the pipeline after the decision is made
    pub trace: Value,
}

impl ScoutDecision {
    pub fn new(
        decision_type: DecisionType,
        target: DecisionTarget,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            decision_type,
            target,
            confidence,
            reasoning: reasoning.into(),
            trace: Value::Null,
        }
    }

    pub fn fallback(reasoning: impl Into<String>) -> Self {
        Self::new(DecisionType::Fallback, DecisionTarget::None, 0.0, reasoning)
    }

    pub fn human_gate(reasoning: impl Into<String>) -> Self {
        Self::new(DecisionType::HumanGate, DecisionTarget::None, 0.0, reasoning)
    }
}

/// Converts a ranked candidate list into a [ScoutDecision]
pub struct DecisionEngine {
    commit_margin: f64,
}

impl DecisionEngine {
    pub fn new(commit_margin: f64) -> Self {
        Self { commit_margin }
    }

    /// Decide over beam-limited, descending-sorted candidates
    ///
    /// Self-routing candidates (node_id == `current_agent_id`) are
    /// excluded from the winner comparison but still appear in a
    /// shortlist target.
    pub fn decide(&self, candidates: &[PathCandidate], current_agent_id: &str) -> ScoutDecision {
        if candidates.is_empty() {
            return ScoutDecision::fallback("no candidates");
        }

        let comparable: Vec<&PathCandidate> = candidates
            .iter()
            .filter(|c| c.node_id != current_agent_id)
            .collect();
        if comparable.is_empty() {
            return ScoutDecision::fallback("only self-routing candidates remained");
        }

        let top = comparable[0];
        let runner_up_score = comparable.get(1).map(|c| c.score).unwrap_or(0.0);
        let margin = top.score - runner_up_score;

        if margin >= self.commit_margin {
            if top.is_single_hop() {
                return ScoutDecision::new(
                    DecisionType::CommitNext,
                    DecisionTarget::Node(top.node_id.clone()),
                    1.0,
                    format!(
                        "clear winner: '{}' leads by {:.2} (score {:.2})",
                        top.node_id, margin, top.score
                    ),
                );
            }
            return ScoutDecision::new(
                DecisionType::CommitPath,
                DecisionTarget::List(top.path.clone()),
                top.confidence,
                format!(
                    "clear winner: path via '{}' leads by {:.2} (score {:.2})",
                    top.node_id, margin, top.score
                ),
            );
        }

        let ids: Vec<String> = candidates.iter().map(|c| c.node_id.clone()).collect();
        ScoutDecision::new(
            DecisionType::Shortlist,
            DecisionTarget::List(ids),
            0.0,
            format!(
                "close competition: top margin {:.2} below commit margin {:.2}",
                margin, self.commit_margin
            ),
        )
    }
}
