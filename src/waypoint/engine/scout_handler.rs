// SPDX-License-Identifier: MIT

//! Maps scout decisions onto the step queue
//!
//! The scout only decides; this handler mutates. Shortlists either go
//! through a pluggable selector or stay unresolved for a downstream
//! router to consume from the scout's output payload.

use crate::waypoint::scout::{DecisionTarget, DecisionType, PathCandidate, ScoutOutcome};
use std::collections::VecDeque;

/// Picks one candidate out of a shortlist
pub type ShortlistSelector = Box<dyn Fn(&[PathCandidate]) -> Option<String> + Send + Sync>;

/// Default selection: the highest-scoring candidate (the list arrives
/// already sorted)
pub fn highest_score_selector() -> ShortlistSelector {
    Box::new(|candidates| candidates.first().map(|c| c.node_id.clone()))
}

/// What applying a decision did to the queue
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedDecision {
    /// These ids were inserted at the front of the queue, in order
    Advanced(Vec<String>),
    /// Shortlist left for a downstream consumer; queue untouched
    Deferred(Vec<String>),
    /// Queue not advanced; the run degrades or pauses
    Paused(String),
}

pub struct GraphScoutHandler {
    defer_shortlist: bool,
    selector: ShortlistSelector,
}

impl GraphScoutHandler {
    pub fn new(defer_shortlist: bool, selector: ShortlistSelector) -> Self {
        Self {
            defer_shortlist,
            selector,
        }
    }

    /// Apply one scout outcome to the queue
    pub fn apply(&self, outcome: &ScoutOutcome, queue: &mut VecDeque<String>) -> AppliedDecision {
        let decision = &outcome.decision;
        match (decision.decision_type, &decision.target) {
            (DecisionType::CommitNext, DecisionTarget::Node(id)) => {
                queue.push_front(id.clone());
                AppliedDecision::Advanced(vec![id.clone()])
            }
            (DecisionType::CommitPath, DecisionTarget::List(path)) => {
                for id in path.iter().rev() {
                    queue.push_front(id.clone());
                }
                AppliedDecision::Advanced(path.clone())
            }
            (DecisionType::Shortlist, DecisionTarget::List(ids)) if ids.is_empty() => {
                AppliedDecision::Paused(decision.reasoning.clone())
            }
            (DecisionType::Shortlist, DecisionTarget::List(ids)) => {
                if self.defer_shortlist {
                    return AppliedDecision::Deferred(ids.clone());
                }
                match (self.selector)(&outcome.shortlist) {
                    Some(id) => {
                        queue.push_front(id.clone());
                        AppliedDecision::Advanced(vec![id])
                    }
                    None => AppliedDecision::Paused("shortlist selector chose nothing".to_string()),
                }
            }
            (DecisionType::HumanGate, _) | (DecisionType::Fallback, _) => {
                AppliedDecision::Paused(decision.reasoning.clone())
            }
            // a malformed decision/target pairing never advances the queue
            (kind, target) => {
                log::error!("decision {kind:?} carried mismatched target {target:?}");
                AppliedDecision::Paused(format!("mismatched decision target for {kind:?}"))
            }
        }
    }
}
