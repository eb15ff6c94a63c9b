// SPDX-License-Identifier: MIT

//! Immutable graph snapshot consumed by the scout pipeline

use crate::waypoint::config::WorkflowDefinition;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Longest prompt excerpt carried into node summaries
const SUMMARY_MAX_CHARS: usize = 240;

/// Frozen view of one workflow node
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub id: String,
    pub kind: String,
    /// Prompt excerpt used for candidate previews and content screening
    pub summary: Option<String>,
    pub capabilities: Vec<String>,
    pub required_inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Expected tokens for one execution
    pub base_tokens: u64,
    pub safety_tags: Vec<String>,
    pub metadata: HashMap<String, Value>,
}

/// Frozen view of one directed edge
#[derive(Debug, Clone)]
pub struct EdgeDescriptor {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

/// Run identity at the moment of the snapshot
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub run_id: String,
    pub step_index: u64,
}

/// Budget headroom left for the run
#[derive(Debug, Clone, Copy)]
pub struct RemainingBudgets {
    pub tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// Snapshot of the workflow graph at one queue step
///
/// Built fresh for every scout invocation and never mutated afterwards.
/// All scout stages read from it; none write to it.
#[derive(Debug, Clone)]
pub struct GraphState {
    pub nodes: HashMap<String, NodeDescriptor>,
    /// Declaration order preserved; ties in weight keep this order
    pub edges: Vec<EdgeDescriptor>,
    pub current_node: String,
    pub visited: HashSet<String>,
    pub runtime: RuntimeState,
    pub remaining: RemainingBudgets,
    /// Output keys already produced by earlier steps, for readiness scoring
    pub available_inputs: HashSet<String>,
}

impl GraphState {
    /// Freeze the parts of a run the scout pipeline needs
    pub fn snapshot(
        def: &WorkflowDefinition,
        current_node: &str,
        visited: HashSet<String>,
        runtime: RuntimeState,
        remaining: RemainingBudgets,
        available_inputs: HashSet<String>,
    ) -> Self {
        let nodes = def
            .nodes
            .iter()
            .map(|n| {
                let summary = n.prompt.as_ref().map(|p| truncate(p, SUMMARY_MAX_CHARS));
                (
                    n.id.clone(),
                    NodeDescriptor {
                        id: n.id.clone(),
                        kind: n.kind.as_str().to_string(),
                        summary,
                        capabilities: n.capabilities.clone(),
                        required_inputs: n.contract.required_inputs.clone(),
                        outputs: n.contract.outputs.clone(),
                        base_tokens: n.cost.base_tokens,
                        safety_tags: n.safety_tags.clone(),
                        metadata: n.metadata.clone(),
                    },
                )
            })
            .collect();

        let edges = def
            .edges
            .iter()
            .map(|e| EdgeDescriptor {
                from: e.from.clone(),
                to: e.to.clone(),
                weight: e.weight,
            })
            .collect();

        Self {
            nodes,
            edges,
            current_node: current_node.to_string(),
            visited,
            runtime,
            remaining,
            available_inputs,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    /// Outgoing edges of `id`, heaviest first; equal weights keep
    /// declaration order
    pub fn successors(&self, id: &str) -> Vec<&EdgeDescriptor> {
        let mut out: Vec<&EdgeDescriptor> = self.edges.iter().filter(|e| e.from == id).collect();
        out.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        out
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
