//! Breadth-first path discovery over a graph snapshot

use super::state::GraphState;
use crate::waypoint::scout::candidate::PathCandidate;
use std::collections::HashSet;

/// Longest preview text attached to a discovered candidate
const PREVIEW_MAX_CHARS: usize = 240;

/// Walks the graph outward from the current node and proposes paths
///
/// Pure discovery: no filtering beyond the structural exclusions
/// (current node, visited nodes, revisits within one path). Capping
/// happens later through the beam width.
pub struct GraphIntrospector {
    max_depth: usize,
}

impl GraphIntrospector {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Discover candidate paths up to `max_depth` hops out
    ///
    /// Emits one candidate per reachable node per depth level, so a
    /// 1-hop candidate and a 2-hop candidate ending on the same node
    /// can coexist. An empty or malformed snapshot yields an empty
    /// list rather than an error.
    pub fn discover_paths(&self, state: &GraphState) -> Vec<PathCandidate> {
        let mut candidates = Vec::new();
        let mut seen: HashSet<(String, usize)> = HashSet::new();
        let mut frontier: Vec<Vec<String>> = vec![Vec::new()];

        for depth in 1..=self.max_depth {
            let mut next_frontier = Vec::new();
            for path in &frontier {
                let tail = path
                    .last()
                    .map(String::as_str)
                    .unwrap_or(state.current_node.as_str());
                for edge in state.successors(tail) {
                    let target = edge.to.as_str();
                    if target == state.current_node
                        || state.visited.contains(target)
                        || path.iter().any(|hop| hop == target)
                    {
                        continue;
                    }
                    // edges into undeclared nodes are skipped, not fatal
                    if state.node(target).is_none() {
                        continue;
                    }
                    if !seen.insert((target.to_string(), depth)) {
                        continue;
                    }
                    let mut next_path = path.clone();
                    next_path.push(target.to_string());
                    candidates.push(PathCandidate::new(
                        target,
                        next_path.clone(),
                        path_preview(state, &next_path),
                    ));
                    next_frontier.push(next_path);
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        log::debug!(
            "discovered {} candidate path(s) from '{}' (max_depth {})",
            candidates.len(),
            state.current_node,
            self.max_depth
        );
        candidates
    }
}

/// Human-readable sketch of a path, built from node summaries
fn path_preview(state: &GraphState, path: &[String]) -> String {
    let mut parts = Vec::with_capacity(path.len());
    for id in path {
        match state.node(id).and_then(|n| n.summary.as_deref()) {
            Some(summary) => parts.push(format!("{id}: {summary}")),
            None => parts.push(id.clone()),
        }
    }
    let preview = parts.join(" -> ");
    if preview.chars().count() > PREVIEW_MAX_CHARS {
        preview.chars().take(PREVIEW_MAX_CHARS).collect()
    } else {
        preview
    }
}
