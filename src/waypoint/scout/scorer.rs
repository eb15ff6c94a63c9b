// SPDX-License-Identifier: MIT

//! Composite scoring and beam truncation for candidate paths
//!
//! Five components, each clamped to [0,1] before weighting: the LLM's
//! relevance judgment (or a keyword heuristic when no judgment exists),
//! an input-readiness/safety blend, a historical prior, and inverse
//! normalized cost and latency. The sort is stable, so ties keep the
//! introspector's discovery order.

use super::candidate::{PathCandidate, ScoreBreakdown};
use crate::waypoint::config::ScoutSettings;
use crate::waypoint::graph::GraphState;
use std::collections::HashMap;

/// Boost when a terminal node capability shows up in the question
const CAPABILITY_BOOST: f64 = 0.2;
/// Penalty per hop past the optimal path length
const LONG_PATH_PENALTY: f64 = 0.1;
/// Prior when no historical signal exists for a node
const NEUTRAL_PRIOR: f64 = 0.5;

/// Weighted scorer over enriched candidates
pub struct PathScorer {
    settings: ScoutSettings,
}

impl PathScorer {
    pub fn new(settings: ScoutSettings) -> Self {
        Self { settings }
    }

    /// Score, rank and beam-limit candidates
    ///
    /// Output is sorted descending by score and truncated to `k_beam`.
    /// `priors` maps node id to historical success rate.
    pub fn score_candidates(
        &self,
        mut candidates: Vec<PathCandidate>,
        question: &str,
        state: &GraphState,
        priors: &HashMap<String, f64>,
    ) -> Vec<PathCandidate> {
        let weights = &self.settings.score_weights;

        for c in candidates.iter_mut() {
            let breakdown = ScoreBreakdown {
                llm: self.llm_component(c, question, state).clamp(0.0, 1.0),
                heuristics: self.heuristic_component(c, state).clamp(0.0, 1.0),
                prior: priors
                    .get(&c.node_id)
                    .copied()
                    .unwrap_or(NEUTRAL_PRIOR)
                    .clamp(0.0, 1.0),
                cost: self.cost_component(c).clamp(0.0, 1.0),
                latency: self.latency_component(c).clamp(0.0, 1.0),
            };

            c.score = (weights.llm * breakdown.llm
                + weights.heuristics * breakdown.heuristics
                + weights.prior * breakdown.prior
                + weights.cost * breakdown.cost
                + weights.latency * breakdown.latency)
                .clamp(0.0, 1.0);
            c.components = breakdown;
        }

        // stable: equal scores keep discovery order
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(self.settings.k_beam);
        candidates
    }

    /// LLM relevance when the dry run ran; keyword matching otherwise
    fn llm_component(&self, candidate: &PathCandidate, question: &str, state: &GraphState) -> f64 {
        if let Some(eval) = &candidate.llm_evaluation {
            if !eval.is_fallback() {
                return eval.relevance_score;
            }
        }
        self.keyword_heuristic(candidate, question, state)
    }

    fn keyword_heuristic(&self, candidate: &PathCandidate, question: &str, state: &GraphState) -> f64 {
        let question_words: Vec<String> = question
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| w.len() > 2)
            .collect();
        if question_words.is_empty() {
            return NEUTRAL_PRIOR;
        }

        let haystack = candidate.preview.to_lowercase();
        let matched = question_words.iter().filter(|w| haystack.contains(*w)).count();
        let mut score = matched as f64 / question_words.len() as f64;

        if let Some(node) = state.node(&candidate.node_id) {
            let capability_hit = node
                .capabilities
                .iter()
                .any(|cap| question_words.iter().any(|w| cap.to_lowercase().contains(w)));
            if capability_hit {
                score += CAPABILITY_BOOST;
            }
        }

        if candidate.path.len() > self.settings.optimal_path_length {
            let over = (candidate.path.len() - self.settings.optimal_path_length) as f64;
            score -= over * LONG_PATH_PENALTY;
        }
        score
    }

    /// Blend of input readiness and safety fit
    fn heuristic_component(&self, candidate: &PathCandidate, state: &GraphState) -> f64 {
        let readiness = match state.node(&candidate.node_id) {
            Some(node) if !node.required_inputs.is_empty() => {
                let present = node
                    .required_inputs
                    .iter()
                    .filter(|i| state.available_inputs.contains(*i))
                    .count();
                let fraction = present as f64 / node.required_inputs.len() as f64;
                fraction.max(self.settings.readiness_floor)
            }
            _ => 1.0,
        };
        (readiness + candidate.safety_score) / 2.0
    }

    fn cost_component(&self, candidate: &PathCandidate) -> f64 {
        if self.settings.max_cost_usd <= 0.0 {
            return NEUTRAL_PRIOR;
        }
        1.0 - candidate.estimated_cost / self.settings.max_cost_usd
    }

    fn latency_component(&self, candidate: &PathCandidate) -> f64 {
        if self.settings.max_latency_ms == 0 {
            return NEUTRAL_PRIOR;
        }
        1.0 - candidate.estimated_latency_ms as f64 / self.settings.max_latency_ms as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::graph::state::{NodeDescriptor, RemainingBudgets, RuntimeState};
    use crate::waypoint::scout::schema::PathEvaluation;
    use std::collections::HashSet;

    fn node(id: &str, capabilities: &[&str], required_inputs: &[&str]) -> NodeDescriptor {
        NodeDescriptor {
            id: id.to_string(),
            kind: "prompt".to_string(),
            summary: None,
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            required_inputs: required_inputs.iter().map(|s| s.to_string()).collect(),
            outputs: vec![],
            base_tokens: 100,
            safety_tags: vec![],
            metadata: HashMap::new(),
        }
    }

    fn state_with(nodes: Vec<NodeDescriptor>, available: &[&str]) -> GraphState {
        GraphState {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            edges: vec![],
            current_node: "start".to_string(),
            visited: HashSet::new(),
            runtime: RuntimeState {
                run_id: "run-1".to_string(),
                step_index: 0,
            },
            remaining: RemainingBudgets {
                tokens: 10_000,
                cost_usd: 1.0,
                latency_ms: 120_000,
            },
            available_inputs: available.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn candidate(path: &[&str], preview: &str) -> PathCandidate {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        PathCandidate::new(path.last().unwrap().clone(), path, preview)
    }

    fn evaluation(relevance: f64) -> PathEvaluation {
        PathEvaluation {
            relevance_score: relevance,
            confidence: 0.9,
            reasoning: "test".to_string(),
            complexity: "low".to_string(),
            risk_factors: vec![],
        }
    }

    #[test]
    fn test_scores_in_unit_range_sorted_and_beam_limited() {
        let state = state_with(
            vec![node("a", &[], &[]), node("b", &[], &[]), node("c", &[], &[]), node("d", &[], &[])],
            &[],
        );
        let mut settings = ScoutSettings::default();
        settings.k_beam = 3;
        let scorer = PathScorer::new(settings);

        let mut candidates = vec![
            candidate(&["a"], "a"),
            candidate(&["b"], "b"),
            candidate(&["c"], "c"),
            candidate(&["d"], "d"),
        ];
        candidates[0].llm_evaluation = Some(evaluation(0.2));
        candidates[1].llm_evaluation = Some(evaluation(0.9));
        candidates[2].llm_evaluation = Some(evaluation(0.5));
        candidates[3].llm_evaluation = Some(evaluation(0.7));

        let scored = scorer.score_candidates(candidates, "question", &state, &HashMap::new());

        assert_eq!(scored.len(), 3);
        for pair in scored.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for c in &scored {
            assert!((0.0..=1.0).contains(&c.score));
            assert!((0.0..=1.0).contains(&c.components.llm));
        }
        assert_eq!(scored[0].node_id, "b");
    }

    #[test]
    fn test_keyword_fallback_when_no_evaluation() {
        let state = state_with(vec![node("web", &["search"], &[])], &[]);
        let scorer = PathScorer::new(ScoutSettings::default());

        let scored = scorer.score_candidates(
            vec![candidate(&["web"], "web: search the internet for papers")],
            "search for recent papers",
            &state,
            &HashMap::new(),
        );

        // keyword overlap plus capability boost, no LLM evaluation present
        assert!(scored[0].components.llm > 0.5);
    }

    #[test]
    fn test_long_path_penalized_by_keyword_heuristic() {
        let state = state_with(
            vec![node("a", &[], &[]), node("b", &[], &[]), node("c", &[], &[]), node("d", &[], &[])],
            &[],
        );
        let scorer = PathScorer::new(ScoutSettings::default());

        let short = scorer.score_candidates(
            vec![candidate(&["a"], "fetch data")],
            "fetch data",
            &state,
            &HashMap::new(),
        );
        let long = scorer.score_candidates(
            vec![candidate(&["a", "b", "c", "d"], "fetch data")],
            "fetch data",
            &state,
            &HashMap::new(),
        );
        assert!(long[0].components.llm < short[0].components.llm);
    }

    #[test]
    fn test_readiness_uses_available_inputs_with_floor() {
        let nodes = vec![
            node("ready", &[], &["intent"]),
            node("starved", &[], &["embedding", "intent"]),
        ];
        let state = state_with(nodes, &["intent"]);
        let scorer = PathScorer::new(ScoutSettings::default());

        let scored = scorer.score_candidates(
            vec![candidate(&["ready"], "ready"), candidate(&["starved"], "starved")],
            "q",
            &state,
            &HashMap::new(),
        );

        let ready = scored.iter().find(|c| c.node_id == "ready").unwrap();
        let starved = scored.iter().find(|c| c.node_id == "starved").unwrap();
        // ready: (1.0 + 1.0) / 2; starved: (0.5 + 1.0) / 2
        assert!((ready.components.heuristics - 1.0).abs() < 1e-9);
        assert!((starved.components.heuristics - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_readiness_floor_applies() {
        let state = state_with(vec![node("starved", &[], &["a", "b", "c"])], &[]);
        let scorer = PathScorer::new(ScoutSettings::default());

        let scored = scorer.score_candidates(
            vec![candidate(&["starved"], "starved")],
            "q",
            &state,
            &HashMap::new(),
        );
        // zero readiness clamps up to the 0.3 floor, blended with safety 1.0
        assert!((scored[0].components.heuristics - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_prior_defaults_neutral() {
        let state = state_with(vec![node("a", &[], &[]), node("b", &[], &[])], &[]);
        let scorer = PathScorer::new(ScoutSettings::default());

        let mut priors = HashMap::new();
        priors.insert("a".to_string(), 0.95);

        let scored = scorer.score_candidates(
            vec![candidate(&["a"], "a"), candidate(&["b"], "b")],
            "q",
            &state,
            &priors,
        );
        let a = scored.iter().find(|c| c.node_id == "a").unwrap();
        let b = scored.iter().find(|c| c.node_id == "b").unwrap();
        assert!((a.components.prior - 0.95).abs() < 1e-9);
        assert!((b.components.prior - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_cheaper_and_faster_scores_higher() {
        let state = state_with(vec![node("cheap", &[], &[]), node("dear", &[], &[])], &[]);
        let scorer = PathScorer::new(ScoutSettings::default());

        let mut cheap = candidate(&["cheap"], "x");
        cheap.estimated_cost = 0.01;
        cheap.estimated_latency_ms = 1000;
        let mut dear = candidate(&["dear"], "x");
        dear.estimated_cost = 0.9;
        dear.estimated_latency_ms = 29_000;

        let scored = scorer.score_candidates(vec![cheap, dear], "q", &state, &HashMap::new());
        let cheap = scored.iter().find(|c| c.node_id == "cheap").unwrap();
        let dear = scored.iter().find(|c| c.node_id == "dear").unwrap();
        assert!(cheap.components.cost > dear.components.cost);
        assert!(cheap.components.latency > dear.components.latency);
        assert!(cheap.score > dear.score);
    }

    #[test]
    fn test_fallback_evaluation_defers_to_keywords() {
        let state = state_with(vec![node("a", &[], &[])], &[]);
        let scorer = PathScorer::new(ScoutSettings::default());

        let mut c = candidate(&["a"], "a: summarize findings");
        c.llm_evaluation = Some(PathEvaluation::fallback("timeout"));

        let scored = scorer.score_candidates(vec![c], "summarize findings", &state, &HashMap::new());
        // fallback judgment is ignored in favor of the keyword match
        assert!(scored[0].components.llm > 0.3);
    }
}
