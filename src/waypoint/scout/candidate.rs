// SPDX-License-Identifier: MIT

//! Path candidates flowing through the scout pipeline

use super::schema::{PathEvaluation, ValidationResult};
use serde::Serialize;

/// One candidate next-path under consideration
///
/// Created by the introspector, enriched in place by each later stage
/// (budget, safety, dry-run evaluation, scoring) and read-only once it
/// reaches the decision engine. Lives for a single routing decision.
#[derive(Debug, Clone)]
pub struct PathCandidate {
    /// Terminal node of the path
    pub node_id: String,
    /// Hops from the current position, first successor first.
    /// Never contains the current node or an already-visited node.
    pub path: Vec<String>,
    /// Number of hops (== path.len())
    pub depth: usize,
    /// Text shown to the dry-run LLM and screened for unsafe content
    pub preview: String,

    // budget stage
    pub fits_budget: bool,
    pub budget_assessment: Option<BudgetAssessment>,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,

    // safety stage
    pub safety_score: f64,
    pub risks: Vec<String>,

    // dry-run stage
    pub llm_evaluation: Option<PathEvaluation>,
    pub validation: Option<ValidationResult>,

    // scoring stage
    pub confidence: f64,
    pub score: f64,
    pub components: ScoreBreakdown,
}

impl PathCandidate {
    pub fn new(node_id: impl Into<String>, path: Vec<String>, preview: impl Into<String>) -> Self {
        let depth = path.len();
        Self {
            node_id: node_id.into(),
            path,
            depth,
            preview: preview.into(),
            fits_budget: true,
            budget_assessment: None,
            estimated_cost: 0.0,
            estimated_latency_ms: 0,
            safety_score: 1.0,
            risks: Vec::new(),
            llm_evaluation: None,
            validation: None,
            confidence: 0.0,
            score: 0.0,
            components: ScoreBreakdown::default(),
        }
    }

    /// Single-hop candidates can be committed directly by the decision engine
    pub fn is_single_hop(&self) -> bool {
        self.path.len() == 1
    }
}

/// Per-category budget verdict for one candidate
#[derive(Debug, Clone, Serialize)]
pub struct BudgetAssessment {
    pub estimated_tokens: u64,
    pub estimated_cost_usd: f64,
    pub estimated_latency_ms: u64,
    /// Empty when the candidate fits; otherwise one entry per violated
    /// category ("tokens", "cost", "latency") with the numbers involved
    pub violations: Vec<String>,
}

impl BudgetAssessment {
    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Raw sub-scores before weighting, each clamped to [0,1]
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreBreakdown {
    pub llm: f64,
    pub heuristics: f64,
    pub prior: f64,
    pub cost: f64,
    pub latency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_candidate_defaults() {
        let c = PathCandidate::new("b", vec!["b".to_string()], "b: do the thing");
        assert_eq!(c.depth, 1);
        assert!(c.is_single_hop());
        assert!(c.fits_budget);
        assert_eq!(c.safety_score, 1.0);
        assert!(c.llm_evaluation.is_none());
        assert_eq!(c.score, 0.0);
    }

    #[test]
    fn test_multi_hop_depth_tracks_path() {
        let c = PathCandidate::new(
            "c",
            vec!["b".to_string(), "c".to_string()],
            "b then c",
        );
        assert_eq!(c.depth, 2);
        assert!(!c.is_single_hop());
        assert_eq!(c.node_id, "c");
    }

    #[test]
    fn test_budget_assessment_compliance() {
        let ok = BudgetAssessment {
            estimated_tokens: 120,
            estimated_cost_usd: 0.00024,
            estimated_latency_ms: 1000,
            violations: vec![],
        };
        assert!(ok.is_compliant());

        let broke = BudgetAssessment {
            estimated_tokens: 12_000,
            estimated_cost_usd: 0.024,
            estimated_latency_ms: 100_000,
            violations: vec!["tokens: estimated 12000 > remaining 10000".to_string()],
        };
        assert!(!broke.is_compliant());
    }
}
