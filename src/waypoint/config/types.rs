// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! This module contains all the data structures used for parsing
//! workflow YAML configuration files. Threshold and weight fields carry
//! defaults so that a minimal workflow only declares nodes and edges.

use crate::runtime::agent::AgentKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    /// Nodes in the graph
    pub nodes: Vec<NodeDefinition>,
    /// Directed edges; weight informs scout traversal priority only
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// First agent placed on the queue
    pub entry: String,
    /// LLM used by prompt agents (and by the scout unless it overrides)
    pub llm: Option<LlmSettings>,
    #[serde(default)]
    pub scout: ScoutSettings,
    #[serde(default)]
    pub budgets: BudgetLimits,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

impl WorkflowDefinition {
    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The LLM settings the scout should use (its own block wins)
    pub fn scout_llm(&self) -> Option<&LlmSettings> {
        self.scout.llm.as_ref().or(self.llm.as_ref())
    }
}

/// A node in the workflow graph
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDefinition {
    /// Unique node identifier
    pub id: String,
    pub kind: AgentKind,
    /// Prompt template for prompt nodes; summary text for scout previews
    pub prompt: Option<String>,
    /// Capability tags consumed by safety screening and scoring
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Declared inputs/outputs used for readiness scoring
    #[serde(default)]
    pub contract: NodeContract,
    #[serde(default)]
    pub cost: CostModel,
    /// Tags that offset capability risk (e.g. "sandboxed", "validated")
    #[serde(default)]
    pub safety_tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Router nodes: dotted path into previous outputs (e.g. "classify.intent")
    pub route_key: Option<String>,
    /// Router nodes: route value -> agents to enqueue
    #[serde(default)]
    pub routes: HashMap<String, Vec<String>>,
    /// Router nodes: fallback when no route matches
    #[serde(default)]
    pub default_route: Vec<String>,
    /// Fork nodes: branches of agent ids, each branch runs sequentially
    #[serde(default)]
    pub branches: Vec<Vec<String>>,
}

/// Declared inputs and outputs of a node
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct NodeContract {
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Static cost model for a node
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CostModel {
    /// Expected tokens for one execution of this node
    #[serde(default = "default_base_tokens")]
    pub base_tokens: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            base_tokens: default_base_tokens(),
        }
    }
}

fn default_base_tokens() -> u64 {
    100
}

/// Directed edge between two nodes
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// LLM provider settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmSettings {
    /// "ollama" or "lmstudio"
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    /// Base URL; falls back to provider env var, then localhost
    pub endpoint: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_llm_timeout_ms() -> u64 {
    30_000
}

/// GraphScout tuning block
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScoutSettings {
    /// Max candidates kept after scoring
    #[serde(default = "default_k_beam")]
    pub k_beam: usize,
    /// Max hops explored from the current node
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum score gap to commit instead of shortlisting
    #[serde(default = "default_commit_margin")]
    pub commit_margin: f64,
    /// Candidates scoring below this are dropped (fail-closed)
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: f64,
    #[serde(default)]
    pub score_weights: ScoreWeights,
    /// Paths longer than this are flagged by safety screening
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,
    /// Floor for the input-readiness heuristic
    #[serde(default = "default_readiness_floor")]
    pub readiness_floor: f64,
    /// Normalizers for the cost/latency score components
    #[serde(default = "default_score_max_cost")]
    pub max_cost_usd: f64,
    #[serde(default = "default_score_max_latency")]
    pub max_latency_ms: u64,
    /// Path length considered ideal by the keyword heuristic
    #[serde(default = "default_optimal_path_length")]
    pub optimal_path_length: usize,
    /// Budget usage fraction at which the scout pauses routing
    #[serde(default = "default_exhaustion_threshold")]
    pub exhaustion_threshold: f64,
    /// Capabilities treated as risky unless offset by safety tags
    #[serde(default = "default_risky_capabilities")]
    pub risky_capabilities: Vec<String>,
    /// Regex patterns that flag candidate previews
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    /// Optional strict boolean admission gates
    pub gates: Option<GateSettings>,
    /// Overrides the workflow-level LLM for dry-run evaluation
    pub llm: Option<LlmSettings>,
}

impl Default for ScoutSettings {
    fn default() -> Self {
        Self {
            k_beam: default_k_beam(),
            max_depth: default_max_depth(),
            commit_margin: default_commit_margin(),
            safety_threshold: default_safety_threshold(),
            score_weights: ScoreWeights::default(),
            max_path_length: default_max_path_length(),
            readiness_floor: default_readiness_floor(),
            max_cost_usd: default_score_max_cost(),
            max_latency_ms: default_score_max_latency(),
            optimal_path_length: default_optimal_path_length(),
            exhaustion_threshold: default_exhaustion_threshold(),
            risky_capabilities: default_risky_capabilities(),
            blocked_patterns: Vec::new(),
            gates: None,
            llm: None,
        }
    }
}

fn default_k_beam() -> usize {
    3
}

fn default_max_depth() -> usize {
    2
}

fn default_commit_margin() -> f64 {
    0.15
}

fn default_safety_threshold() -> f64 {
    0.2
}

fn default_max_path_length() -> usize {
    4
}

fn default_readiness_floor() -> f64 {
    0.3
}

fn default_score_max_cost() -> f64 {
    1.0
}

fn default_score_max_latency() -> u64 {
    30_000
}

fn default_optimal_path_length() -> usize {
    2
}

fn default_exhaustion_threshold() -> f64 {
    0.95
}

fn default_risky_capabilities() -> Vec<String> {
    vec![
        "code_execution".to_string(),
        "file_write".to_string(),
        "shell_access".to_string(),
    ]
}

/// Weights of the five scoring components
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ScoreWeights {
    #[serde(default = "default_w_llm")]
    pub llm: f64,
    #[serde(default = "default_w_heuristics")]
    pub heuristics: f64,
    #[serde(default = "default_w_prior")]
    pub prior: f64,
    #[serde(default = "default_w_cost")]
    pub cost: f64,
    #[serde(default = "default_w_latency")]
    pub latency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            llm: default_w_llm(),
            heuristics: default_w_heuristics(),
            prior: default_w_prior(),
            cost: default_w_cost(),
            latency: default_w_latency(),
        }
    }
}

fn default_w_llm() -> f64 {
    0.45
}

fn default_w_heuristics() -> f64 {
    0.20
}

fn default_w_prior() -> f64 {
    0.20
}

fn default_w_cost() -> f64 {
    0.10
}

fn default_w_latency() -> f64 {
    0.05
}

/// Boolean admission gates applied between evaluation and scoring
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GateSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Candidate confidence must reach this value
    #[serde(default)]
    pub min_confidence: f64,
    /// Candidate must carry a successful dry-run evaluation
    #[serde(default)]
    pub require_llm_eval: bool,
    /// Candidate must have passed budget assessment
    #[serde(default)]
    pub require_budget_fit: bool,
    /// Candidate must carry no flagged risks
    #[serde(default)]
    pub forbid_risks: bool,
}

/// Remaining-resource limits for one run
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct BudgetLimits {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_cost_usd: default_max_cost_usd(),
            max_latency_ms: default_max_latency_ms(),
        }
    }
}

fn default_max_tokens() -> u64 {
    10_000
}

fn default_max_cost_usd() -> f64 {
    1.0
}

fn default_max_latency_ms() -> u64 {
    120_000
}

/// Queue processor settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecutionSettings {
    /// Retries allowed per agent before it counts as a critical failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-branch deadline for fork groups
    #[serde(default = "default_fork_timeout_ms")]
    pub fork_timeout_ms: u64,
    /// Directory for report artifacts
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Hard ceiling on queue steps per run
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Leave shortlists for a downstream router instead of auto-selecting
    #[serde(default)]
    pub defer_shortlist: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            fork_timeout_ms: default_fork_timeout_ms(),
            log_dir: default_log_dir(),
            max_steps: default_max_steps(),
            defer_shortlist: false,
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_fork_timeout_ms() -> u64 {
    30_000
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_max_steps() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scout_settings_defaults() {
        let settings = ScoutSettings::default();
        assert_eq!(settings.k_beam, 3);
        assert_eq!(settings.max_depth, 2);
        assert!((settings.commit_margin - 0.15).abs() < f64::EPSILON);
        assert!((settings.safety_threshold - 0.2).abs() < f64::EPSILON);
        assert!(settings
            .risky_capabilities
            .contains(&"code_execution".to_string()));
    }

    #[test]
    fn test_score_weights_default_to_documented_blend() {
        let w = ScoreWeights::default();
        assert!((w.llm - 0.45).abs() < f64::EPSILON);
        assert!((w.heuristics - 0.20).abs() < f64::EPSILON);
        assert!((w.prior - 0.20).abs() < f64::EPSILON);
        assert!((w.cost - 0.10).abs() < f64::EPSILON);
        assert!((w.latency - 0.05).abs() < f64::EPSILON);
        assert!((w.llm + w.heuristics + w.prior + w.cost + w.latency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_budget_limits_defaults() {
        let limits = BudgetLimits::default();
        assert_eq!(limits.max_tokens, 10_000);
        assert_eq!(limits.max_latency_ms, 120_000);
    }

    #[test]
    fn test_scout_llm_prefers_scout_block() {
        let mut def = WorkflowDefinition {
            name: "t".to_string(),
            description: "t".to_string(),
            nodes: vec![],
            edges: vec![],
            entry: "a".to_string(),
            llm: Some(LlmSettings {
                provider: "ollama".to_string(),
                model: "llama3".to_string(),
                endpoint: None,
                temperature: 0.1,
                timeout_ms: 1000,
            }),
            scout: ScoutSettings::default(),
            budgets: BudgetLimits::default(),
            execution: ExecutionSettings::default(),
        };

        assert_eq!(def.scout_llm().unwrap().model, "llama3");

        def.scout.llm = Some(LlmSettings {
            provider: "lmstudio".to_string(),
            model: "qwen".to_string(),
            endpoint: None,
            temperature: 0.2,
            timeout_ms: 1000,
        });
        assert_eq!(def.scout_llm().unwrap().model, "qwen");
    }
}
