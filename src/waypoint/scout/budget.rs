// SPDX-License-Identifier: MIT

//! Budget filtering and usage tracking for the scout pipeline
//!
//! The controller owns the run's cumulative [BudgetUsage]; everything
//! else reads it through snapshots. Filtering is fail-open: when an
//! estimate cannot be computed the candidate passes with a warning,
//! so a broken cost model never blocks all routing.

use super::candidate::{BudgetAssessment, PathCandidate};
use crate::runtime::model::COST_PER_1K_TOKENS;
use crate::waypoint::config::BudgetLimits;
use crate::waypoint::graph::{GraphState, RemainingBudgets};
use serde::Serialize;

/// Safety buffer applied to token estimates
const TOKEN_BUFFER: f64 = 1.2;
/// Tokens assumed for a node with no declared cost model
const DEFAULT_NODE_TOKENS: u64 = 100;
/// Latency assumed per hop when a candidate carries no measurement
const LATENCY_PER_HOP_MS: u64 = 1000;

/// Cumulative spend for one run
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct BudgetUsage {
    pub tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// Tracks spend against the workflow's limits and filters candidates
/// that would overrun what is left
pub struct BudgetController {
    limits: BudgetLimits,
    usage: BudgetUsage,
}

impl BudgetController {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            usage: BudgetUsage::default(),
        }
    }

    /// Record spend from one completed step
    pub fn update_usage(&mut self, tokens: u64, cost_usd: f64, latency_ms: u64) {
        self.usage.tokens = self.usage.tokens.saturating_add(tokens);
        self.usage.cost_usd += cost_usd;
        self.usage.latency_ms = self.usage.latency_ms.saturating_add(latency_ms);
    }

    pub fn usage_snapshot(&self) -> BudgetUsage {
        self.usage
    }

    /// Headroom left in each category
    pub fn remaining(&self) -> RemainingBudgets {
        RemainingBudgets {
            tokens: self.limits.max_tokens.saturating_sub(self.usage.tokens),
            cost_usd: (self.limits.max_cost_usd - self.usage.cost_usd).max(0.0),
            latency_ms: self
                .limits
                .max_latency_ms
                .saturating_sub(self.usage.latency_ms),
        }
    }

    /// True once any category's spend fraction reaches `threshold`
    pub fn is_exhausted(&self, threshold: f64) -> bool {
        let token_frac = self.usage.tokens as f64 / self.limits.max_tokens.max(1) as f64;
        let cost_frac = self.usage.cost_usd / self.limits.max_cost_usd.max(f64::EPSILON);
        let latency_frac = self.usage.latency_ms as f64 / self.limits.max_latency_ms.max(1) as f64;
        token_frac.max(cost_frac).max(latency_frac) >= threshold
    }

    /// Annotate candidates with budget verdicts and keep the compliant ones
    ///
    /// Each retained candidate carries its assessment, estimated cost and
    /// estimated latency for later scoring. Estimation failures fail open.
    pub fn filter_candidates(
        &self,
        candidates: Vec<PathCandidate>,
        state: &GraphState,
    ) -> Vec<PathCandidate> {
        let remaining = self.remaining();
        let mut kept = Vec::with_capacity(candidates.len());

        for mut c in candidates {
            match self.try_assess(&c, state, &remaining) {
                Ok(assessment) => {
                    c.fits_budget = assessment.is_compliant();
                    c.estimated_cost = assessment.estimated_cost_usd;
                    c.estimated_latency_ms = assessment.estimated_latency_ms;
                    if !c.fits_budget {
                        log::debug!(
                            "candidate '{}' dropped by budget: {}",
                            c.node_id,
                            assessment.violations.join(", ")
                        );
                        c.budget_assessment = Some(assessment);
                        continue;
                    }
                    c.budget_assessment = Some(assessment);
                    kept.push(c);
                }
                Err(reason) => {
                    // fail-open: keep the candidate, do not pretend we assessed it
                    log::warn!(
                        "budget assessment for candidate '{}' failed ({reason}); letting it through",
                        c.node_id
                    );
                    c.fits_budget = true;
                    c.budget_assessment = None;
                    kept.push(c);
                }
            }
        }
        kept
    }

    fn try_assess(
        &self,
        candidate: &PathCandidate,
        state: &GraphState,
        remaining: &RemainingBudgets,
    ) -> Result<BudgetAssessment, String> {
        let mut raw_tokens: u64 = 0;
        for id in &candidate.path {
            let node_tokens = state
                .node(id)
                .map(|n| n.base_tokens)
                .unwrap_or(DEFAULT_NODE_TOKENS);
            raw_tokens = raw_tokens
                .checked_add(node_tokens)
                .ok_or_else(|| format!("token estimate overflow at node '{id}'"))?;
        }

        let estimated_tokens = (raw_tokens as f64 * TOKEN_BUFFER).ceil();
        if !estimated_tokens.is_finite() {
            return Err("token estimate is not finite".to_string());
        }
        let estimated_tokens = estimated_tokens as u64;
        let estimated_cost = estimated_tokens as f64 / 1000.0 * COST_PER_1K_TOKENS;
        let estimated_latency = LATENCY_PER_HOP_MS
            .checked_mul(candidate.path.len() as u64)
            .ok_or("latency estimate overflow")?;

        let mut violations = Vec::new();
        if estimated_tokens > remaining.tokens {
            violations.push(format!(
                "tokens: estimated {estimated_tokens} > remaining {}",
                remaining.tokens
            ));
        }
        if estimated_cost > remaining.cost_usd {
            violations.push(format!(
                "cost: estimated {estimated_cost:.4} USD > remaining {:.4} USD",
                remaining.cost_usd
            ));
        }
        if estimated_latency > remaining.latency_ms {
            violations.push(format!(
                "latency: estimated {estimated_latency}ms > remaining {}ms",
                remaining.latency_ms
            ));
        }

        Ok(BudgetAssessment {
            estimated_tokens,
            estimated_cost_usd: estimated_cost,
            estimated_latency_ms: estimated_latency,
            violations,
        })
    }
}
