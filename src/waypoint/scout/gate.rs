// SPDX-License-Identifier: MIT

//! Strict boolean admission gates over evaluated candidates
//!
//! Optional layer between dry-run evaluation and scoring. Each enabled
//! criterion must hold for a candidate to reach the scorer; rejected
//! candidates are logged with the criteria they missed.

use super::candidate::PathCandidate;
use crate::waypoint::config::GateSettings;

/// Applies the configured admission criteria
pub struct BooleanGate {
    settings: GateSettings,
}

impl BooleanGate {
    pub fn new(settings: GateSettings) -> Self {
        Self { settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Keep only candidates satisfying every enabled criterion
    pub fn admit_candidates(&self, candidates: Vec<PathCandidate>) -> Vec<PathCandidate> {
        if !self.settings.enabled {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|c| match self.check(c) {
                Ok(()) => true,
                Err(failed) => {
                    log::info!(
                        "candidate '{}' rejected by gate: {}",
                        c.node_id,
                        failed.join(", ")
                    );
                    false
                }
            })
            .collect()
    }

    fn check(&self, candidate: &PathCandidate) -> Result<(), Vec<String>> {
        let mut failed = Vec::new();

        if candidate.confidence < self.settings.min_confidence {
            failed.push(format!(
                "confidence {:.2} < {:.2}",
                candidate.confidence, self.settings.min_confidence
            ));
        }
        if self.settings.require_llm_eval {
            let genuine = candidate
                .llm_evaluation
                .as_ref()
                .map(|e| !e.is_fallback())
                .unwrap_or(false);
            if !genuine {
                failed.push("no successful llm evaluation".to_string());
            }
        }
        if self.settings.require_budget_fit && !candidate.fits_budget {
            failed.push("over budget".to_string());
        }
        if self.settings.forbid_risks && !candidate.risks.is_empty() {
            failed.push(format!("flagged risks: {}", candidate.risks.join("/")));
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(failed)
        }
    }
}
