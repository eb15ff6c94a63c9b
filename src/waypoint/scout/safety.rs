// SPDX-License-Identifier: MIT

//! Safety screening for candidate paths
//!
//! In contrast to budget filtering, safety is fail-closed: a candidate
//! that cannot be cleared is dropped. Invalid user-supplied regexes are
//! the one exception; they degrade to "no match" at compile time so a
//! typo in one pattern does not take the whole workflow down.

use super::candidate::PathCandidate;
use crate::waypoint::config::ScoutSettings;
use crate::waypoint::graph::GraphState;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tags that offset a risky capability on the same node
const OFFSET_TAGS: &[&str] = &["sandboxed", "validated"];

/// Score ceiling once PII shows up in a preview
const PII_CEILING: f64 = 0.05;
/// Score ceiling for domain-sensitive content (medical, legal)
const DOMAIN_CEILING: f64 = 0.5;
/// Score ceiling for a configured blocked pattern match
const BLOCKED_CEILING: f64 = 0.1;
/// Penalty for an unoffset risky capability
const CAPABILITY_PENALTY: f64 = 0.4;
/// Penalty for a path over the configured length limit
const PATH_LENGTH_PENALTY: f64 = 0.2;

static PII_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("ssn", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        (
            "email",
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
        ),
        (
            "card_number",
            Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap(),
        ),
    ]
});

static DOMAIN_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "medical",
            Regex::new(r"(?i)\b(diagnos\w*|prescri\w*|medical|symptom\w*|dosage)\b").unwrap(),
        ),
        (
            "legal",
            Regex::new(r"(?i)\b(lawsuit|attorney|legal advice|liabilit\w*|litigat\w*)\b").unwrap(),
        ),
    ]
});

/// Screens candidates against capability risk, content patterns and
/// path policy, then drops anything under the safety threshold
pub struct SafetyController {
    threshold: f64,
    max_path_length: usize,
    risky_capabilities: Vec<String>,
    blocked: Vec<Regex>,
}

impl SafetyController {
    pub fn new(settings: &ScoutSettings) -> Self {
        let blocked = settings
            .blocked_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    // degrade to "no match" rather than failing the run
                    log::warn!("ignoring invalid blocked pattern '{p}': {e}");
                    None
                }
            })
            .collect();

        Self {
            threshold: settings.safety_threshold,
            max_path_length: settings.max_path_length,
            risky_capabilities: settings.risky_capabilities.clone(),
            blocked,
        }
    }

    /// Annotate candidates with safety scores and risks; drop those
    /// scoring below the threshold
    pub fn assess_candidates(
        &self,
        candidates: Vec<PathCandidate>,
        state: &GraphState,
    ) -> Vec<PathCandidate> {
        let mut kept = Vec::with_capacity(candidates.len());
        for mut c in candidates {
            let (score, risks) = self.assess_one(&c, state);
            c.safety_score = score;
            c.risks = risks;
            if c.safety_score < self.threshold {
                log::info!(
                    "candidate '{}' dropped by safety screening (score {:.2}, risks: {})",
                    c.node_id,
                    c.safety_score,
                    c.risks.join(", ")
                );
                continue;
            }
            kept.push(c);
        }
        kept
    }

    fn assess_one(&self, candidate: &PathCandidate, state: &GraphState) -> (f64, Vec<String>) {
        let mut score: f64 = 1.0;
        let mut risks = Vec::new();

        for (name, re) in PII_PATTERNS.iter() {
            if re.is_match(&candidate.preview) {
                score = score.min(PII_CEILING);
                risks.push(format!("pii:{name}"));
            }
        }
        for (name, re) in DOMAIN_PATTERNS.iter() {
            if re.is_match(&candidate.preview) {
                score = score.min(DOMAIN_CEILING);
                risks.push(format!("sensitive_domain:{name}"));
            }
        }
        for re in &self.blocked {
            if re.is_match(&candidate.preview) {
                score = score.min(BLOCKED_CEILING);
                risks.push(format!("blocked_pattern:{re}"));
            }
        }

        for id in &candidate.path {
            let Some(node) = state.node(id) else { continue };
            let offset = node
                .safety_tags
                .iter()
                .any(|t| OFFSET_TAGS.contains(&t.as_str()));
            for cap in &node.capabilities {
                if self.risky_capabilities.contains(cap) && !offset {
                    score -= CAPABILITY_PENALTY;
                    risks.push(format!("risky_capability:{cap}"));
                }
            }
        }

        if candidate.path.len() > self.max_path_length {
            score -= PATH_LENGTH_PENALTY;
            risks.push("path_too_long".to_string());
        }

        (score.clamp(0.0, 1.0), risks)
    }
}
