// SPDX-License-Identifier: MIT

//! Per-run error telemetry
//!
//! One [ErrorTelemetry] value is created at run start, owned by the run
//! context and passed explicitly to whatever needs to record into it.
//! Nothing here is global, so concurrent runs cannot contaminate each
//! other's records.

pub mod report;

pub use report::{ReportWriter, RunReport};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Final verdict on how a run went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Partial,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// One recorded failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub agent_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub step_index: u64,
    pub run_id: String,
}

/// Everything a run accumulated about its own failures
#[derive(Debug, Clone, Serialize)]
pub struct ErrorTelemetry {
    pub errors: Vec<ErrorRecord>,
    pub retry_counters: HashMap<String, u32>,
    pub partial_successes: Vec<String>,
    pub silent_degradations: Vec<String>,
    pub status_codes: HashMap<String, u32>,
    pub critical_failures: Vec<ErrorRecord>,
    pub recovery_actions: Vec<String>,
    pub execution_status: ExecutionStatus,
}

impl ErrorTelemetry {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            retry_counters: HashMap::new(),
            partial_successes: Vec::new(),
            silent_degradations: Vec::new(),
            status_codes: HashMap::new(),
            critical_failures: Vec::new(),
            recovery_actions: Vec::new(),
            execution_status: ExecutionStatus::Completed,
        }
    }

    /// Record a non-fatal failure, optionally with the recovery taken
    /// ("retry", "backoff")
    pub fn record_error(
        &mut self,
        kind: impl Into<String>,
        agent_id: impl Into<String>,
        message: impl Into<String>,
        step_index: u64,
        run_id: impl Into<String>,
        recovery_action: Option<&str>,
    ) {
        let record = ErrorRecord {
            kind: kind.into(),
            agent_id: agent_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            step_index,
            run_id: run_id.into(),
        };
        log::warn!(
            "[{}] {} error at step {}: {}",
            record.agent_id,
            record.kind,
            record.step_index,
            record.message
        );
        if let Some(action) = recovery_action {
            self.recovery_actions
                .push(format!("{}:{}", record.agent_id, action));
        }
        self.errors.push(record);
    }

    /// A failure that exhausted its recovery options
    pub fn record_critical(
        &mut self,
        kind: impl Into<String>,
        agent_id: impl Into<String>,
        message: impl Into<String>,
        step_index: u64,
        run_id: impl Into<String>,
    ) {
        let record = ErrorRecord {
            kind: kind.into(),
            agent_id: agent_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            step_index,
            run_id: run_id.into(),
        };
        log::error!(
            "[{}] critical {} failure at step {}: {}",
            record.agent_id,
            record.kind,
            record.step_index,
            record.message
        );
        self.critical_failures.push(record);
    }

    /// Returns the new retry count for the agent
    pub fn record_retry(&mut self, agent_id: &str) -> u32 {
        let counter = self.retry_counters.entry(agent_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn retries(&self, agent_id: &str) -> u32 {
        self.retry_counters.get(agent_id).copied().unwrap_or(0)
    }

    pub fn record_partial_success(&mut self, detail: impl Into<String>) {
        self.partial_successes.push(detail.into());
    }

    pub fn record_degradation(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("silent degradation: {detail}");
        self.silent_degradations.push(detail);
    }

    pub fn record_status_code(&mut self, code: u16) {
        *self.status_codes.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn total_retries(&self) -> u32 {
        self.retry_counters.values().sum()
    }

    /// Agent ids that recorded at least one error, deduplicated
    pub fn agents_with_errors(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .errors
            .iter()
            .chain(self.critical_failures.iter())
            .map(|e| e.agent_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Settle the final status from what was recorded
    pub fn finalize(&mut self) -> ExecutionStatus {
        self.execution_status = if !self.critical_failures.is_empty() {
            ExecutionStatus::Failed
        } else if !self.partial_successes.is_empty() || !self.errors.is_empty() {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Completed
        };
        self.execution_status
    }
}

impl Default for ErrorTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_run_finalizes_completed() {
        let mut telemetry = ErrorTelemetry::new();
        assert_eq!(telemetry.finalize(), ExecutionStatus::Completed);
    }

    #[test]
    fn test_errors_downgrade_to_partial() {
        let mut telemetry = ErrorTelemetry::new();
        telemetry.record_error("agent", "search", "boom", 2, "run-1", Some("retry"));
        assert_eq!(telemetry.finalize(), ExecutionStatus::Partial);
        assert_eq!(telemetry.recovery_actions, vec!["search:retry".to_string()]);
        assert_eq!(telemetry.errors[0].step_index, 2);
    }

    #[test]
    fn test_critical_failure_means_failed() {
        let mut telemetry = ErrorTelemetry::new();
        telemetry.record_error("agent", "search", "boom", 1, "run-1", None);
        telemetry.record_critical("agent", "search", "retries spent", 3, "run-1");
        assert_eq!(telemetry.finalize(), ExecutionStatus::Failed);
    }

    #[test]
    fn test_retry_counters_per_agent() {
        let mut telemetry = ErrorTelemetry::new();
        assert_eq!(telemetry.record_retry("a"), 1);
        assert_eq!(telemetry.record_retry("a"), 2);
        assert_eq!(telemetry.record_retry("b"), 1);
        assert_eq!(telemetry.retries("a"), 2);
        assert_eq!(telemetry.retries("missing"), 0);
        assert_eq!(telemetry.total_retries(), 3);
    }

    #[test]
    fn test_agents_with_errors_deduplicated() {
        let mut telemetry = ErrorTelemetry::new();
        telemetry.record_error("agent", "search", "one", 1, "run-1", None);
        telemetry.record_error("agent", "search", "two", 2, "run-1", None);
        telemetry.record_critical("agent", "answer", "dead", 3, "run-1");
        assert_eq!(telemetry.agents_with_errors(), vec!["answer", "search"]);
    }

    #[test]
    fn test_status_codes_counted_by_code() {
        let mut telemetry = ErrorTelemetry::new();
        telemetry.record_status_code(503);
        telemetry.record_status_code(503);
        telemetry.record_status_code(429);
        assert_eq!(telemetry.status_codes["503"], 2);
        assert_eq!(telemetry.status_codes["429"], 1);
    }

    #[test]
    fn test_serializes_all_eight_fields() {
        let telemetry = ErrorTelemetry::new();
        let v = serde_json::to_value(&telemetry).unwrap();
        for field in [
            "errors",
            "retry_counters",
            "partial_successes",
            "silent_degradations",
            "status_codes",
            "critical_failures",
            "recovery_actions",
            "execution_status",
        ] {
            assert!(v.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(v["execution_status"], "completed");
    }
}
