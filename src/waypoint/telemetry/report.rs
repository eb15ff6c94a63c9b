// SPDX-License-Identifier: MIT

//! Execution report artifacts
//!
//! One timestamped JSON file per run under the configured log
//! directory, written best-effort: a run that cannot finish still gets
//! whatever telemetry was collected.

use super::{ErrorTelemetry, ExecutionStatus};
use crate::runtime::error::WaypointError;
use chrono::Utc;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Assembled facts of one finished (or abandoned) run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub status: ExecutionStatus,
    pub telemetry: ErrorTelemetry,
    pub meta_report: Value,
    pub execution_logs: Vec<Value>,
    pub steps_attempted: u64,
    pub memory_snapshot: Value,
}

impl RunReport {
    /// Render the full report document
    pub fn to_json(&self) -> Value {
        json!({
            "waypoint_execution_report": {
                "run_id": self.run_id,
                "timestamp": Utc::now().to_rfc3339(),
                "execution_status": self.status.as_str(),
                "error_telemetry": self.telemetry,
                "meta_report": self.meta_report,
                "execution_logs": self.execution_logs,
                "totals": {
                    "steps_attempted": self.steps_attempted,
                    "errors": self.telemetry.errors.len() + self.telemetry.critical_failures.len(),
                    "retries": self.telemetry.total_retries(),
                },
                "agents_with_errors": self.telemetry.agents_with_errors(),
                "memory_snapshot": self.memory_snapshot,
            }
        })
    }
}

/// Writes report artifacts into a log directory
pub struct ReportWriter {
    log_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
        }
    }

    /// Persist the report; returns the file path written
    pub fn write(&self, report: &RunReport) -> Result<PathBuf, WaypointError> {
        fs::create_dir_all(&self.log_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .log_dir
            .join(format!("waypoint_report_{}_{stamp}.json", report.run_id));
        let body = serde_json::to_string_pretty(&report.to_json())?;
        fs::write(&path, body)?;
        log::info!("wrote execution report to {}", path.display());
        Ok(path)
    }
}
