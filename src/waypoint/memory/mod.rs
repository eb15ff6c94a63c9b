// SPDX-License-Identifier: MIT

//! Run-scoped memory backend
//!
//! The engine talks to memory through [MemoryBackend]: historical
//! success rates feed the scorer's prior component, run-keyed counters
//! track fork-group completion, and finished runs persist their report
//! and trace here. Only the in-process implementation ships; the
//! backend selector exists so another store can slot in behind the same
//! trait.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name of the env var selecting the backend implementation
pub const BACKEND_ENV: &str = "WAYPOINT_MEMORY_BACKEND";
/// Name of the env var enabling memory decay in backends that support it
pub const DECAY_ENV: &str = "WAYPOINT_MEMORY_DECAY";

/// Narrow contract between the engine and whatever stores run history
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Record one node execution outcome
    async fn record_outcome(&self, node_id: &str, success: bool);

    /// Historical success rate for a node, if any outcomes exist
    async fn success_rate(&self, node_id: &str) -> Option<f64>;

    /// Atomically bump a counter keyed by run id; returns the new value
    async fn increment_counter(&self, run_id: &str, key: &str) -> u64;

    async fn persist_report(&self, run_id: &str, report: Value);

    async fn persist_trace(&self, run_id: &str, trace: Value);

    async fn get_report(&self, run_id: &str) -> Option<Value>;

    /// Point-in-time view for report artifacts
    async fn snapshot(&self) -> Value;

    /// Release held resources; safe to call more than once
    async fn close(&self);
}

#[derive(Default)]
struct Outcomes {
    successes: u64,
    attempts: u64,
}

/// In-process backend over tokio-guarded maps
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    outcomes: Arc<RwLock<HashMap<String, Outcomes>>>,
    counters: Arc<RwLock<HashMap<String, u64>>>,
    reports: Arc<RwLock<HashMap<String, Value>>>,
    traces: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn record_outcome(&self, node_id: &str, success: bool) {
        let mut outcomes = self.outcomes.write().await;
        let entry = outcomes.entry(node_id.to_string()).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }

    async fn success_rate(&self, node_id: &str) -> Option<f64> {
        let outcomes = self.outcomes.read().await;
        outcomes
            .get(node_id)
            .filter(|o| o.attempts > 0)
            .map(|o| o.successes as f64 / o.attempts as f64)
    }

    async fn increment_counter(&self, run_id: &str, key: &str) -> u64 {
        let mut counters = self.counters.write().await;
        let entry = counters.entry(format!("{run_id}:{key}")).or_insert(0);
        *entry += 1;
        *entry
    }

    async fn persist_report(&self, run_id: &str, report: Value) {
        self.reports.write().await.insert(run_id.to_string(), report);
    }

    async fn persist_trace(&self, run_id: &str, trace: Value) {
        self.traces
            .write()
            .await
            .entry(run_id.to_string())
            .or_default()
            .push(trace);
    }

    async fn get_report(&self, run_id: &str) -> Option<Value> {
        self.reports.read().await.get(run_id).cloned()
    }

    async fn snapshot(&self) -> Value {
        let outcomes = self.outcomes.read().await;
        let rates: HashMap<String, f64> = outcomes
            .iter()
            .filter(|(_, o)| o.attempts > 0)
            .map(|(id, o)| (id.clone(), o.successes as f64 / o.attempts as f64))
            .collect();
        let counters = self.counters.read().await;
        json!({
            "success_rates": rates,
            "counters": counters.clone(),
            "stored_reports": self.reports.read().await.len(),
            "stored_traces": self.traces.read().await.len(),
        })
    }

    async fn close(&self) {
        log::debug!("closing in-memory backend");
    }
}

/// Build the backend named by `WAYPOINT_MEMORY_BACKEND`
///
/// Unknown names warn and fall back to the in-process store. The decay
/// flag is acknowledged but carries no semantics here.
pub fn backend_from_env() -> Arc<dyn MemoryBackend> {
    let name = std::env::var(BACKEND_ENV).unwrap_or_else(|_| "memory".to_string());
    if name != "memory" {
        log::warn!("unknown memory backend '{name}'; falling back to in-process store");
    }
    if std::env::var(DECAY_ENV).map(|v| v == "1" || v == "true").unwrap_or(false) {
        log::info!("memory decay requested; the in-process store does not decay");
    }
    Arc::new(InMemoryBackend::new())
}
