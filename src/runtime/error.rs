// SPDX-License-Identifier: MIT

//! Typed error handling for waypoint-rs
//!
//! Transport errors carry their own type so the queue layer can tell a
//! recoverable provider hiccup from a workflow defect. Parse and estimation
//! failures inside the scout pipeline are handled locally with fallback
//! values and never appear here.

use thiserror::Error;

/// Top-level error type for waypoint-rs
#[derive(Debug, Error)]
pub enum WaypointError {
    /// Configuration errors (missing env vars, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow definition errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// LLM transport errors (connection, timeout, HTTP status)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An agent step failed while executing
    #[error("Agent '{agent_id}' failed: {message}")]
    Agent { agent_id: String, message: String },

    /// Retry budget for an agent is spent
    #[error("Agent '{agent_id}' exceeded max retries ({limit})")]
    MaxRetries { agent_id: String, limit: u32 },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Workflow definition errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Entry node missing or not declared in the node list
    #[error("Entry node '{0}' is not defined")]
    UnknownEntry(String),

    /// Two nodes share an id
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// An edge references a node that does not exist
    #[error("Edge {src} -> {dst} references unknown node '{missing}'")]
    DanglingEdge {
        src: String,
        dst: String,
        missing: String,
    },

    /// A node needs an LLM but none is configured
    #[error("Node '{0}' requires an LLM but the workflow configures none")]
    MissingLlm(String),

    /// A node's kind-specific settings are incomplete
    #[error("Node '{node}' is invalid: {reason}")]
    InvalidNode { node: String, reason: String },

    /// Workflow file not found
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

/// LLM transport errors
///
/// Display output is part of the contract: connection failures contain
/// "connection error" and deadline failures contain "timeout" so callers
/// can classify on the message alone.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider endpoint could not be reached
    #[error("connection error talking to {provider}: {message}")]
    Connection { provider: String, message: String },

    /// The provider did not answer within the configured deadline
    #[error("timeout after {elapsed_ms}ms waiting for {provider}")]
    Timeout { provider: String, elapsed_ms: u64 },

    /// The provider answered with a non-success HTTP status
    #[error("HTTP {status} from {provider}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
}

impl TransportError {
    /// HTTP status code when this is an [TransportError::Http] error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl WaypointError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an agent failure error
    pub fn agent(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for WaypointError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for WaypointError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
