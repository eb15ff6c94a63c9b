// SPDX-License-Identifier: MIT

//! Waypoint product layer
//!
//! - [config] - workflow YAML schema and loader
//! - [graph] - graph snapshots and path discovery
//! - [scout] - the GraphScout routing pipeline
//! - [engine] - queue processor and parallel execution
//! - [agents] - concrete node agent implementations
//! - [telemetry] - error telemetry and report artifacts
//! - [memory] - run-scoped memory backend
//! - [server] - HTTP surface

pub mod agents;
pub mod config;
pub mod engine;
pub mod graph;
pub mod memory;
pub mod scout;
pub mod server;
pub mod telemetry;
