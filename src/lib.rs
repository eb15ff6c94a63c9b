// SPDX-License-Identifier: MIT

//! waypoint-rs - queue-driven orchestration for declarative agent workflows
//!
//! Workflows are YAML files describing a graph of agent nodes. The execution
//! engine walks the graph as a step queue; a GraphScout node can be placed
//! anywhere in the graph to decide the next hop dynamically by discovering,
//! filtering, dry-running and scoring candidate paths.

pub mod runtime;
pub mod waypoint;
