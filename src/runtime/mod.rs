// SPDX-License-Identifier: MIT

//! Runtime layer - agent and model abstractions
//!
//! This module provides the building blocks the orchestrator composes:
//! - [agent] - the runnable step trait and its result/event types
//! - [model] - LLM client trait and local-runtime implementations
//! - [error] - typed error hierarchy

pub mod agent;
pub mod error;
pub mod model;
