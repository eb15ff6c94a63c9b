// SPDX-License-Identifier: MIT

//! Read-only graph snapshots and candidate path discovery
//!
//! The queue processor owns the live run state; before each routing
//! decision it freezes the parts the scout needs into a [GraphState]
//! and hands that to the [GraphIntrospector]. Nothing in this module
//! mutates orchestrator state.

pub mod introspector;
pub mod state;

pub use introspector::GraphIntrospector;
pub use state::{EdgeDescriptor, GraphState, NodeDescriptor, RemainingBudgets, RuntimeState};
