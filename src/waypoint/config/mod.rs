// SPDX-License-Identifier: MIT

//! Workflow configuration - YAML schema types and loader

pub mod loader;
pub mod types;

pub use loader::WorkflowLoader;
pub use types::{
    BudgetLimits, CostModel, EdgeDefinition, ExecutionSettings, GateSettings, LlmSettings,
    NodeContract, NodeDefinition, ScoreWeights, ScoutSettings, WorkflowDefinition,
};
