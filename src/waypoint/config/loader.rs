//! Workflow loader - YAML file loading, parsing and validation
//!
//! This module handles loading workflow definitions from YAML files and
//! rejecting definitions the queue processor could not run: unknown entry
//! nodes, duplicate ids, edges into nodes that do not exist, and router or
//! fork nodes missing their kind-specific settings.

use super::types::WorkflowDefinition;
use crate::runtime::agent::AgentKind;
use crate::runtime::error::{WaypointError, WorkflowError};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, WaypointError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse and validate a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, WaypointError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Self::validate(&def)?;
        Ok(def)
    }

    /// Check graph integrity before anything gets queued
    fn validate(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
        let mut ids: HashSet<&str> = HashSet::new();
        for node in &def.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.id.clone()));
            }
        }

        if !ids.contains(def.entry.as_str()) {
            return Err(WorkflowError::UnknownEntry(def.entry.clone()));
        }

        for edge in &def.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::DanglingEdge {
                        src: edge.from.clone(),
                        dst: edge.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        for node in &def.nodes {
            match node.kind {
                AgentKind::Prompt => {
                    if node.prompt.is_none() {
                        return Err(WorkflowError::InvalidNode {
                            node: node.id.clone(),
                            reason: "prompt nodes need a prompt template".to_string(),
                        });
                    }
                    if def.llm.is_none() {
                        return Err(WorkflowError::MissingLlm(node.id.clone()));
                    }
                }
                AgentKind::Router => {
                    if node.route_key.is_none() {
                        return Err(WorkflowError::InvalidNode {
                            node: node.id.clone(),
                            reason: "router nodes need a route_key".to_string(),
                        });
                    }
                    if node.routes.is_empty() && node.default_route.is_empty() {
                        return Err(WorkflowError::InvalidNode {
                            node: node.id.clone(),
                            reason: "router nodes need routes or a default_route".to_string(),
                        });
                    }
                    for target in node.routes.values().flatten().chain(&node.default_route) {
                        if !ids.contains(target.as_str()) {
                            return Err(WorkflowError::InvalidNode {
                                node: node.id.clone(),
                                reason: format!("route targets unknown node '{target}'"),
                            });
                        }
                    }
                }
                AgentKind::Fork => {
                    if node.branches.is_empty() {
                        return Err(WorkflowError::InvalidNode {
                            node: node.id.clone(),
                            reason: "fork nodes need at least one branch".to_string(),
                        });
                    }
                    for member in node.branches.iter().flatten() {
                        if !ids.contains(member.as_str()) {
                            return Err(WorkflowError::InvalidNode {
                                node: node.id.clone(),
                                reason: format!("branch references unknown node '{member}'"),
                            });
                        }
                    }
                }
                AgentKind::Scout if def.scout_llm().is_none() => {
                    return Err(WorkflowError::MissingLlm(node.id.clone()));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
