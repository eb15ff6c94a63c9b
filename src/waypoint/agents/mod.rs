// SPDX-License-Identifier: MIT

//! Concrete agent implementations and the factory that builds them
//!
//! Prompt, router and join nodes become [Agent] instances here. Scout
//! and fork nodes are engine-owned: the scout needs the budget
//! controller and graph snapshot, the fork needs the parallel executor,
//! so the queue processor executes those kinds directly.

use crate::runtime::agent::{Agent, AgentKind, StepContext, StepResult};
use crate::runtime::error::WaypointError;
use crate::runtime::model::{client_for_provider, CompletionRequest, LlmClient};
use crate::waypoint::config::{LlmSettings, NodeDefinition, WorkflowDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Renders its template and calls the configured LLM
pub struct PromptAgent {
    id: String,
    template: String,
    client: Arc<dyn LlmClient>,
    settings: LlmSettings,
}

impl PromptAgent {
    pub fn new(
        id: impl Into<String>,
        template: impl Into<String>,
        client: Arc<dyn LlmClient>,
        settings: LlmSettings,
    ) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            client,
            settings,
        }
    }

    /// Substitute `{{input}}` and `{{outputs.<agent_id>}}` placeholders
    fn render(&self, ctx: &StepContext) -> String {
        let mut rendered = self.template.replace("{{input}}", &ctx.input);
        for (agent_id, payload) in &ctx.previous_outputs {
            let placeholder = format!("{{{{outputs.{agent_id}}}}}");
            if rendered.contains(&placeholder) {
                rendered = rendered.replace(&placeholder, &value_to_text(payload));
            }
        }
        rendered
    }
}

#[async_trait]
impl Agent for PromptAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Prompt
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WaypointError> {
        let prompt = self.render(ctx);
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            prompt,
            temperature: self.settings.temperature,
            timeout: Duration::from_millis(self.settings.timeout_ms),
        };
        let response = self.client.complete(&request).await?;

        let mut usage = crate::runtime::model::LlmUsage::default();
        usage.record(&response);

        // JSON answers stay structured; prose becomes a response field
        let payload = match serde_json::from_str::<Value>(response.text.trim()) {
            Ok(v) if v.is_object() => v,
            _ => json!({ "response": response.text }),
        };
        Ok(StepResult::with_usage(payload, usage))
    }
}

/// Maps a value from previous outputs to the next agents to enqueue
pub struct RouterAgent {
    id: String,
    route_key: String,
    routes: HashMap<String, Vec<String>>,
    default_route: Vec<String>,
}

impl RouterAgent {
    pub fn new(
        id: impl Into<String>,
        route_key: impl Into<String>,
        routes: HashMap<String, Vec<String>>,
        default_route: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            route_key: route_key.into(),
            routes,
            default_route,
        }
    }

    /// Follow the dotted route key into previous outputs
    fn resolve_key(&self, ctx: &StepContext) -> Option<String> {
        let mut parts = self.route_key.split('.');
        let agent_id = parts.next()?;
        let mut value = ctx.previous_outputs.get(agent_id)?;
        for part in parts {
            value = value.get(part)?;
        }
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl Agent for RouterAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Router
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WaypointError> {
        let key = self.resolve_key(ctx);
        let (matched, next) = match &key {
            Some(k) => match self.routes.get(k.trim()) {
                Some(targets) => (k.clone(), targets.clone()),
                None => ("default".to_string(), self.default_route.clone()),
            },
            // route source not produced yet: ask to be re-enqueued
            None => return Ok(StepResult::waiting()),
        };

        log::info!("router '{}' matched '{}' -> {:?}", self.id, matched, next);
        Ok(StepResult::completed(json!({
            "matched": matched,
            "next": next,
        })))
    }
}

/// Merges fork branch outputs found in previous outputs
pub struct JoinAgent {
    id: String,
}

impl JoinAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Agent for JoinAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Join
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, WaypointError> {
        let mut merged = serde_json::Map::new();
        for (agent_id, payload) in &ctx.previous_outputs {
            if let Some(branches) = payload.get("branches") {
                if let Some(obj) = branches.as_object() {
                    for (k, v) in obj {
                        merged.insert(k.clone(), v.clone());
                    }
                    merged.insert(format!("{agent_id}_status"), payload["status"].clone());
                }
            }
        }
        if merged.is_empty() {
            // no fork finished yet
            return Ok(StepResult::waiting());
        }
        Ok(StepResult::completed(json!({
            "status": "joined",
            "merged": Value::Object(merged),
        })))
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => match other.get("response").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => other.to_string(),
        },
    }
}

/// Build the runnable agents for every node the queue executes directly
///
/// Scout and fork nodes are skipped; the engine handles those kinds
/// itself.
pub fn build_agents(
    def: &WorkflowDefinition,
) -> Result<HashMap<String, Arc<dyn Agent>>, WaypointError> {
    let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
    for node in &def.nodes {
        match node.kind {
            AgentKind::Prompt => {
                agents.insert(node.id.clone(), Arc::new(build_prompt_agent(def, node)?));
            }
            AgentKind::Router => {
                agents.insert(
                    node.id.clone(),
                    Arc::new(RouterAgent::new(
                        &node.id,
                        node.route_key.clone().unwrap_or_default(),
                        node.routes.clone(),
                        node.default_route.clone(),
                    )),
                );
            }
            AgentKind::Join => {
                agents.insert(node.id.clone(), Arc::new(JoinAgent::new(&node.id)));
            }
            AgentKind::Scout | AgentKind::Fork => {}
        }
    }
    Ok(agents)
}

fn build_prompt_agent(
    def: &WorkflowDefinition,
    node: &NodeDefinition,
) -> Result<PromptAgent, WaypointError> {
    let settings = def
        .llm
        .clone()
        .ok_or_else(|| WaypointError::config(format!("node '{}' has no LLM configured", node.id)))?;
    let client = client_for_provider(&settings.provider, settings.endpoint.as_deref())?;
    Ok(PromptAgent::new(
        &node.id,
        node.prompt.clone().unwrap_or_default(),
        client,
        settings,
    ))
}
