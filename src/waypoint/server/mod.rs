// SPDX-License-Identifier: MIT

//! HTTP surface for browsing workflows and launching runs
//!
//! Runs share one memory backend so reports stay retrievable after the
//! run finishes. Streaming runs relay engine step events over SSE.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::runtime::agent::StepEvent;
use crate::waypoint::config::WorkflowLoader;
use crate::waypoint::engine::Engine;
use crate::waypoint::memory::MemoryBackend;

#[derive(Clone)]
struct AppState {
    memory: Arc<dyn MemoryBackend>,
    workflow_dir: PathBuf,
}

pub async fn serve(
    port: u16,
    workflow_dir: impl Into<PathBuf>,
    memory: Arc<dyn MemoryBackend>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState {
        memory,
        workflow_dir: workflow_dir.into(),
    };

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/runs", post(create_run))
        .route("/api/runs/{id}/report", get(get_report))
        .route("/api/runs/stream", post(stream_run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    let mut workflows = Vec::new();
    if let Ok(mut entries) = fs::read_dir(&state.workflow_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
            {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    workflows.push(json!({
                        "id": stem,
                        "name": stem,
                        "file": path.to_string_lossy()
                    }));
                }
            }
        }
    }
    Json(json!(workflows))
}

async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let path = workflow_path(&state.workflow_dir, &id);
    let Some(path) = path else {
        return Json(json!({"error": "Workflow not found"}));
    };

    match fs::read_to_string(&path).await {
        Ok(content) => match serde_yaml::from_str::<Value>(&content) {
            Ok(yaml) => Json(yaml),
            Err(e) => Json(json!({"error": format!("Invalid YAML: {}", e)})),
        },
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

fn workflow_path(dir: &std::path::Path, id: &str) -> Option<PathBuf> {
    for ext in ["yaml", "yml"] {
        let path = dir.join(format!("{id}.{ext}"));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

#[derive(Deserialize)]
struct RunRequest {
    workflow_id: String,
    input: String,
}

async fn create_run(State(state): State<AppState>, Json(payload): Json<RunRequest>) -> Json<Value> {
    let Some(path) = workflow_path(&state.workflow_dir, &payload.workflow_id) else {
        return Json(json!({"error": "Workflow not found"}));
    };

    let loader = WorkflowLoader::new();
    let def = match loader.load_workflow(&path) {
        Ok(def) => def,
        Err(e) => return Json(json!({"error": format!("Failed to load workflow: {}", e)})),
    };

    let engine = match Engine::from_definition(def, state.memory.clone()) {
        Ok(engine) => engine,
        Err(e) => return Json(json!({"error": format!("Failed to build engine: {}", e)})),
    };

    match engine.run(&payload.input).await {
        Ok(outcome) => Json(json!({
            "run_id": outcome.run_id,
            "status": outcome.status.as_str(),
            "output": outcome.final_output,
            "report": outcome.report,
        })),
        Err(e) => Json(json!({"error": format!("Execution failed: {}", e)})),
    }
}

async fn get_report(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    match state.memory.get_report(&id).await {
        Some(report) => Json(report),
        None => Json(json!({"error": "Report not found"})),
    }
}

async fn stream_run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming run for workflow: {}", payload.workflow_id);

        let Some(path) = workflow_path(&state.workflow_dir, &payload.workflow_id) else {
            log::warn!("Workflow not found: {}", payload.workflow_id);
            let _ = tx
                .send(StepEvent::Error {
                    agent_id: "server".to_string(),
                    message: "Workflow not found".to_string(),
                })
                .await;
            return;
        };

        let loader = WorkflowLoader::new();
        let def = match loader.load_workflow(&path) {
            Ok(def) => def,
            Err(e) => {
                log::error!("Failed to load workflow: {}", e);
                let _ = tx
                    .send(StepEvent::Error {
                        agent_id: "server".to_string(),
                        message: format!("Failed to load workflow: {}", e),
                    })
                    .await;
                return;
            }
        };

        let engine = match Engine::from_definition(def, state.memory.clone()) {
            Ok(engine) => engine.with_events(tx.clone()),
            Err(e) => {
                log::error!("Failed to build engine: {}", e);
                let _ = tx
                    .send(StepEvent::Error {
                        agent_id: "server".to_string(),
                        message: format!("Failed to build engine: {}", e),
                    })
                    .await;
                return;
            }
        };

        if let Err(e) = engine.run(&payload.input).await {
            log::error!("Run failed: {}", e);
            let _ = tx
                .send(StepEvent::Error {
                    agent_id: "server".to_string(),
                    message: format!("Execution failed: {}", e),
                })
                .await;
        }
        log::info!("Streaming run finished");
    });

    let stream =
        ReceiverStream::new(rx).map(|event| Ok(Event::default().json_data(event).unwrap()));

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new().interval(std::time::Duration::from_secs(1)),
    )
}
