//! Local-only health and control surfaces.
//!
//! Three endpoints: `GET /` (runtime status), `GET /api/agents` (current
//! registry snapshot), `GET /export` (write a backup file and report it).

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::board::models::AgentDef;
use crate::board::store::BoardStore;
use crate::config::Config;
use crate::export;
use crate::runner::RunnerState;
use crate::runner::registry::RegistryHandle;
use crate::sys;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn BoardStore>,
    pub registry: Arc<RegistryHandle>,
    pub runner: Arc<RunnerState>,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Internal(message) = self;
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": message})),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/api/agents", get(list_agents))
        .route("/export", get(export_backup))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind on loopback and serve until the process exits.
pub async fn start_server(state: SharedState) -> Result<()> {
    let addr = format!("127.0.0.1:{}", state.config.control_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control server on {}", addr))?;
    eprintln!("[server] Control surface listening on http://{}", addr);
    axum::serve(listener, build_router(state))
        .await
        .context("Control server terminated")?;
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let active: serde_json::Map<String, serde_json::Value> = state
        .runner
        .active
        .lock()
        .map(|active| {
            active
                .iter()
                .map(|(task_id, entry)| {
                    (
                        task_id.clone(),
                        json!({
                            "agent": entry.agent,
                            "pid": entry.pid,
                            "runtimeMs": entry.started.elapsed().as_millis() as u64,
                        }),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let columns = state
        .runner
        .columns
        .lock()
        .ok()
        .and_then(|cached| {
            cached.as_ref().map(|c| {
                json!({"queue": c.queue, "wip": c.wip, "review": c.review})
            })
        })
        .unwrap_or(serde_json::Value::Null);

    let last_poll_error = state
        .runner
        .last_poll_error
        .lock()
        .map(|e| e.clone())
        .unwrap_or(None);

    let active_count = active.len();
    Json(json!({
        "service": "agentboard",
        "maxConcurrentAgents": state.config.max_concurrent_agents,
        "activeAgents": active,
        "activeCount": active_count,
        "completedTasks": state.runner.completed.load(Ordering::Relaxed),
        "freeMemMb": sys::free_memory_mb(),
        "workflowColumns": columns,
        "lastPollError": last_poll_error,
        "uptimeSecs": state.runner.started_at.elapsed().as_secs(),
    }))
}

async fn list_agents(State(state): State<SharedState>) -> Json<Vec<AgentDef>> {
    let registry = state.registry.current();
    Json(registry.all().iter().map(|a| (**a).clone()).collect())
}

async fn export_backup(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let completed = state.runner.completed.load(Ordering::Relaxed);
    let active = state
        .runner
        .active
        .lock()
        .map(|a| a.len())
        .unwrap_or(0);
    let summary =
        export::write_backup(&state.config, state.store.as_ref(), completed, active).await?;
    Ok(Json(json!({
        "path": summary.path.display().to_string(),
        "tasks": summary.tasks,
        "results": summary.results,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(dir: &tempfile::TempDir) -> SharedState {
        let data_dir = dir.path().to_str().unwrap().to_string();
        let config = Arc::new(Config::from_vars(|name| match name {
            "DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        }));
        Arc::new(AppState {
            registry: RegistryHandle::open(dir.path().join("missing.json")),
            store: Arc::new(MemoryStore::default()),
            runner: RunnerState::new(),
            config,
        })
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_reports_service_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(build_router(test_state(&dir)), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "agentboard");
        assert_eq!(body["maxConcurrentAgents"], 1);
        assert_eq!(body["activeCount"], 0);
        assert_eq!(body["completedTasks"], 0);
        assert!(body["lastPollError"].is_null());
    }

    #[tokio::test]
    async fn agents_endpoint_lists_builtin_registry() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(build_router(test_state(&dir)), "/api/agents").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "claude");
        assert_eq!(body[0]["ramMB"], 450);
    }

    #[tokio::test]
    async fn export_endpoint_writes_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (status, body) = get_json(build_router(state), "/export").await;
        assert_eq!(status, StatusCode::OK);
        let path = std::path::PathBuf::from(body["path"].as_str().unwrap());
        assert!(path.exists());
        assert_eq!(body["results"], 0);
    }
}
