//! HTTP surface of the relay.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/raybanai` | Analyze an image (primary) |
//! | `POST` | `/api/gpt-4-vision` | Analyze an image (legacy alias) |
//! | `GET`  | `/api/history` | Recorded analyses, oldest first |
//! | `GET`  | `/api/config` | Current runtime configuration |
//! | `POST` | `/api/config` | Replace the runtime configuration |
//! | `GET`  | `/api/prompts` | Full category → prompt mapping |
//! | `POST` | `/api/prompts` | Write one local prompt entry |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Failures are `500 {"error": ..., "details": ...}`; a duplicate request is
//! `429 {"error": "Duplicate request", "message": ...}`; an absent history
//! log is `404 {"error": "No history found"}`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the browser-side
//! trigger posts from arbitrary pages.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::analyze::{run_analysis, AnalyzeRequest};
use crate::config::{ConfigStore, RuntimeConfig, Settings};
use crate::dedup::{spawn_sweep, Deduplicator};
use crate::error::ApiError;
use crate::history::{read_history, Recorder};
use crate::prompts::{LocalPromptStore, PromptMapping, PromptResolver};
use crate::store::sqlite::SqliteDocumentStore;
use crate::store::DocumentStore;
use crate::vision::VisionClient;

/// Shared application context, built once at startup and cloned into every
/// handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub dedup: Arc<Deduplicator>,
    pub dedup_window_secs: u64,
    pub config_store: Arc<ConfigStore>,
    pub resolver: Arc<PromptResolver>,
    pub recorder: Arc<Recorder>,
    pub vision: Arc<VisionClient>,
}

/// Build the application context. The document store is opened from
/// settings; a connection failure degrades to local-only behavior.
pub async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let store: Option<Arc<dyn DocumentStore>> =
        match SqliteDocumentStore::connect(&settings.document_store.path).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "document store unavailable, continuing without it");
                None
            }
        };
    build_state_with_store(settings, store).await
}

/// Build the application context around an already-constructed document
/// store (or none).
pub async fn build_state_with_store(
    settings: Settings,
    store: Option<Arc<dyn DocumentStore>>,
) -> anyhow::Result<AppState> {
    let dedup = Arc::new(Deduplicator::new(Duration::from_millis(
        settings.dedup.window_ms,
    )));
    let config_store = Arc::new(ConfigStore::new(settings.config_file()));

    let local = LocalPromptStore::new(settings.prompts_file());
    local.ensure_seeded().await?;
    let resolver = Arc::new(PromptResolver::new(local, store.clone()));

    let recorder = Arc::new(Recorder::new(
        settings.log_file(),
        settings.data.dir.clone(),
        store,
        Duration::from_secs(settings.vision.timeout_secs),
    )?);
    let vision = Arc::new(VisionClient::new(&settings.vision)?);

    let dedup_window_secs = settings.dedup.window_ms / 1000;
    Ok(AppState {
        settings: Arc::new(settings),
        dedup,
        dedup_window_secs,
        config_store,
        resolver,
        recorder,
        vision,
    })
}

/// Router with all routes and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/raybanai", post(handle_analyze))
        .route("/api/gpt-4-vision", post(handle_analyze))
        .route("/api/history", get(handle_history))
        .route("/api/config", get(handle_get_config).post(handle_set_config))
        .route("/api/prompts", get(handle_get_prompts).post(handle_set_prompt))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the relay server. Runs until the process is terminated.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let bind = settings.server.bind.clone();
    let state = build_state(settings).await?;

    // Sweep guard lives for the lifetime of the server.
    let _sweeper = spawn_sweep(
        &state.dedup,
        Duration::from_millis(state.settings.dedup.sweep_interval_ms),
    );

    let app = build_router(state);
    info!(%bind, "raybanai relay listening");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn internal_error(message: String) -> Response {
    let body = serde_json::json!({
        "error": message,
        "details": "Check server logs for more information",
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

// ============ POST /api/raybanai ============

#[derive(Serialize)]
struct AnalyzeResponse {
    response: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    match run_analysis(&state, request).await {
        Ok(response) => Ok(Json(AnalyzeResponse { response })),
        Err(e) => {
            match &e {
                ApiError::Duplicate { .. } => info!(%e, "duplicate request rejected"),
                _ => error!(%e, "analysis request failed"),
            }
            Err(e)
        }
    }
}

// ============ GET /api/history ============

async fn handle_history(State(state): State<AppState>) -> Response {
    match read_history(&state.settings.log_file()).await {
        Ok(Some(entries)) => (StatusCode::OK, Json(entries)).into_response(),
        Ok(None) => {
            let body = serde_json::json!({ "error": "No history found" });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(e) => {
            error!(error = %e, "history read failed");
            internal_error(e.to_string())
        }
    }
}

// ============ GET/POST /api/config ============

async fn handle_get_config(State(state): State<AppState>) -> Json<RuntimeConfig> {
    Json(state.config_store.load().await)
}

async fn handle_set_config(
    State(state): State<AppState>,
    Json(config): Json<RuntimeConfig>,
) -> Response {
    match state.config_store.save(&config).await {
        Ok(()) => (StatusCode::OK, Json(config)).into_response(),
        Err(e) => {
            error!(error = %e, "runtime config write failed");
            internal_error(e.to_string())
        }
    }
}

// ============ GET/POST /api/prompts ============

async fn handle_get_prompts(State(state): State<AppState>) -> Json<PromptMapping> {
    let config = state.config_store.load().await;
    Json(state.resolver.get_all(&config).await)
}

#[derive(Deserialize)]
struct SetPromptRequest {
    category: String,
    prompt: String,
}

async fn handle_set_prompt(
    State(state): State<AppState>,
    Json(request): Json<SetPromptRequest>,
) -> Response {
    if request.category.is_empty() || request.prompt.is_empty() {
        let body = serde_json::json!({
            "success": false,
            "error": "category and prompt must not be empty",
        });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    match state.resolver.set_local(&request.category, &request.prompt).await {
        Ok(()) => {
            let body = serde_json::json!({ "success": true });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!(error = %e, "prompt write failed");
            let body = serde_json::json!({ "success": false, "error": e.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
