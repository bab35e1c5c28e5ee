use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::database::{Database, EventRow, WatermarkRow};
use crate::error::TrackerError;
use crate::models::{ChainHealth, ChainStatus};
use crate::tracking::TrackerHandle;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Server error: {0}")]
    Server(String),
}

/// Response structure for the health endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub chains: usize,
    pub retrying: Vec<String>,
}

/// Response structure for the status endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub chains: Vec<ChainStatus>,
    pub total_events: u64,
    pub database_status: String,
}

/// Response structure for the events endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventRow>,
    pub total_count: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

/// Response to pause/resume/stop
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Absent for commands applied to every chain
    pub chain: Option<String>,
    pub action: String,
    pub statuses: Vec<ChainStatus>,
}

/// Query parameters for the events endpoint
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    pub chain: Option<String>,
}

fn default_limit() -> u32 {
    100
}

const MAX_LIMIT: u32 = 1000;

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn error_response(status: StatusCode, error: &str, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
}

fn database_failure(context: &str, e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    log::error!("{}: {}", context, e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "database_error",
        format!("{}: {}", context, e),
    )
}

fn unknown_chain(chain: &str) -> (StatusCode, Json<ErrorResponse>) {
    error_response(StatusCode::NOT_FOUND, "unknown_chain", format!("Chain {} is not tracked", chain))
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<TrackerHandle>,
    pub database: Arc<Database>,
}

/// Build the control/status router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/status", get(get_status))
        .route("/chains/:chain/status", get(get_chain_status))
        .route("/chains/:chain/pause", post(pause_chain))
        .route("/chains/:chain/resume", post(resume_chain))
        .route("/chains/:chain/stop", post(stop_chain))
        .route("/pause", post(pause_all))
        .route("/resume", post(resume_all))
        .route("/stop", post(stop_all))
        .route("/events", get(get_events))
        .route("/watermarks", get(get_watermarks))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// HTTP API server
pub struct ApiServer {
    state: AppState,
    pub host: String,
    pub port: u16,
}

impl ApiServer {
    pub fn new(state: AppState, config: &ApiConfig) -> Self {
        Self {
            state,
            host: config.host.clone(),
            port: config.port,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<(), ApiError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state.clone());

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        log::info!("HTTP API server starting on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// GET /health - liveness plus the chains currently retrying
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let statuses = state.tracker.statuses().await;
    let retrying: Vec<String> = statuses
        .iter()
        .filter(|status| status.health == ChainHealth::Retrying)
        .map(|status| status.chain.clone())
        .collect();

    Json(HealthResponse {
        status: if retrying.is_empty() { "healthy" } else { "degraded" }.to_string(),
        chains: statuses.len(),
        retrying,
    })
}

/// GET /status - status of every chain
pub async fn get_status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let total_events = state
        .database
        .get_event_count(None)
        .map_err(|e| database_failure("Failed to retrieve status data", e))?;

    Ok(Json(StatusResponse {
        chains: state.tracker.statuses().await,
        total_events,
        database_status: "connected".to_string(),
    }))
}

/// GET /chains/:chain/status
pub async fn get_chain_status(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> ApiResult<ChainStatus> {
    state
        .tracker
        .status(&chain)
        .await
        .map(Json)
        .ok_or_else(|| unknown_chain(&chain))
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Pause,
    Resume,
    Stop,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Stop => "stop",
        }
    }
}

async fn control(state: AppState, chain: Option<String>, action: Action) -> ApiResult<ControlResponse> {
    if let Some(name) = chain.as_deref() {
        if state.tracker.status(name).await.is_none() {
            return Err(unknown_chain(name));
        }
    }

    let target = chain.as_deref();
    let result = match action {
        Action::Pause => state.tracker.pause(target).await,
        Action::Resume => state.tracker.resume(target).await,
        Action::Stop => state.tracker.stop(target).await,
    };

    match result {
        Ok(()) => {}
        Err(TrackerError::Control(message)) => {
            return Err(error_response(StatusCode::CONFLICT, "invalid_transition", message));
        }
        Err(e) => {
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string()));
        }
    }

    let statuses = match chain.as_deref() {
        Some(name) => state.tracker.status(name).await.into_iter().collect(),
        None => state.tracker.statuses().await,
    };

    Ok(Json(ControlResponse {
        chain,
        action: action.as_str().to_string(),
        statuses,
    }))
}

/// POST /chains/:chain/pause
pub async fn pause_chain(State(state): State<AppState>, Path(chain): Path<String>) -> ApiResult<ControlResponse> {
    control(state, Some(chain), Action::Pause).await
}

/// POST /chains/:chain/resume
pub async fn resume_chain(State(state): State<AppState>, Path(chain): Path<String>) -> ApiResult<ControlResponse> {
    control(state, Some(chain), Action::Resume).await
}

/// POST /chains/:chain/stop
pub async fn stop_chain(State(state): State<AppState>, Path(chain): Path<String>) -> ApiResult<ControlResponse> {
    control(state, Some(chain), Action::Stop).await
}

pub async fn pause_all(State(state): State<AppState>) -> ApiResult<ControlResponse> {
    control(state, None, Action::Pause).await
}

pub async fn resume_all(State(state): State<AppState>) -> ApiResult<ControlResponse> {
    control(state, None, Action::Resume).await
}

pub async fn stop_all(State(state): State<AppState>) -> ApiResult<ControlResponse> {
    control(state, None, Action::Stop).await
}

/// GET /events - recently emitted events with pagination
pub async fn get_events(
    Query(params): Query<EventsQuery>,
    State(state): State<AppState>,
) -> ApiResult<EventsResponse> {
    if params.limit == 0 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_parameter",
            "Limit must be greater than 0".to_string(),
        ));
    }

    if params.limit > MAX_LIMIT {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_parameter",
            format!("Limit cannot exceed {}", MAX_LIMIT),
        ));
    }

    let chain = params.chain.as_deref();
    let events = state
        .database
        .get_recent_events(params.limit, params.offset, chain)
        .map_err(|e| database_failure("Failed to retrieve events", e))?;
    let total_count = state
        .database
        .get_event_count(chain)
        .map_err(|e| database_failure("Failed to retrieve events", e))?;

    let has_more = u64::from(params.offset) + u64::from(params.limit) < total_count;

    Ok(Json(EventsResponse {
        events,
        total_count,
        limit: params.limit,
        offset: params.offset,
        has_more,
    }))
}

/// GET /watermarks - persisted progress per chain
pub async fn get_watermarks(State(state): State<AppState>) -> ApiResult<Vec<WatermarkRow>> {
    state
        .database
        .all_watermarks()
        .map(Json)
        .map_err(|e| database_failure("Failed to retrieve watermarks", e))
}
