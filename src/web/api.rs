//! Defines the Axum API routes and handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::actions::Action;
use crate::session::{run_session, Command, SessionConfig, SessionResult};
use crate::status::CombinedStatus;
use crate::web::models::{ErrorResponse, GcodeBatchRequest};

const MAX_STEP_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AppStateInner {
    pub host: String,
    pub control_port: u16,
    pub session_config: SessionConfig,
    /// Held for the whole of a control session; the printer accepts one at a time.
    pub session_lock: Mutex<()>,
    latest_status: RwLock<Option<CombinedStatus>>,
}
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(host: impl Into<String>, control_port: u16, session_config: SessionConfig) -> Self {
        Self {
            host: host.into(),
            control_port,
            session_config,
            session_lock: Mutex::new(()),
            latest_status: RwLock::new(None),
        }
    }

    /// Store the newest poller output for the status route.
    pub fn publish_status(&self, status: CombinedStatus) {
        let mut guard = self.latest_status.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(status);
    }

    pub fn latest_status(&self) -> Option<CombinedStatus> {
        self.latest_status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn run_exclusive(&self, commands: &[Command], config: &SessionConfig) -> SessionResult {
        let _session = self.session_lock.lock().await;
        run_session(&self.host, self.control_port, commands, config).await
    }
}

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> axum::response::Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

fn session_response(result: SessionResult) -> axum::response::Response {
    let status = if result.success { StatusCode::OK } else { StatusCode::BAD_GATEWAY };
    (status, Json(result)).into_response()
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/gcode", post(execute_gcode))
        .route("/api/v1/actions/{action}", post(execute_action))
        .with_state(state)
}

/// GET /api/v1/status
async fn get_status(State(state): State<AppState>) -> axum::response::Response {
    match state.latest_status() {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => json_error("No status received yet", StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// POST /api/v1/gcode
async fn execute_gcode(
    State(state): State<AppState>,
    Json(payload): Json<GcodeBatchRequest>,
) -> axum::response::Response {
    let commands: Vec<Command> = payload.commands.into_iter().map(Command::from).collect();
    if commands.is_empty() {
        return json_error("No commands given", StatusCode::BAD_REQUEST);
    }
    if commands.iter().any(Command::is_empty) {
        return json_error("Commands must not be blank", StatusCode::BAD_REQUEST);
    }

    let mut config = state.session_config.clone();
    if let Some(timeout_ms) = payload.timeout_ms {
        if timeout_ms == 0 {
            return json_error("timeout_ms must be > 0", StatusCode::BAD_REQUEST);
        }
        config.step_timeout = Duration::from_millis(timeout_ms).min(MAX_STEP_TIMEOUT);
    }

    tracing::info!("Running {} command(s) from API", commands.len());
    session_response(state.run_exclusive(&commands, &config).await)
}

/// POST /api/v1/actions/{action}
async fn execute_action(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    let Some(action) = Action::from_slug(&slug) else {
        return json_error(&format!("Unknown action '{}'", slug), StatusCode::NOT_FOUND);
    };
    tracing::info!("Running action {}", action.slug());
    let config = state.session_config.clone();
    session_response(state.run_exclusive(&action.commands(), &config).await)
}
