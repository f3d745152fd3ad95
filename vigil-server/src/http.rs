use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{Alert, AlertSeverity, CameraScope, CameraStatus, Directive};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn not_found(code: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

/// A request to start monitoring something. `camera_id` absent means the
/// directive applies to every registered camera (spec 3, `CameraScope::All`).
#[derive(Debug, Deserialize)]
pub struct DirectiveRequest {
    pub text: String,
    pub camera_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DirectiveResponse {
    pub id: Uuid,
    pub kind: vigil_core::DirectiveKind,
    pub target: String,
    pub requires_baseline: bool,
    pub camera_scope: CameraScope,
}

async fn create_directive(
    State(state): State<AppState>,
    Json(req): Json<DirectiveRequest>,
) -> Json<DirectiveResponse> {
    let parsed = state.parser.parse(&req.text);
    let scope = match req.camera_id {
        Some(id) => CameraScope::Single(id),
        None => CameraScope::All,
    };
    let directive = Directive::new(parsed.kind, parsed.target, scope.clone());
    let requires_baseline = directive.requires_baseline;
    let kind = directive.kind;
    let target = directive.target.clone();
    let id = state.supervisor.process_directive(directive);

    Json(DirectiveResponse {
        id,
        kind,
        target,
        requires_baseline,
        camera_scope: scope,
    })
}

async fn delete_directive(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if state.supervisor.remove_directive(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found("DIRECTIVE_NOT_FOUND", "no directive with that id")
    }
}

async fn start_camera(State(state): State<AppState>, Path(camera_id): Path<String>) -> Response {
    match state.supervisor.start_camera(&camera_id) {
        Ok(new_state) => Json(camera_status(&state, &camera_id, new_state)).into_response(),
        Err(_) => not_found("CAMERA_NOT_FOUND", format!("unknown camera: {camera_id}")),
    }
}

async fn stop_camera(State(state): State<AppState>, Path(camera_id): Path<String>) -> Response {
    match state.supervisor.stop_camera(&camera_id).await {
        Ok(new_state) => Json(camera_status(&state, &camera_id, new_state)).into_response(),
        Err(_) => not_found("CAMERA_NOT_FOUND", format!("unknown camera: {camera_id}")),
    }
}

fn camera_status(state: &AppState, camera_id: &str, camera_state: vigil_core::CameraState) -> CameraStatus {
    state
        .supervisor
        .list_cameras()
        .into_iter()
        .find(|c| c.camera_id == camera_id)
        .unwrap_or(CameraStatus {
            camera_id: camera_id.to_string(),
            state: camera_state,
            auto_started: false,
        })
}

async fn list_cameras(State(state): State<AppState>) -> Json<Vec<CameraStatus>> {
    Json(state.supervisor.list_cameras())
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub since: Option<DateTime<Utc>>,
    pub severity: Option<AlertSeverity>,
    pub limit: Option<usize>,
}

async fn list_alerts(State(state): State<AppState>, Query(query): Query<AlertQuery>) -> Json<Vec<Alert>> {
    let limit = query.limit.unwrap_or(50);
    Json(state.dispatcher.query(query.since, query.severity, limit))
}

async fn acknowledge_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if state.dispatcher.acknowledge(id) {
        StatusCode::OK.into_response()
    } else {
        not_found("alert_not_found", format!("no alert with id {id}"))
    }
}

async fn list_directives(State(state): State<AppState>) -> Json<Vec<Directive>> {
    Json(state.registry.all())
}

async fn health() -> &'static str {
    "ok"
}

/// Routes requiring `AppState`. Left unapplied (no `.with_state`) so `main`
/// can merge in the WebSocket route before attaching state once.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/directives", post(create_directive).get(list_directives))
        .route("/directives/:id", delete(delete_directive))
        .route("/cameras", get(list_cameras))
        .route("/cameras/:id/start", post(start_camera))
        .route("/cameras/:id/stop", post(stop_camera))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id/acknowledge", post(acknowledge_alert))
}
