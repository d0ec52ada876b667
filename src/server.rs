//! Per-agent HTTP server: router assembly and the five A2A endpoints
//! (component C3).

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::a2a::{A2aRequest, A2aResponse, A2aResult, A2aStatus};
use crate::app_state::AppState;
use crate::infrastructure::metrics;
use crate::infrastructure::security_middleware::{self, SecurityState};
use crate::utils::error::WatchError;

const SKILL_DEADLINE_SECS: u64 = 60;

pub fn create_router(state: AppState) -> Router {
    let security_state = SecurityState {
        rate_limiter: state.rate_limiter.clone(),
    };

    Router::new()
        .route("/health", get(health))
        .route("/.well-known/agent.json", get(agent_card))
        .route("/discover", get(discover))
        .route("/metrics", get(metrics_endpoint))
        .route("/skills/:name", post(invoke_skill))
        .route("/a2a", post(invoke_a2a))
        .layer(axum::middleware::from_fn(security_middleware::security_headers_middleware))
        .layer(axum::middleware::from_fn_with_state(
            security_state,
            security_middleware::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(security_middleware::input_validation_middleware))
        .layer(axum::middleware::from_fn(security_middleware::audit_log_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "agent_type": state.agent_type,
        "name": state.card.name,
        "version": state.card.version,
    }))
}

async fn agent_card(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.card.clone())
}

async fn discover(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list().await {
        Ok(entries) => Json(json!({ "peers": entries })).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "missing bearer token"}))));
    };

    state.auth.validate_token(token).map_err(|_| {
        (StatusCode::FORBIDDEN, Json(json!({"error": "invalid bearer token"})))
    })
}

async fn invoke_skill(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    if let Err(response) = authorize(&state, &headers) {
        return response.into_response();
    }

    let Some(handler) = state.skills.get(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "error": format!("unknown skill: {name}"), "timestamp": chrono::Utc::now()})),
        )
            .into_response();
    };

    let parameters = body.get("parameters").cloned().unwrap_or(serde_json::Value::Null);
    let deadline = Duration::from_secs(SKILL_DEADLINE_SECS);

    match tokio::time::timeout(deadline, handler(parameters)).await {
        Ok(Ok(result)) => Json(json!({
            "status": "success",
            "result": result,
            "timestamp": chrono::Utc::now(),
        }))
        .into_response(),
        Ok(Err(err)) => {
            warn!(skill = %name, error = %err, "skill invocation failed");
            Json(json!({
                "status": "error",
                "error": err.to_string(),
                "timestamp": chrono::Utc::now(),
            }))
            .into_response()
        }
        Err(_) => Json(json!({
            "status": "error",
            "error": format!("skill {name} timed out after {SKILL_DEADLINE_SECS}s"),
            "timestamp": chrono::Utc::now(),
        }))
        .into_response(),
    }
}

async fn invoke_a2a(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<A2aRequest>,
) -> impl IntoResponse {
    if let Err(response) = authorize(&state, &headers) {
        return response.into_response();
    }

    if request.method != "message/send" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unsupported method: {}", request.method)})),
        )
            .into_response();
    }

    let Some(directive) = request.extract_directive() else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "no skill directive found"}))).into_response();
    };

    let Some(handler) = state.skills.get(&directive.skill) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown skill: {}", directive.skill)})),
        )
            .into_response();
    };

    let task_id = request.params.message.message_id.clone();
    let deadline = Duration::from_secs(SKILL_DEADLINE_SECS);

    let (state_label, output) = match tokio::time::timeout(deadline, handler(directive.parameters)).await {
        Ok(Ok(result)) => ("completed", result),
        Ok(Err(err)) => {
            info!(skill = %directive.skill, error = %err, "a2a skill invocation failed");
            ("failed", json!({"error": err.to_string()}))
        }
        Err(_) => ("failed", json!({"error": "skill deadline exceeded"})),
    };

    let response = A2aResponse {
        jsonrpc: "2.0",
        id: request.id,
        result: A2aResult {
            kind: "task",
            id: task_id,
            status: A2aStatus { state: state_label },
            output,
        },
    };
    Json(response).into_response()
}

fn error_response(err: &WatchError) -> (StatusCode, Json<serde_json::Value>) {
    (err.status_code(), Json(json!({"status": "error", "error": err})))
}
