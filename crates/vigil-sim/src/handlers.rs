use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use vigil_common::{DraftConfig, Strategy};
use vigil_repo::{ConfigRepository, RepoError};

use crate::state::AppState;

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
            request_id: format!("req_{}", Uuid::new_v4()),
        },
    };
    (status, Json(body)).into_response()
}

fn repo_error(e: RepoError) -> Response {
    if e.is_validation() {
        tracing::info!(error = %e, "rejected request");
        return error_response(StatusCode::BAD_REQUEST, "validation", &e.to_string());
    }
    tracing::error!(error = %e, "backend error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string())
}

fn reply<T: Serialize>(res: Result<T, RepoError>) -> Response {
    match res {
        Ok(v) => Json(v).into_response(),
        Err(e) => repo_error(e),
    }
}

pub async fn require_token(State(st): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = st.token.as_deref() else {
        return next.run(req).await;
    };
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");
    if presented != expected {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid bearer token");
    }
    next.run(req).await
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn list_gpus(State(st): State<AppState>) -> Response {
    reply(st.repo.get_gpus().await)
}

pub async fn detect_gpus(State(st): State<AppState>) -> Response {
    reply(st.repo.detect_gpus().await)
}

pub async fn list_services(State(st): State<AppState>) -> Response {
    reply(st.repo.get_services().await)
}

pub async fn get_config(State(st): State<AppState>) -> Response {
    reply(st.repo.get_config().await)
}

pub async fn put_config(State(st): State<AppState>, Json(draft): Json<DraftConfig>) -> Response {
    reply(st.repo.update_config(&draft).await)
}

pub async fn config_status(State(st): State<AppState>) -> Response {
    reply(st.repo.get_service_health().await)
}

pub async fn apply_config(State(st): State<AppState>) -> Response {
    reply(st.repo.apply_config().await)
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    strategy: String,
}

pub async fn preview(State(st): State<AppState>, Query(q): Query<PreviewQuery>) -> Response {
    let strategy: Strategy = match q.strategy.parse() {
        Ok(s) => s,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, "invalid_strategy", &msg),
    };
    reply(st.repo.preview_strategy(strategy).await)
}
