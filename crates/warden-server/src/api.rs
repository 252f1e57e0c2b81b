use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use warden_middleware::{auth_middleware, require_role, Authenticated, Rejection, Session};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub current: Option<String>,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Serialize)]
pub struct RevokedCount {
    pub revoked: usize,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/api/v1/users/:user_id/sessions",
            get(list_user_sessions).delete(revoke_user_sessions),
        )
        .route_layer(from_fn(require_role("admin")));

    let protected = Router::new()
        .route("/api/v1/me", get(me))
        .route("/api/v1/sessions", get(list_my_sessions).delete(logout_everywhere))
        .route("/api/v1/sessions/current", delete(logout))
        .merge(admin)
        .route_layer(from_fn_with_state(state.gateway.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn me(Authenticated(principal): Authenticated) -> impl IntoResponse {
    Json(principal)
}

async fn list_my_sessions(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<SessionList>, Rejection> {
    let sessions = state.sessions.list_active_for_user(&principal.user_id).await?;
    Ok(Json(SessionList {
        current: Some(principal.session_id),
        sessions,
    }))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<StatusCode, Rejection> {
    state.sessions.revoke(&principal.session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn logout_everywhere(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<RevokedCount>, Rejection> {
    let revoked = state
        .sessions
        .revoke_all_for_user(&principal.user_id)
        .await?;
    Ok(Json(RevokedCount { revoked }))
}

async fn list_user_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionList>, Rejection> {
    let sessions = state.sessions.list_active_for_user(&user_id).await?;
    Ok(Json(SessionList {
        current: None,
        sessions,
    }))
}

async fn revoke_user_sessions(
    State(state): State<Arc<AppState>>,
    Authenticated(admin): Authenticated,
    Path(user_id): Path<String>,
) -> Result<Json<RevokedCount>, Rejection> {
    let revoked = state.sessions.revoke_all_for_user(&user_id).await?;
    tracing::info!(
        admin = %admin.user_id,
        user_id = %user_id,
        revoked = revoked,
        "Sessions revoked by admin"
    );
    Ok(Json(RevokedCount { revoked }))
}
