// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Administrative REST endpoints.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /health` | [`health_handler`] |
//! | `GET /api/agent/{role}` | [`agent_handler`] |
//! | `GET /api/agent/{role}/status` | [`agent_status_handler`] |
//! | `GET /api/agent/{role}/check/{current_id}` | [`check_identity_handler`] |
//! | `GET /api/chat/public` | [`public_history_handler`] |
//! | `GET /api/chat/private` | [`private_history_handler`] |
//! | `GET /ws` | [`ws_handler`](super::ws::ws_handler) |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::connection_gateway::ConnectionGateway;
use crate::domain::error::RelayError;
use crate::domain::history::HistoryScope;
use crate::domain::role::{Identity, Role};

use super::ws::ws_handler;

pub struct AppState {
    pub gateway: Arc<ConnectionGateway>,
    pub node_id: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/agent/{role}", get(agent_handler))
        .route("/api/agent/{role}/status", get(agent_status_handler))
        .route(
            "/api/agent/{role}/check/{current_id}",
            get(check_identity_handler),
        )
        .route("/api/chat/public", get(public_history_handler))
        .route("/api/chat/private", get(private_history_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body shared by every endpoint: `{"success":false,"error":...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// A WebSocket refused before the upgrade.
    Refused(RelayError),
    Relay(RelayError),
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::UnknownRole(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Relay(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Refused(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            ApiError::Relay(e) => {
                error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse::<Role>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn not_connected(role: Role) -> String {
    format!("{} is not connected", role.display_name())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "node_id": state.node_id,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn agent_handler(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let role = parse_role(&role)?;
    let status = state.gateway.role_status(role).await?;

    let body = match status.agent_id {
        Some(agent_id) => json!({
            "success": true,
            "agentType": status.agent_type,
            "agentName": status.agent_name,
            "agentId": agent_id,
            "status": status.status,
        }),
        None => json!({
            "success": false,
            "message": not_connected(role),
            "status": status.status,
        }),
    };
    Ok(Json(body))
}

async fn agent_status_handler(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let role = parse_role(&role)?;
    let status = state.gateway.role_status(role).await?;
    Ok(Json(json!({
        "success": true,
        "agentType": status.agent_type,
        "agentName": status.agent_name,
        "status": status.status,
        "agentId": status.agent_id,
    })))
}

async fn check_identity_handler(
    State(state): State<Arc<AppState>>,
    Path((role, current_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let role = parse_role(&role)?;
    let current = Identity::from(current_id);
    let check = state.gateway.check_identity_validity(role, &current).await?;

    let message = match &check.valid_identity {
        None => not_connected(role),
        Some(valid) if !check.is_valid => format!("Agent ID has changed, current valid ID: {valid}"),
        Some(_) => "Agent ID is valid".to_string(),
    };
    Ok(Json(json!({
        "success": true,
        "agentType": role,
        "currentId": current,
        "validId": check.valid_identity,
        "isValid": check.is_valid,
        "message": message,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivatePageParams {
    user_id: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn public_history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state
        .gateway
        .history(
            &HistoryScope::Public,
            params.limit.unwrap_or(0),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": page.entries.len(),
        "messages": page.entries,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

async fn private_history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PrivatePageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = params
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("userId must not be empty".to_string()))?;

    let page = state
        .gateway
        .history(
            &HistoryScope::Private(Identity::from(user_id.clone())),
            params.limit.unwrap_or(0),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "userId": user_id,
        "count": page.entries.len(),
        "messages": page.entries,
        "limit": page.limit,
        "offset": page.offset,
    })))
}
