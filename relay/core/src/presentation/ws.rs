// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! WebSocket transport.
//!
//! One socket per client, opened with `GET /ws?role=a|b`. Inbound text frames
//! go to the gateway untouched; outbound frames are wrapped in
//! `{"destination": ..., "body": ...}` envelopes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::connection_gateway::{Connection, ConnectionGateway};
use crate::domain::message::OutboundFrame;
use crate::domain::role::Role;

use super::api::{ApiError, AppState};

pub const CHAT_DESTINATION: &str = "/topic/chat";
pub const PRIVATE_DESTINATION: &str = "/user/topic/privateMessage";
pub const AGENT_STATUS_DESTINATION: &str = "/topic/agentStatus";
pub const AGENT_ID_CHANGED_DESTINATION: &str = "/user/topic/agentIdChanged";
pub const HEARTBEAT_DESTINATION: &str = "/user/topic/heartbeat";

#[derive(Debug, Deserialize)]
pub struct WsParams {
    role: Option<String>,
}

/// Wrap an outbound frame for the wire. `Close` has no envelope.
pub fn frame_envelope(frame: &OutboundFrame) -> Result<Option<Value>, serde_json::Error> {
    let (destination, body) = match frame {
        // Sender fields only travel on the bus
        OutboundFrame::Broadcast(payload) => (CHAT_DESTINATION, json!({ "content": payload.content })),
        OutboundFrame::Targeted(msg) => (PRIVATE_DESTINATION, serde_json::to_value(msg)?),
        OutboundFrame::Presence(event) => (AGENT_STATUS_DESTINATION, serde_json::to_value(event)?),
        OutboundFrame::Reassigned { event, notice } => {
            let mut body = serde_json::to_value(event)?;
            if let Value::Object(fields) = &mut body {
                fields.insert("content".to_string(), Value::String(notice.content.clone()));
            }
            (AGENT_ID_CHANGED_DESTINATION, body)
        }
        OutboundFrame::HeartbeatAck(ack) => (HEARTBEAT_DESTINATION, serde_json::to_value(ack)?),
        OutboundFrame::Close => return Ok(None),
    };
    Ok(Some(json!({ "destination": destination, "body": body })))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> Response {
    let role = match params.role.as_deref().map(str::parse::<Role>) {
        Some(Ok(role)) => role,
        Some(Err(e)) => return ApiError::BadRequest(e.to_string()).into_response(),
        None => {
            return ApiError::BadRequest("role query parameter is required".to_string())
                .into_response()
        }
    };

    // Assign before upgrading so a store outage refuses the handshake
    let connection = match state.gateway.on_connect(role).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!(role = %role, error = %e, "Refusing connection, identity could not be assigned");
            return ApiError::Refused(e).into_response();
        }
    };

    let gateway = state.gateway.clone();
    let failed_gateway = state.gateway.clone();
    let failed_identity = connection.identity.clone();
    let failed_ticket = connection.ticket;
    ws.on_failed_upgrade(move |e| {
        warn!(identity = %failed_identity, error = %e, "WebSocket upgrade failed");
        tokio::spawn(async move {
            failed_gateway.on_disconnect(&failed_identity, failed_ticket).await;
        });
    })
    .on_upgrade(move |socket| handle_socket(socket, gateway, connection))
}

async fn handle_socket(socket: WebSocket, gateway: Arc<ConnectionGateway>, connection: Connection) {
    let Connection {
        identity,
        ticket,
        mut outbound,
        ..
    } = connection;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let envelope = match frame_envelope(&frame) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Dropping unencodable outbound frame");
                    continue;
                }
            };
            if ws_tx
                .send(Message::Text(envelope.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
        }
        // Superseded, or evicted from the session table
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let recv_gateway = gateway.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = recv_gateway
                        .on_client_frame(&recv_identity, text.as_str())
                        .await
                    {
                        warn!(identity = %recv_identity, error = %e, "Client frame not delivered");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!(identity = %identity, "Socket closed");
    gateway.on_disconnect(&identity, ticket).await;
}
