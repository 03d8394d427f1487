// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay WebSocket: browser sessions subscribe to a connection id and receive
//! the protocol events addressed to it.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::relay::RelayChannel;
use crate::state::AppState;
use crate::transport::auth;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayWsQuery {
    pub token: Option<String>,
}

/// Messages a relay client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(alias = "connectionId")]
        connection_id: String,
    },
    Unsubscribe,
}

/// `GET /ws` — WebSocket upgrade for a relay channel.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RelayWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(code) = auth::validate_ws_token(query.token.as_deref(), state.config.auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_relay_socket(state, socket)).into_response()
}

/// Per-connection loop: forward relay messages out, handle subscriptions in.
async fn handle_relay_socket(state: Arc<AppState>, socket: WebSocket) {
    let (channel, mut rx) = state.relay.open_channel();
    let (mut ws_tx, mut ws_rx) = socket.split();
    tracing::debug!(channel = %channel.id, "relay socket opened");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(err = %e, "failed to encode relay message"),
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&state, &channel, &mut ws_tx, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.relay.on_disconnect(channel.id);
    tracing::debug!(channel = %channel.id, "relay socket closed");
}

/// Apply one client message and acknowledge it. Errors mean the socket is gone.
async fn handle_client_message(
    state: &AppState,
    channel: &RelayChannel,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    text: &str,
) -> Result<(), axum::Error> {
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { connection_id }) => {
            state.relay.subscribe(&connection_id, channel);
            serde_json::json!({ "event": "subscribed", "connection_id": connection_id })
        }
        Ok(ClientMessage::Unsubscribe) => {
            // Releases whatever id this channel owns, atomically.
            let connection_id = state.relay.on_disconnect(channel.id);
            serde_json::json!({ "event": "unsubscribed", "connection_id": connection_id })
        }
        Err(e) => {
            tracing::debug!(channel = %channel.id, err = %e, "invalid relay client message");
            serde_json::json!({ "event": "error", "message": e.to_string() })
        }
    };
    ws_tx.send(Message::Text(reply.to_string().into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        snake = { r#"{"event":"subscribe","connection_id":"abc"}"# },
        camel = { r#"{"event":"subscribe","connectionId":"abc"}"# },
    )]
    fn parses_subscribe(text: &str) {
        let msg = serde_json::from_str::<ClientMessage>(text).ok();
        assert_eq!(msg, Some(ClientMessage::Subscribe { connection_id: "abc".into() }));
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"event":"dance"}"#).is_err());
    }
}
