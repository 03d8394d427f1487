// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay WebSocket tests using real connections against an in-process axum
//! server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use showcase::credential::TenantConfig;
use showcase::repository::{MemoryRepository, Showcase, ShowcaseRepository};
use showcase::state::AppState;
use showcase::test_support::{
    app_state, degree_definition, spawn_agent_server, spawn_http_server, test_config,
};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsRx = futures_util::stream::SplitStream<WsStream>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn ws_send(stream: &mut WsTx, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    stream.send(WsMessage::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))?;
    Ok(())
}

async fn ws_recv(stream: &mut WsRx) -> anyhow::Result<serde_json::Value> {
    let msg = tokio::time::timeout(RECV_TIMEOUT, stream.next())
        .await
        .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
        .ok_or_else(|| anyhow::anyhow!("ws stream closed"))?
        .map_err(|e| anyhow::anyhow!("ws recv: {e}"))?;

    match msg {
        WsMessage::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected Text message, got {other:?}"),
    }
}

async fn ws_connect(addr: &std::net::SocketAddr, query: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let url = if query.is_empty() {
        format!("ws://{addr}/ws")
    } else {
        format!("ws://{addr}/ws?{query}")
    };
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| anyhow::anyhow!("ws connect: {e}"))?;
    Ok(stream.split())
}

/// Subscribe and wait for the acknowledgement.
async fn subscribe(tx: &mut WsTx, rx: &mut WsRx, connection_id: &str) -> anyhow::Result<()> {
    ws_send(tx, &json!({ "event": "subscribe", "connection_id": connection_id })).await?;
    let ack = ws_recv(rx).await?;
    assert_eq!(ack["event"], "subscribed", "ack: {ack}");
    assert_eq!(ack["connection_id"], connection_id);
    Ok(())
}

async fn server(extra: &[&str]) -> anyhow::Result<(std::net::SocketAddr, Arc<AppState>, Arc<MemoryRepository>)> {
    let (agent_addr, _hits, _agent) = spawn_agent_server().await?;
    let repo = Arc::new(MemoryRepository::new());
    let tenants = TenantConfig { tenants: vec![], default_api_key: Some("shared-key".into()) };
    let config = test_config(&format!("http://{agent_addr}"), extra);
    let state = app_state(config, tenants, Arc::clone(&repo) as Arc<dyn ShowcaseRepository>);
    let (addr, _handle) = spawn_http_server(Arc::clone(&state)).await?;
    Ok((addr, state, repo))
}

fn http() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn posted_event_reaches_subscriber() -> anyhow::Result<()> {
    let (addr, _state, _repo) = server(&[]).await?;
    let (mut tx, mut rx) = ws_connect(&addr, "").await?;
    subscribe(&mut tx, &mut rx, "abc").await?;

    let resp = http()
        .post(format!("http://{addr}/api/v1/connections/abc/events"))
        .json(&json!({ "event": "credential:offered", "payload": { "cred": "degree" } }))
        .send()
        .await?;
    let delivery: serde_json::Value = resp.json().await?;
    assert_eq!(delivery["delivered"], true);

    let msg = ws_recv(&mut rx).await?;
    assert_eq!(msg["event"], "credential:offered");
    assert_eq!(msg["connection_id"], "abc");
    assert_eq!(msg["payload"]["cred"], "degree");
    Ok(())
}

#[tokio::test]
async fn new_socket_takes_over_and_old_close_keeps_it() -> anyhow::Result<()> {
    let (addr, state, _repo) = server(&[]).await?;
    let (mut tx_a, mut rx_a) = ws_connect(&addr, "").await?;
    let (mut tx_b, mut rx_b) = ws_connect(&addr, "").await?;

    subscribe(&mut tx_a, &mut rx_a, "abc").await?;
    subscribe(&mut tx_b, &mut rx_b, "abc").await?;

    tx_a.send(WsMessage::Close(None)).await?;
    drop(tx_a);
    drop(rx_a);
    // Let the server observe the close.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(state.relay.connection_count(), 1);
    assert!(state.service.relay_event("abc", showcase::relay::RelayEvent::new("ping", json!(null))));
    assert_eq!(ws_recv(&mut rx_b).await?["event"], "ping");
    Ok(())
}

#[tokio::test]
async fn closing_socket_removes_subscription() -> anyhow::Result<()> {
    let (addr, state, _repo) = server(&[]).await?;
    let (mut tx, mut rx) = ws_connect(&addr, "").await?;
    subscribe(&mut tx, &mut rx, "abc").await?;
    assert_eq!(state.relay.connection_count(), 1);

    tx.send(WsMessage::Close(None)).await?;
    drop(tx);
    drop(rx);

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = state.relay.connection_count();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);
    Ok(())
}

#[tokio::test]
async fn webhook_is_relayed_under_topic_name() -> anyhow::Result<()> {
    let (addr, _state, _repo) = server(&[]).await?;
    let (mut tx, mut rx) = ws_connect(&addr, "").await?;
    subscribe(&mut tx, &mut rx, "conn-7").await?;

    let resp = http()
        .post(format!("http://{addr}/webhooks/topic/present_proof_v2_0"))
        .json(&json!({ "connection_id": "conn-7", "state": "done" }))
        .send()
        .await?;
    assert!(resp.status().is_success());

    let msg = ws_recv(&mut rx).await?;
    assert_eq!(msg["event"], "present_proof_v2_0");
    assert_eq!(msg["payload"]["state"], "done");
    Ok(())
}

#[tokio::test]
async fn showcase_publish_notifies_connection() -> anyhow::Result<()> {
    let (addr, _state, repo) = server(&[]).await?;
    repo.insert(Showcase {
        id: "student".into(),
        tenant_id: "t1".into(),
        name: "Student".into(),
        credential_definitions: vec![degree_definition()],
    })
    .await;
    let (mut tx, mut rx) = ws_connect(&addr, "").await?;
    subscribe(&mut tx, &mut rx, "wallet-1").await?;

    let resp = http()
        .post(format!("http://{addr}/api/v1/tenants/t1/showcases/student/publish?connection_id=wallet-1"))
        .send()
        .await?;
    let report: serde_json::Value = resp.json().await?;
    assert_eq!(report["published"], 1);
    assert_eq!(report["notified"], true);

    let msg = ws_recv(&mut rx).await?;
    assert_eq!(msg["event"], "credentials:published");
    assert_eq!(msg["payload"]["showcase_id"], "student");
    Ok(())
}

#[tokio::test]
async fn invalid_client_message_gets_error_reply() -> anyhow::Result<()> {
    let (addr, _state, _repo) = server(&[]).await?;
    let (mut tx, mut rx) = ws_connect(&addr, "").await?;

    ws_send(&mut tx, &json!({ "event": "dance" })).await?;

    let reply = ws_recv(&mut rx).await?;
    assert_eq!(reply["event"], "error");
    Ok(())
}

#[tokio::test]
async fn ws_requires_query_token_when_auth_enabled() -> anyhow::Result<()> {
    let (addr, _state, _repo) = server(&["--auth-token", "secret"]).await?;

    assert!(ws_connect(&addr, "").await.is_err());
    assert!(ws_connect(&addr, "token=wrong").await.is_err());

    let (mut tx, mut rx) = ws_connect(&addr, "token=secret").await?;
    subscribe(&mut tx, &mut rx, "abc").await?;
    Ok(())
}
