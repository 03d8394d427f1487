// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit and integration tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::client::AgentClient;
use crate::agent::{AgentError, IssuingAgent, TokenGrant};
use crate::config::{BootstrapPolicy, ShowcaseConfig};
use crate::credential::access::{AccessSettings, TenantAccessManager};
use crate::credential::mapper::{DefinitionRequest, SchemaRequest};
use crate::credential::{CredentialDefinition, CredentialSchema, TenantConfig, TenantEntry};
use crate::publish::orchestrator::Orchestrator;
use crate::publish::retry::RetryPolicy;
use crate::repository::ShowcaseRepository;
use crate::state::AppState;

/// In-process issuing agent that counts calls and replays scripted failures.
#[derive(Default)]
pub struct FakeAgent {
    pub schema_calls: AtomicU32,
    pub definition_calls: AtomicU32,
    pub token_calls: AtomicU32,
    schema_failures: Mutex<VecDeque<AgentError>>,
    definition_failures: Mutex<VecDeque<AgentError>>,
    token_failures: Mutex<VecDeque<AgentError>>,
    delay: Duration,
    expires_in: Option<u64>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self { expires_in: Some(3600), ..Self::default() }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_expires_in(mut self, expires_in: Option<u64>) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub fn fail_schema(&self, err: AgentError, times: usize) {
        self.schema_failures.lock().extend(std::iter::repeat(err).take(times));
    }

    pub fn fail_definition(&self, err: AgentError, times: usize) {
        self.definition_failures.lock().extend(std::iter::repeat(err).take(times));
    }

    pub fn fail_token(&self, err: AgentError, times: usize) {
        self.token_failures.lock().extend(std::iter::repeat(err).take(times));
    }

    pub fn schema_calls(&self) -> u32 {
        self.schema_calls.load(Ordering::SeqCst)
    }

    pub fn definition_calls(&self) -> u32 {
        self.definition_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> u32 {
        self.token_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl IssuingAgent for FakeAgent {
    fn register_schema<'a>(
        &'a self,
        _token: &'a str,
        request: &'a SchemaRequest,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        async move {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if let Some(err) = self.schema_failures.lock().pop_front() {
                return Err(err);
            }
            Ok(format!("did:sov:issuer:2:{}:{}", request.schema_name, request.schema_version))
        }
        .boxed()
    }

    fn register_definition<'a>(
        &'a self,
        _token: &'a str,
        request: &'a DefinitionRequest,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        async move {
            self.definition_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if let Some(err) = self.definition_failures.lock().pop_front() {
                return Err(err);
            }
            Ok(format!("{}:CL:{}", request.schema_id, request.tag))
        }
        .boxed()
    }

    fn tenant_token<'a>(
        &'a self,
        tenant: &'a str,
        _api_key: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, AgentError>> {
        async move {
            let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.pause().await;
            if let Some(err) = self.token_failures.lock().pop_front() {
                return Err(err);
            }
            Ok(TokenGrant { token: format!("token-{tenant}-{n}"), expires_in: self.expires_in })
        }
        .boxed()
    }
}

pub fn server_error() -> AgentError {
    AgentError::Server { status: 503, body: "unavailable".into() }
}

pub fn rejected() -> AgentError {
    AgentError::Rejected { status: 400, body: "bad request".into() }
}

/// Tenant keys where every tenant is known through a default key.
pub fn open_tenants() -> TenantConfig {
    TenantConfig {
        tenants: vec![TenantEntry { id: "t1".into(), api_key: "key-t1".into() }],
        default_api_key: Some("default-key".into()),
    }
}

pub fn access_settings() -> AccessSettings {
    AccessSettings {
        policy: BootstrapPolicy::OnDemand,
        refresh_lead: Duration::from_secs(60),
        retention: Duration::from_secs(300),
        token_ttl: Duration::from_secs(3600),
        timeout: Duration::from_secs(5),
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base: Duration::from_millis(1),
        ceiling: Duration::from_millis(5),
    }
}

pub fn access_manager(agent: &Arc<FakeAgent>) -> Arc<TenantAccessManager> {
    Arc::new(TenantAccessManager::new(
        Arc::clone(agent) as Arc<dyn IssuingAgent>,
        open_tenants(),
        access_settings(),
    ))
}

pub fn orchestrator(agent: &Arc<FakeAgent>, retry: RetryPolicy) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::clone(agent) as Arc<dyn IssuingAgent>,
        access_manager(agent),
        retry,
        Duration::from_secs(5),
    ))
}

pub fn degree_schema() -> CredentialSchema {
    CredentialSchema {
        id: "schema-degree".into(),
        name: "degree".into(),
        version: "1.0".into(),
        attributes: vec!["name".into(), "gpa".into()],
    }
}

pub fn degree_definition() -> CredentialDefinition {
    CredentialDefinition {
        id: "def-degree".into(),
        version: "default".into(),
        revocation: false,
        schema: degree_schema(),
    }
}

// -- HTTP fixtures --------------------------------------------------------------

/// Requests served by [`spawn_agent_server`].
#[derive(Debug, Default)]
pub struct AgentHits {
    pub schemas: AtomicU32,
    pub definitions: AtomicU32,
    pub tokens: AtomicU32,
}

impl AgentHits {
    /// `(schemas, definitions, tokens)`
    pub fn counts(&self) -> (u32, u32, u32) {
        (
            self.schemas.load(Ordering::SeqCst),
            self.definitions.load(Ordering::SeqCst),
            self.tokens.load(Ordering::SeqCst),
        )
    }
}

fn has_bearer(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer token-"))
}

async fn agent_schema(
    State(hits): State<Arc<AgentHits>>,
    headers: HeaderMap,
    Json(req): Json<SchemaRequest>,
) -> Response {
    if !has_bearer(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    hits.schemas.fetch_add(1, Ordering::SeqCst);
    let schema_id = format!("did:sov:issuer:2:{}:{}", req.schema_name, req.schema_version);
    Json(serde_json::json!({ "sent": { "schema_id": schema_id } })).into_response()
}

async fn agent_definition(
    State(hits): State<Arc<AgentHits>>,
    headers: HeaderMap,
    Json(req): Json<DefinitionRequest>,
) -> Response {
    if !has_bearer(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    hits.definitions.fetch_add(1, Ordering::SeqCst);
    let id = format!("{}:CL:{}", req.schema_id, req.tag);
    Json(serde_json::json!({ "credential_definition_id": id })).into_response()
}

async fn agent_token(
    State(hits): State<Arc<AgentHits>>,
    Path(tenant): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let key = body.get("api_key").and_then(|v| v.as_str()).unwrap_or_default();
    if key.is_empty() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = hits.tokens.fetch_add(1, Ordering::SeqCst) + 1;
    Json(serde_json::json!({ "token": format!("token-{tenant}-{n}"), "expires_in": 3600 }))
        .into_response()
}

/// Serve a minimal issuing agent on a random local port.
pub async fn spawn_agent_server() -> anyhow::Result<(SocketAddr, Arc<AgentHits>, JoinHandle<()>)> {
    let hits = Arc::new(AgentHits::default());
    let router = Router::new()
        .route("/schemas", post(agent_schema))
        .route("/credential-definitions", post(agent_definition))
        .route("/multitenancy/tenant/{tenant}/token", post(agent_token))
        .with_state(Arc::clone(&hits));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, hits, handle))
}

/// Service config pointing at `agent_url`, with extra CLI flags applied.
pub fn test_config(agent_url: &str, extra: &[&str]) -> ShowcaseConfig {
    let mut args = vec!["showcase", "--port", "0", "--agent-url", agent_url];
    args.extend_from_slice(extra);
    ShowcaseConfig::parse_from(args)
}

/// Full service state backed by a real [`AgentClient`].
pub fn app_state(
    config: ShowcaseConfig,
    tenants: TenantConfig,
    repository: Arc<dyn ShowcaseRepository>,
) -> Arc<AppState> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let agent = Arc::new(AgentClient::new(config.agent_url.clone(), config.agent_timeout()));
    Arc::new(AppState::new(config, CancellationToken::new(), agent, tenants, repository))
}

/// Spawn the HTTP server on a random port for integration testing.
pub async fn spawn_http_server(
    state: Arc<AppState>,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}
