// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the showcase API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credential::CredentialDefinition;
use crate::error::ErrorCode;
use crate::publish::{JobKey, JobKind};
use crate::relay::RelayEvent;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub tenant_count: usize,
    pub job_count: usize,
    pub connection_count: usize,
    pub uptime_secs: u64,
}

/// Request body for `POST /api/v1/tenants/{tenant}/token`.
///
/// Without a token the tenant is bootstrapped from the issuing agent.
#[derive(Debug, Default, Deserialize)]
pub struct SeedRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PublishQuery {
    /// Relay connection to notify with the report.
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// Request body for `POST /api/v1/tenants/{tenant}/jobs/reset`.
///
/// Names one job, or resets every failed job of the tenant when empty.
#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: Vec<JobKey>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub delivered: bool,
}

fn error_response(code: ErrorCode, err: &impl std::fmt::Display) -> Response {
    code.to_http_response(err.to_string()).into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        tenant_count: s.access.tenant_count(),
        job_count: s.orchestrator.job_count(),
        connection_count: s.relay.connection_count(),
        uptime_secs: s.started_at.elapsed().as_secs(),
    })
}

/// `GET /api/v1/tenants` — credential status per tenant.
pub async fn list_tenants(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.access.status_list().await)
}

/// `POST /api/v1/tenants/{tenant}/token` — seed or bootstrap a tenant credential.
pub async fn seed_token(
    State(s): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(req): Json<SeedRequest>,
) -> Response {
    match req.token {
        Some(token) => {
            s.access.seed(&tenant, token, req.expires_in).await;
            Json(serde_json::json!({ "tenant": tenant, "seeded": true })).into_response()
        }
        None => match s.access.bootstrap(&tenant).await {
            Ok(()) => {
                Json(serde_json::json!({ "tenant": tenant, "bootstrapped": true })).into_response()
            }
            Err(e) => error_response(ErrorCode::from(&e), &e),
        },
    }
}

/// `POST /api/v1/tenants/{tenant}/credentials/publish` — publish one definition.
pub async fn publish_credential(
    State(s): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(definition): Json<CredentialDefinition>,
) -> Response {
    match s.service.publish_definition(&tenant, &definition).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(ErrorCode::from(&e), &e),
    }
}

/// `POST /api/v1/tenants/{tenant}/showcases/{showcase}/publish`
///
/// Always answers with the per-entity report unless the showcase is missing.
pub async fn publish_showcase(
    State(s): State<Arc<AppState>>,
    Path((tenant, showcase)): Path<(String, String)>,
    Query(query): Query<PublishQuery>,
) -> Response {
    match s
        .service
        .publish_showcase_credentials(&tenant, &showcase, query.connection_id.as_deref())
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(ErrorCode::from(&e), &e),
    }
}

/// `GET /api/v1/tenants/{tenant}/jobs`
pub async fn list_jobs(
    State(s): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    Json(s.orchestrator.jobs(&tenant))
}

/// `POST /api/v1/tenants/{tenant}/jobs/reset`
pub async fn reset_jobs(
    State(s): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(req): Json<ResetRequest>,
) -> Response {
    let reset = match (req.kind, req.entity_id) {
        (Some(kind), Some(entity_id)) => {
            let key = JobKey { tenant, kind, entity_id };
            if s.orchestrator.reset(&key) {
                vec![key]
            } else {
                vec![]
            }
        }
        (None, None) => s.orchestrator.reset_failed(&tenant),
        _ => {
            return ErrorCode::BadRequest
                .to_http_response("kind and entity_id must be given together")
                .into_response();
        }
    };
    Json(ResetResponse { reset }).into_response()
}

/// `POST /api/v1/connections/{connection_id}/events` — push a protocol event.
pub async fn relay_event(
    State(s): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
    Json(event): Json<RelayEvent>,
) -> impl IntoResponse {
    let delivered = s.service.relay_event(&connection_id, event);
    Json(DeliveryResponse { delivered })
}

/// `POST /webhooks/topic/{topic}` — relay an issuing agent webhook.
///
/// The event goes to the connection named by `connection_id` in the body.
/// Webhooks without one are acknowledged and dropped.
pub async fn webhook(
    State(s): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let connection_id = body.get("connection_id").and_then(|v| v.as_str()).map(str::to_owned);
    let delivered = match connection_id {
        Some(connection_id) => s.service.relay_event(&connection_id, RelayEvent::new(topic, body)),
        None => {
            tracing::debug!(topic = %topic, "webhook without connection_id dropped");
            false
        }
    };
    Json(DeliveryResponse { delivered })
}
