// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the issuing agent admin API.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Serialize;

use crate::agent::{AgentError, IssuingAgent, TokenGrant};
use crate::credential::mapper::{DefinitionRequest, SchemaRequest};

/// HTTP client wrapper for one issuing agent.
pub struct AgentClient {
    base_url: String,
    client: Client,
}

impl AgentClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST JSON and return the parsed response body.
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<serde_json::Value, AgentError> {
        let mut req = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                AgentError::Server { status: status.as_u16(), body }
            } else {
                AgentError::Rejected { status: status.as_u16(), body }
            });
        }

        let bytes = resp.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| AgentError::Malformed(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() {
        AgentError::Timeout
    } else {
        AgentError::Transport(e.to_string())
    }
}

/// Pull a non-empty string id from `field`, or from `sent.field` as some
/// agent versions nest it.
fn extract_id(value: &serde_json::Value, field: &str) -> Result<String, AgentError> {
    value
        .get(field)
        .or_else(|| value.get("sent").and_then(|s| s.get(field)))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AgentError::Malformed(format!("missing {field}")))
}

impl IssuingAgent for AgentClient {
    fn register_schema<'a>(
        &'a self,
        token: &'a str,
        request: &'a SchemaRequest,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        async move {
            let value = self.post_json("/schemas", Some(token), request).await?;
            extract_id(&value, "schema_id")
        }
        .boxed()
    }

    fn register_definition<'a>(
        &'a self,
        token: &'a str,
        request: &'a DefinitionRequest,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        async move {
            let value = self.post_json("/credential-definitions", Some(token), request).await?;
            extract_id(&value, "credential_definition_id")
        }
        .boxed()
    }

    fn tenant_token<'a>(
        &'a self,
        tenant: &'a str,
        api_key: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, AgentError>> {
        async move {
            let path = format!("/multitenancy/tenant/{tenant}/token");
            let body = serde_json::json!({ "api_key": api_key });
            let value = self.post_json(&path, None, &body).await?;
            let grant: TokenGrant = serde_json::from_value(value)
                .map_err(|e| AgentError::Malformed(e.to_string()))?;
            if grant.token.is_empty() {
                return Err(AgentError::Malformed("empty token".to_owned()));
            }
            Ok(grant)
        }
        .boxed()
    }
}
