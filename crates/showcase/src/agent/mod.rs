// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issuing agent boundary: the calls the service makes to the ledger-backed
//! agent, and the HTTP client that implements them.

pub mod client;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::credential::mapper::{DefinitionRequest, SchemaRequest};

/// Failure of a single issuing agent call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("agent call timed out")]
    Timeout,
    #[error("agent unreachable: {0}")]
    Transport(String),
    #[error("agent server error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("agent rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed agent response: {0}")]
    Malformed(String),
}

/// Credential returned by the tenant-identity endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    /// Lifetime in seconds, when the agent reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Operations the service needs from the issuing agent.
///
/// Registration calls return the ledger identifier assigned by the agent.
pub trait IssuingAgent: Send + Sync {
    fn register_schema<'a>(
        &'a self,
        token: &'a str,
        request: &'a SchemaRequest,
    ) -> BoxFuture<'a, Result<String, AgentError>>;

    fn register_definition<'a>(
        &'a self,
        token: &'a str,
        request: &'a DefinitionRequest,
    ) -> BoxFuture<'a, Result<String, AgentError>>;

    fn tenant_token<'a>(
        &'a self,
        tenant: &'a str,
        api_key: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, AgentError>>;
}
