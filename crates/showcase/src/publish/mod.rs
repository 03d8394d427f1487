// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential publication: registering schemas and definitions with the
//! issuing agent as idempotent, retryable jobs.
//!
//! Each job is keyed by `(tenant, kind, entity id)`. A registered job answers
//! every later request for its key from the job table. Attempts for one key
//! never overlap; callers arriving during an attempt wait on it instead of
//! starting their own.

pub mod orchestrator;
pub mod retry;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::agent::AgentError;
use crate::credential::access::AccessError;
use crate::credential::mapper::MapError;
use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Schema,
    Definition,
}

/// Idempotency key of a publication job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub tenant: String,
    pub kind: JobKind,
    pub entity_id: String,
}

impl JobKey {
    pub fn schema(tenant: &str, schema_id: &str) -> Self {
        Self { tenant: tenant.to_owned(), kind: JobKind::Schema, entity_id: schema_id.to_owned() }
    }

    pub fn definition(tenant: &str, definition_id: &str) -> Self {
        Self {
            tenant: tenant.to_owned(),
            kind: JobKind::Definition,
            entity_id: definition_id.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Submitting,
    Registered,
    Failed,
}

/// Snapshot of one registration job.
#[derive(Debug, Clone, Serialize)]
pub struct PublicationJob {
    pub key: JobKey,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<PublishError>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempted_at_ms: Option<u64>,
    /// Earliest time the next attempt may start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at_ms: Option<u64>,
}

impl PublicationJob {
    pub fn new(key: JobKey) -> Self {
        Self {
            key,
            state: JobState::Pending,
            external_id: None,
            last_error: None,
            attempts: 0,
            last_attempted_at_ms: None,
            retry_at_ms: None,
        }
    }
}

/// External ids of a published schema/definition pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationResult {
    pub schema_id: String,
    pub definition_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("tenant {0} is unknown")]
    TenantUnknown(String),
    #[error("schema dependency failed: {0}")]
    SchemaDependencyFailed(Box<PublishError>),
    #[error("issuing agent timed out")]
    Timeout,
    #[error("issuing agent error: {0}")]
    TransientAgentError(String),
    #[error("issuing agent rejected registration ({status}): {message}")]
    AgentRejected { status: u16, message: String },
    #[error("publication aborted after {attempts} attempts: {last}")]
    PublicationAborted { attempts: u32, last: Box<PublishError> },
}

impl PublishError {
    /// Whether the orchestrator retries this failure on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::TransientAgentError(_))
    }
}

impl From<AgentError> for PublishError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Timeout => Self::Timeout,
            AgentError::Rejected { status, body } => Self::AgentRejected { status, message: body },
            other => Self::TransientAgentError(other.to_string()),
        }
    }
}

impl From<AccessError> for PublishError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::TenantUnknown(tenant) => Self::TenantUnknown(tenant),
            AccessError::Bootstrap { source, .. } => source.into(),
            other @ AccessError::RefreshFailed { .. } => Self::TransientAgentError(other.to_string()),
        }
    }
}

impl From<MapError> for PublishError {
    fn from(err: MapError) -> Self {
        Self::InvalidSchema(err.to_string())
    }
}

impl Serialize for PublishError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PublishError", 2)?;
        s.serialize_field("code", ErrorCode::from(self).as_str())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}
