// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::credential::access::AccessError;
use crate::facade::FacadeError;
use crate::publish::PublishError;

/// Error codes for the showcase API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    NotFound,
    TenantUnknown,
    InvalidSchema,
    SchemaDependencyFailed,
    AgentRejected,
    Timeout,
    UpstreamError,
    PublicationAborted,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound | Self::TenantUnknown => 404,
            Self::InvalidSchema => 422,
            Self::SchemaDependencyFailed => 424,
            Self::AgentRejected | Self::UpstreamError => 502,
            Self::PublicationAborted => 503,
            Self::Timeout => 504,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::TenantUnknown => "TENANT_UNKNOWN",
            Self::InvalidSchema => "INVALID_SCHEMA",
            Self::SchemaDependencyFailed => "SCHEMA_DEPENDENCY_FAILED",
            Self::AgentRejected => "AGENT_REJECTED",
            Self::Timeout => "TIMEOUT",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::PublicationAborted => "PUBLICATION_ABORTED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&PublishError> for ErrorCode {
    fn from(err: &PublishError) -> Self {
        match err {
            PublishError::InvalidSchema(_) => Self::InvalidSchema,
            PublishError::TenantUnknown(_) => Self::TenantUnknown,
            PublishError::SchemaDependencyFailed(_) => Self::SchemaDependencyFailed,
            PublishError::Timeout => Self::Timeout,
            PublishError::TransientAgentError(_) => Self::UpstreamError,
            PublishError::AgentRejected { .. } => Self::AgentRejected,
            PublishError::PublicationAborted { .. } => Self::PublicationAborted,
        }
    }
}

impl From<&AccessError> for ErrorCode {
    fn from(err: &AccessError) -> Self {
        match err {
            AccessError::TenantUnknown(_) => Self::TenantUnknown,
            AccessError::Bootstrap { .. } | AccessError::RefreshFailed { .. } => {
                Self::UpstreamError
            }
        }
    }
}

impl From<&FacadeError> for ErrorCode {
    fn from(err: &FacadeError) -> Self {
        match err {
            FacadeError::ShowcaseNotFound(_) => Self::NotFound,
            FacadeError::Repository(_) => Self::Internal,
        }
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn from_publish(err: &PublishError) -> Self {
        ErrorCode::from(err).to_error_body(err.to_string())
    }
}
