// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translation of local schema/definition records into issuing agent requests.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::credential::{CredentialDefinition, CredentialSchema};

/// Revocation registry size requested for every revocable definition.
pub const REVOCATION_REGISTRY_SIZE: u32 = 1000;

/// Body of the agent's schema registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRequest {
    pub schema_name: String,
    pub schema_version: String,
    pub attributes: Vec<String>,
}

/// Body of the agent's credential definition registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRequest {
    pub schema_id: String,
    pub tag: String,
    pub support_revocation: bool,
    pub revocation_registry_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("schema {schema} is invalid: {reason}")]
    InvalidSchema { schema: String, reason: String },
    #[error("definition {definition} has no ledger schema id")]
    MissingSchemaId { definition: String },
}

pub fn to_schema_request(schema: &CredentialSchema) -> Result<SchemaRequest, MapError> {
    let invalid = |reason: &str| MapError::InvalidSchema {
        schema: schema.id.clone(),
        reason: reason.to_owned(),
    };

    if schema.attributes.is_empty() {
        return Err(invalid("no attributes"));
    }

    let mut seen = IndexSet::with_capacity(schema.attributes.len());
    for name in &schema.attributes {
        if name.trim().is_empty() {
            return Err(invalid("blank attribute name"));
        }
        if !seen.insert(name.as_str()) {
            return Err(invalid(&format!("duplicate attribute {name}")));
        }
    }

    Ok(SchemaRequest {
        schema_name: schema.name.clone(),
        schema_version: schema.version.clone(),
        attributes: seen.into_iter().map(str::to_owned).collect(),
    })
}

pub fn to_definition_request(
    definition: &CredentialDefinition,
    external_schema_id: &str,
) -> Result<DefinitionRequest, MapError> {
    if external_schema_id.is_empty() {
        return Err(MapError::MissingSchemaId { definition: definition.id.clone() });
    }
    Ok(DefinitionRequest {
        schema_id: external_schema_id.to_owned(),
        tag: definition.version.clone(),
        support_revocation: definition.revocation,
        revocation_registry_size: REVOCATION_REGISTRY_SIZE,
    })
}

#[cfg(test)]
#[path = "mapper_tests.rs"]
mod tests;
