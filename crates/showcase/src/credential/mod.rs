// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential entities and tenant credential configuration.
//!
//! Schemas and definitions are the local records an operator builds into a
//! showcase. They have no ledger identity until the publication orchestrator
//! registers them with the issuing agent. Tenant API credentials are owned by
//! the [`access::TenantAccessManager`] and handed out as snapshots.

pub mod access;
pub mod mapper;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A local credential schema record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSchema {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Attribute names, unique within the schema. Order is kept as written.
    pub attributes: Vec<String>,
}

/// A local credential definition record bound to exactly one schema record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDefinition {
    pub id: String,
    /// Version tag; used as the ledger definition tag.
    pub version: String,
    #[serde(default)]
    pub revocation: bool,
    pub schema: CredentialSchema,
}

/// Tenant-scoped bearer credential issued by the agent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredential {
    pub token: String,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub last_refreshed_at_ms: u64,
}

impl ApiCredential {
    /// Build a credential issued at `now_ms` that lives for `ttl`.
    pub fn issued(token: String, now_ms: u64, ttl: Duration) -> Self {
        Self {
            token,
            issued_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl.as_millis() as u64),
            last_refreshed_at_ms: now_ms,
        }
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }

    /// True when the credential expires within `lead` of `now_ms`.
    pub fn expires_within(&self, now_ms: u64, lead: Duration) -> bool {
        self.expires_at_ms <= now_ms.saturating_add(lead.as_millis() as u64)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("token", &"<redacted>")
            .field("issued_at_ms", &self.issued_at_ms)
            .field("expires_at_ms", &self.expires_at_ms)
            .field("last_refreshed_at_ms", &self.last_refreshed_at_ms)
            .finish()
    }
}

/// Tenant API keys loaded from `--tenant-config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    #[serde(default)]
    pub tenants: Vec<TenantEntry>,
    /// Key used for tenants not listed in `tenants`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_api_key: Option<String>,
}

/// API key for a single tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEntry {
    pub id: String,
    pub api_key: String,
}

impl TenantConfig {
    /// Look up the API key used to request credentials for `tenant`.
    pub fn api_key(&self, tenant: &str) -> Option<&str> {
        self.tenants
            .iter()
            .find(|t| t.id == tenant)
            .map(|t| t.api_key.as_str())
            .or(self.default_api_key.as_deref())
    }

    /// Load from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_prefers_listed_tenant() {
        let config = TenantConfig {
            tenants: vec![TenantEntry { id: "t1".into(), api_key: "k1".into() }],
            default_api_key: Some("fallback".into()),
        };
        assert_eq!(config.api_key("t1"), Some("k1"));
        assert_eq!(config.api_key("t2"), Some("fallback"));
    }

    #[test]
    fn api_key_missing_without_default() {
        let config = TenantConfig::default();
        assert_eq!(config.api_key("t1"), None);
    }

    #[test]
    fn expiry_window() {
        let cred = ApiCredential::issued("tok".into(), 1_000, Duration::from_secs(30));
        assert_eq!(cred.expires_at_ms, 31_000);
        assert!(!cred.is_expired_at(30_999));
        assert!(cred.is_expired_at(31_000));
        assert!(cred.expires_within(1_000, Duration::from_secs(60)));
        assert!(!cred.expires_within(1_000, Duration::from_secs(10)));
    }

    #[test]
    fn debug_redacts_token() {
        let cred = ApiCredential::issued("secret-token".into(), 0, Duration::from_secs(1));
        assert!(!format!("{cred:?}").contains("secret-token"));
    }
}
