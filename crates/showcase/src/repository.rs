// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-scoped access to showcases and their credential definitions.

use std::collections::HashMap;
use std::path::Path;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::credential::CredentialDefinition;
use crate::publish::PublicationResult;

/// Storage behind the facade. Every lookup is scoped to one tenant.
pub trait ShowcaseRepository: Send + Sync {
    /// Credential definitions referenced by a showcase, or `None` when the
    /// tenant has no such showcase.
    fn credential_definitions<'a>(
        &'a self,
        tenant: &'a str,
        showcase_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<Vec<CredentialDefinition>>>>;

    /// Store the external ids of a published definition.
    fn record_publication<'a>(
        &'a self,
        tenant: &'a str,
        definition_id: &'a str,
        result: &'a PublicationResult,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Showcase {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub credential_definitions: Vec<CredentialDefinition>,
}

/// On-disk seed for [`MemoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowcaseFile {
    #[serde(default)]
    pub showcases: Vec<Showcase>,
}

type TenantKey = (String, String);

/// In-memory repository, optionally seeded from a JSON file.
#[derive(Default)]
pub struct MemoryRepository {
    showcases: RwLock<HashMap<TenantKey, Showcase>>,
    publications: RwLock<HashMap<TenantKey, PublicationResult>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: ShowcaseFile = serde_json::from_str(&contents)?;
        let showcases = file
            .showcases
            .into_iter()
            .map(|s| ((s.tenant_id.clone(), s.id.clone()), s))
            .collect();
        Ok(Self { showcases: RwLock::new(showcases), publications: RwLock::default() })
    }

    pub async fn insert(&self, showcase: Showcase) {
        let key = (showcase.tenant_id.clone(), showcase.id.clone());
        self.showcases.write().await.insert(key, showcase);
    }

    /// External ids recorded for a definition.
    pub async fn publication(&self, tenant: &str, definition_id: &str) -> Option<PublicationResult> {
        let key = (tenant.to_owned(), definition_id.to_owned());
        self.publications.read().await.get(&key).cloned()
    }

    pub async fn showcase_count(&self) -> usize {
        self.showcases.read().await.len()
    }
}

impl ShowcaseRepository for MemoryRepository {
    fn credential_definitions<'a>(
        &'a self,
        tenant: &'a str,
        showcase_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<Vec<CredentialDefinition>>>> {
        async move {
            let key = (tenant.to_owned(), showcase_id.to_owned());
            let showcases = self.showcases.read().await;
            Ok(showcases.get(&key).map(|s| s.credential_definitions.clone()))
        }
        .boxed()
    }

    fn record_publication<'a>(
        &'a self,
        tenant: &'a str,
        definition_id: &'a str,
        result: &'a PublicationResult,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            let key = (tenant.to_owned(), definition_id.to_owned());
            self.publications.write().await.insert(key, result.clone());
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::test_support::degree_definition;

    fn showcase(tenant: &str) -> Showcase {
        Showcase {
            id: "student".into(),
            tenant_id: tenant.into(),
            name: "Student onboarding".into(),
            credential_definitions: vec![degree_definition()],
        }
    }

    #[tokio::test]
    async fn lookups_are_tenant_scoped() -> anyhow::Result<()> {
        let repo = MemoryRepository::new();
        repo.insert(showcase("t1")).await;

        let found = repo.credential_definitions("t1", "student").await?;
        assert_eq!(found.map(|defs| defs.len()), Some(1));
        assert!(repo.credential_definitions("t2", "student").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn record_publication_is_readable() -> anyhow::Result<()> {
        let repo = MemoryRepository::new();
        let result = PublicationResult { schema_id: "s".into(), definition_id: "d".into() };

        repo.record_publication("t1", "def-degree", &result).await?;

        assert_eq!(repo.publication("t1", "def-degree").await, Some(result));
        assert_eq!(repo.publication("t2", "def-degree").await, None);
        Ok(())
    }

    #[tokio::test]
    async fn from_file_loads_showcases() -> anyhow::Result<()> {
        let file = ShowcaseFile { showcases: vec![showcase("t1"), showcase("t2")] };
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(serde_json::to_string(&file)?.as_bytes())?;

        let repo = MemoryRepository::from_file(tmp.path())?;

        assert_eq!(repo.showcase_count().await, 2);
        assert!(repo.credential_definitions("t2", "student").await?.is_some());
        Ok(())
    }

    #[test]
    fn from_file_rejects_malformed_json() -> anyhow::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(b"{ not json")?;
        assert!(MemoryRepository::from_file(tmp.path()).is_err());
        Ok(())
    }
}
