// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point used by the API layer: publishes a showcase's credentials and
//! forwards protocol events to the relay.

use std::sync::Arc;

use indexmap::IndexSet;
use serde::Serialize;

use crate::credential::CredentialDefinition;
use crate::error::ErrorBody;
use crate::publish::orchestrator::Orchestrator;
use crate::publish::{JobKey, JobKind, JobState, PublicationResult, PublishError};
use crate::relay::{ConnectionRelay, RelayEvent};
use crate::repository::ShowcaseRepository;

/// Event name pushed to a connection once a showcase publish completes.
pub const PUBLISHED_EVENT: &str = "credentials:published";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacadeError {
    #[error("showcase {0} not found")]
    ShowcaseNotFound(String),
    #[error("repository error: {0}")]
    Repository(String),
}

/// Status of one schema or definition after a publish run.
#[derive(Debug, Clone, Serialize)]
pub struct EntityStatus {
    pub kind: JobKind,
    pub entity_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Aggregated outcome of publishing every definition of a showcase.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub tenant: String,
    pub showcase_id: String,
    pub entries: Vec<EntityStatus>,
    /// Definitions that ended up registered.
    pub published: usize,
    pub failed: usize,
    pub notified: bool,
}

pub struct ShowcaseService {
    orchestrator: Arc<Orchestrator>,
    relay: Arc<ConnectionRelay>,
    repository: Arc<dyn ShowcaseRepository>,
}

impl ShowcaseService {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        relay: Arc<ConnectionRelay>,
        repository: Arc<dyn ShowcaseRepository>,
    ) -> Self {
        Self { orchestrator, relay, repository }
    }

    /// Publish all credential definitions of a showcase.
    ///
    /// Definitions publish concurrently and one failure never stops the
    /// others. When `notify` names a connection id the report is relayed to it.
    pub async fn publish_showcase_credentials(
        &self,
        tenant: &str,
        showcase_id: &str,
        notify: Option<&str>,
    ) -> Result<PublishReport, FacadeError> {
        let definitions = self
            .repository
            .credential_definitions(tenant, showcase_id)
            .await
            .map_err(|e| FacadeError::Repository(format!("{e:#}")))?
            .ok_or_else(|| FacadeError::ShowcaseNotFound(showcase_id.to_owned()))?;

        let outcomes = futures_util::future::join_all(
            definitions.iter().map(|definition| self.publish_definition(tenant, definition)),
        )
        .await;
        let published = outcomes.iter().filter(|o| o.is_ok()).count();

        let mut keys = IndexSet::with_capacity(definitions.len() * 2);
        for definition in &definitions {
            keys.insert(JobKey::schema(tenant, &definition.schema.id));
            keys.insert(JobKey::definition(tenant, &definition.id));
        }

        let mut report = PublishReport {
            tenant: tenant.to_owned(),
            showcase_id: showcase_id.to_owned(),
            entries: keys.into_iter().map(|key| self.entity_status(key)).collect(),
            published,
            failed: outcomes.len() - published,
            notified: false,
        };
        tracing::info!(
            tenant,
            showcase = showcase_id,
            published = report.published,
            failed = report.failed,
            "showcase publish finished"
        );

        if let Some(connection_id) = notify {
            report.notified = self.notify(connection_id, &report);
        }
        Ok(report)
    }

    /// Publish one definition and write the external ids back to the repository.
    pub async fn publish_definition(
        &self,
        tenant: &str,
        definition: &CredentialDefinition,
    ) -> Result<PublicationResult, PublishError> {
        let result = self.orchestrator.publish(tenant, definition).await?;
        if let Err(e) = self.repository.record_publication(tenant, &definition.id, &result).await {
            tracing::warn!(tenant, definition = %definition.id, err = %e, "failed to record publication");
        }
        Ok(result)
    }

    /// Forward a protocol event. Returns whether a live channel received it.
    pub fn relay_event(&self, connection_id: &str, event: RelayEvent) -> bool {
        self.relay.publish(connection_id, event)
    }

    fn entity_status(&self, key: JobKey) -> EntityStatus {
        let job = self.orchestrator.job(&key);
        EntityStatus {
            state: job.as_ref().map(|j| j.state).unwrap_or(JobState::Pending),
            external_id: job.as_ref().and_then(|j| j.external_id.clone()),
            attempts: job.as_ref().map(|j| j.attempts).unwrap_or(0),
            error: job.as_ref().and_then(|j| j.last_error.as_ref()).map(ErrorBody::from_publish),
            kind: key.kind,
            entity_id: key.entity_id,
        }
    }

    fn notify(&self, connection_id: &str, report: &PublishReport) -> bool {
        match serde_json::to_value(report) {
            Ok(payload) => self.relay.publish(connection_id, RelayEvent::new(PUBLISHED_EVENT, payload)),
            Err(e) => {
                tracing::warn!(connection_id, err = %e, "failed to encode publish report");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::relay::ConnectionRelay;
    use crate::repository::{MemoryRepository, Showcase};
    use crate::test_support::{degree_definition, fast_retry, orchestrator, rejected, FakeAgent};

    struct Fixture {
        agent: Arc<FakeAgent>,
        repo: Arc<MemoryRepository>,
        relay: Arc<ConnectionRelay>,
        service: ShowcaseService,
    }

    async fn fixture(definitions: Vec<CredentialDefinition>) -> Fixture {
        let agent = Arc::new(FakeAgent::new());
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(Showcase {
            id: "student".into(),
            tenant_id: "t1".into(),
            name: "Student".into(),
            credential_definitions: definitions,
        })
        .await;
        let relay = Arc::new(ConnectionRelay::new(8));
        let service = ShowcaseService::new(
            orchestrator(&agent, fast_retry(2)),
            Arc::clone(&relay),
            Arc::clone(&repo) as Arc<dyn ShowcaseRepository>,
        );
        Fixture { agent, repo, relay, service }
    }

    fn transcript_definition() -> CredentialDefinition {
        let mut definition = degree_definition();
        definition.id = "def-transcript".into();
        definition.version = "transcript".into();
        definition.schema.id = "schema-transcript".into();
        definition.schema.name = "transcript".into();
        definition
    }

    #[tokio::test]
    async fn publishes_every_definition_and_records_ids() -> anyhow::Result<()> {
        let f = fixture(vec![degree_definition(), transcript_definition()]).await;

        let report = f.service.publish_showcase_credentials("t1", "student", None).await?;

        assert_eq!(report.published, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.entries.len(), 4);
        assert!(report.entries.iter().all(|e| e.state == JobState::Registered));
        let recorded = f.repo.publication("t1", "def-degree").await;
        assert_eq!(
            recorded.map(|r| r.definition_id),
            Some("did:sov:issuer:2:degree:1.0:CL:default".to_owned())
        );
        Ok(())
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() -> anyhow::Result<()> {
        let mut broken = transcript_definition();
        broken.schema.attributes.clear();
        let f = fixture(vec![degree_definition(), broken]).await;

        let report = f.service.publish_showcase_credentials("t1", "student", None).await?;

        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 1);
        let schema = report.entries.iter().find(|e| e.entity_id == "schema-transcript");
        assert_eq!(
            schema.and_then(|e| e.error.as_ref()).map(|e| e.code.as_str()),
            Some("INVALID_SCHEMA")
        );
        let definition = report.entries.iter().find(|e| e.entity_id == "def-transcript");
        assert_eq!(
            definition.and_then(|e| e.error.as_ref()).map(|e| e.code.as_str()),
            Some("SCHEMA_DEPENDENCY_FAILED")
        );
        assert!(f.repo.publication("t1", "def-transcript").await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn shared_schema_is_listed_once() -> anyhow::Result<()> {
        let mut revocable = degree_definition();
        revocable.id = "def-degree-revocable".into();
        revocable.version = "revocable".into();
        let f = fixture(vec![degree_definition(), revocable]).await;

        let report = f.service.publish_showcase_credentials("t1", "student", None).await?;

        assert_eq!(report.entries.len(), 3);
        assert_eq!(f.agent.schema_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_showcase_is_not_found() {
        let f = fixture(vec![]).await;
        let err = f.service.publish_showcase_credentials("t2", "student", None).await;
        assert!(matches!(err, Err(FacadeError::ShowcaseNotFound(ref id)) if id == "student"));
    }

    #[tokio::test]
    async fn report_is_relayed_to_connection() -> anyhow::Result<()> {
        let f = fixture(vec![degree_definition()]).await;
        f.agent.fail_definition(rejected(), 1);
        let (channel, mut rx) = f.relay.open_channel();
        f.relay.subscribe("wallet-1", &channel);

        let report = f.service.publish_showcase_credentials("t1", "student", Some("wallet-1")).await?;

        assert!(report.notified);
        let message = rx.try_recv()?;
        assert_eq!(message.event, PUBLISHED_EVENT);
        assert_eq!(message.payload["failed"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn notify_without_subscriber_is_not_an_error() -> anyhow::Result<()> {
        let f = fixture(vec![degree_definition()]).await;
        let report = f.service.publish_showcase_credentials("t1", "student", Some("gone")).await?;
        assert!(!report.notified);
        assert_eq!(report.published, 1);
        Ok(())
    }
}
