// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;

use super::retry::RetryPolicy;
use super::{JobKey, JobState, PublicationJob, PublicationResult, PublishError};
use crate::agent::IssuingAgent;
use crate::credential::access::TenantAccessManager;
use crate::credential::mapper::{
    to_definition_request, to_schema_request, DefinitionRequest, MapError, SchemaRequest,
};
use crate::credential::CredentialDefinition;
use crate::state::epoch_ms;

/// An attempt sequence shared by every caller waiting on the same key.
type Attempt = Shared<BoxFuture<'static, Result<String, PublishError>>>;

struct JobSlot {
    job: Mutex<PublicationJob>,
    /// Lock order: `inflight` before `job`.
    inflight: Mutex<Option<Attempt>>,
}

enum Registration {
    Schema(SchemaRequest),
    Definition(DefinitionRequest),
}

/// Drives schema and definition registration jobs against the issuing agent.
pub struct Orchestrator {
    jobs: Mutex<HashMap<JobKey, Arc<JobSlot>>>,
    agent: Arc<dyn IssuingAgent>,
    access: Arc<TenantAccessManager>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn IssuingAgent>,
        access: Arc<TenantAccessManager>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self { jobs: Mutex::new(HashMap::new()), agent, access, retry, timeout }
    }

    /// Register the definition's schema, then the definition itself.
    ///
    /// Already registered jobs answer from the job table. A failed schema job
    /// fails the definition job with [`PublishError::SchemaDependencyFailed`]
    /// before any definition call is made; the caller gets the schema error.
    pub async fn publish(
        self: &Arc<Self>,
        tenant: &str,
        definition: &CredentialDefinition,
    ) -> Result<PublicationResult, PublishError> {
        let schema_key = JobKey::schema(tenant, &definition.schema.id);
        let definition_key = JobKey::definition(tenant, &definition.id);

        let schema_id = match self
            .run_job(schema_key, || to_schema_request(&definition.schema).map(Registration::Schema))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let cause = PublishError::SchemaDependencyFailed(Box::new(e.clone()));
                self.block_dependent(&definition_key, &cause);
                return Err(e);
            }
        };

        let definition_id = self
            .run_job(definition_key, || {
                to_definition_request(definition, &schema_id).map(Registration::Definition)
            })
            .await?;

        Ok(PublicationResult { schema_id, definition_id })
    }

    /// Snapshots of a tenant's jobs, schemas first.
    pub fn jobs(&self, tenant: &str) -> Vec<PublicationJob> {
        let slots: Vec<Arc<JobSlot>> = {
            let jobs = self.jobs.lock();
            jobs.iter().filter(|(k, _)| k.tenant == tenant).map(|(_, v)| Arc::clone(v)).collect()
        };
        let mut list: Vec<PublicationJob> = slots.iter().map(|s| s.job.lock().clone()).collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        list
    }

    pub fn job(&self, key: &JobKey) -> Option<PublicationJob> {
        let slot = self.jobs.lock().get(key).cloned()?;
        let job = slot.job.lock().clone();
        Some(job)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Return a failed job to `Pending` with a fresh attempt budget.
    ///
    /// Registered jobs and jobs with an attempt in flight are left alone.
    pub fn reset(&self, key: &JobKey) -> bool {
        let Some(slot) = self.jobs.lock().get(key).cloned() else {
            return false;
        };
        let inflight = slot.inflight.lock();
        if inflight.is_some() {
            return false;
        }
        let mut job = slot.job.lock();
        if job.state == JobState::Registered {
            return false;
        }
        *job = PublicationJob::new(key.clone());
        tracing::info!(tenant = %key.tenant, kind = ?key.kind, entity = %key.entity_id, "job reset");
        true
    }

    /// Reset every failed job of a tenant. Returns the keys that were reset.
    pub fn reset_failed(&self, tenant: &str) -> Vec<JobKey> {
        let failed: Vec<JobKey> = self
            .jobs(tenant)
            .into_iter()
            .filter(|job| job.state == JobState::Failed)
            .map(|job| job.key)
            .collect();
        failed.into_iter().filter(|key| self.reset(key)).collect()
    }

    fn slot(&self, key: &JobKey) -> Arc<JobSlot> {
        let mut jobs = self.jobs.lock();
        let slot = jobs.entry(key.clone()).or_insert_with(|| {
            Arc::new(JobSlot {
                job: Mutex::new(PublicationJob::new(key.clone())),
                inflight: Mutex::new(None),
            })
        });
        Arc::clone(slot)
    }

    /// Resolve one job: attach to its in-flight attempt, answer from the
    /// table, or start a new attempt sequence.
    ///
    /// `request` is only evaluated when a new attempt has to start.
    async fn run_job(
        self: &Arc<Self>,
        key: JobKey,
        request: impl FnOnce() -> Result<Registration, MapError>,
    ) -> Result<String, PublishError> {
        let slot = self.slot(&key);
        let attempt = {
            let mut inflight = slot.inflight.lock();
            match inflight.as_ref() {
                Some(attempt) => {
                    tracing::debug!(tenant = %key.tenant, entity = %key.entity_id, "attaching to in-flight attempt");
                    attempt.clone()
                }
                None => {
                    let mut job = slot.job.lock();
                    if job.state == JobState::Registered {
                        if let Some(ref id) = job.external_id {
                            return Ok(id.clone());
                        }
                    }
                    if self.retry.exhausted(job.attempts) {
                        if let Some(ref last) = job.last_error {
                            return Err(PublishError::PublicationAborted {
                                attempts: job.attempts,
                                last: Box::new(last.clone()),
                            });
                        }
                    }
                    let registration = match request() {
                        Ok(registration) => registration,
                        Err(e) => {
                            let err = PublishError::from(e);
                            job.state = JobState::Failed;
                            job.last_error = Some(err.clone());
                            return Err(err);
                        }
                    };
                    drop(job);

                    let driver = Arc::clone(self);
                    let driven = Arc::clone(&slot);
                    let handle = tokio::spawn(async move { driver.drive(driven, registration).await });
                    let attempt = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(PublishError::TransientAgentError(format!("attempt task failed: {e}")))
                        })
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Run attempts for one job until it registers, fails permanently, or
    /// exhausts its budget, then release the in-flight marker.
    async fn drive(self: Arc<Self>, slot: Arc<JobSlot>, registration: Registration) -> Result<String, PublishError> {
        let result = self.attempt_until_settled(&slot, &registration).await;
        *slot.inflight.lock() = None;
        result
    }

    async fn attempt_until_settled(
        &self,
        slot: &JobSlot,
        registration: &Registration,
    ) -> Result<String, PublishError> {
        loop {
            let (key, wait_ms) = {
                let job = slot.job.lock();
                let wait = job.retry_at_ms.map(|at| at.saturating_sub(epoch_ms())).unwrap_or(0);
                (job.key.clone(), wait)
            };
            if wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }

            let attempt = {
                let mut job = slot.job.lock();
                job.state = JobState::Submitting;
                job.attempts += 1;
                job.last_attempted_at_ms = Some(epoch_ms());
                job.attempts
            };
            tracing::debug!(tenant = %key.tenant, kind = ?key.kind, entity = %key.entity_id, attempt, "submitting registration");

            let outcome = self.submit(&key.tenant, registration).await;

            let mut job = slot.job.lock();
            match outcome {
                Ok(id) => {
                    job.state = JobState::Registered;
                    job.external_id = Some(id.clone());
                    job.last_error = None;
                    job.retry_at_ms = None;
                    tracing::info!(
                        tenant = %key.tenant,
                        kind = ?key.kind,
                        entity = %key.entity_id,
                        external_id = %id,
                        "registration succeeded"
                    );
                    return Ok(id);
                }
                Err(err) => {
                    let backoff = self.retry.backoff(job.attempts);
                    job.state = JobState::Failed;
                    job.last_error = Some(err.clone());
                    job.retry_at_ms = Some(epoch_ms() + backoff.as_millis() as u64);
                    tracing::warn!(
                        tenant = %key.tenant,
                        kind = ?key.kind,
                        entity = %key.entity_id,
                        attempt,
                        err = %err,
                        "registration attempt failed"
                    );

                    if !err.is_transient() {
                        return Err(err);
                    }
                    if self.retry.exhausted(job.attempts) {
                        tracing::error!(
                            tenant = %key.tenant,
                            entity = %key.entity_id,
                            attempts = job.attempts,
                            "publication aborted"
                        );
                        return Err(PublishError::PublicationAborted {
                            attempts: job.attempts,
                            last: Box::new(err),
                        });
                    }
                }
            }
        }
    }

    async fn submit(&self, tenant: &str, registration: &Registration) -> Result<String, PublishError> {
        let credential = self.access.get(tenant).await?;
        let call = match registration {
            Registration::Schema(request) => self.agent.register_schema(&credential.token, request),
            Registration::Definition(request) => {
                self.agent.register_definition(&credential.token, request)
            }
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PublishError::Timeout),
        }
    }

    /// Fail a definition job whose schema job failed, without a network call.
    fn block_dependent(&self, key: &JobKey, cause: &PublishError) {
        let slot = self.slot(key);
        let inflight = slot.inflight.lock();
        if inflight.is_some() {
            return;
        }
        let mut job = slot.job.lock();
        if job.state != JobState::Registered {
            job.state = JobState::Failed;
            job.last_error = Some(cause.clone());
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
