// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant credential access: one API credential per tenant, refreshed before
//! expiry and evicted once stale and idle.
//!
//! The tenant map lock is held only to find or remove a tenant's slot. All
//! reads and writes of a credential happen under that tenant's own async lock,
//! so a bootstrap or refresh for one tenant never blocks another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentError, IssuingAgent};
use crate::config::{BootstrapPolicy, ShowcaseConfig};
use crate::credential::{ApiCredential, TenantConfig};
use crate::state::epoch_ms;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("tenant {0} is unknown")]
    TenantUnknown(String),
    #[error("credential bootstrap for tenant {tenant} failed: {source}")]
    Bootstrap { tenant: String, source: AgentError },
    #[error("credential refresh for tenant {tenant} failed: {reason}")]
    RefreshFailed { tenant: String, reason: String },
}

/// Tunables for the access manager.
#[derive(Debug, Clone)]
pub struct AccessSettings {
    pub policy: BootstrapPolicy,
    /// Refresh credentials expiring within this window.
    pub refresh_lead: Duration,
    /// Expired-and-idle time after which a tenant is evicted.
    pub retention: Duration,
    /// Lifetime assumed when the agent omits `expires_in`.
    pub token_ttl: Duration,
    /// Bound on every identity endpoint call.
    pub timeout: Duration,
}

impl AccessSettings {
    pub fn from_config(config: &ShowcaseConfig) -> Self {
        Self {
            policy: config.bootstrap,
            refresh_lead: config.refresh_lead(),
            retention: config.gc_retention(),
            token_ttl: config.token_ttl(),
            timeout: config.agent_timeout(),
        }
    }
}

#[derive(Default)]
struct TenantSlot {
    state: tokio::sync::Mutex<TenantState>,
}

#[derive(Default)]
struct TenantState {
    credential: Option<ApiCredential>,
    last_used_ms: u64,
    last_error: Option<AccessError>,
    /// Set when garbage collection removed this slot from the map.
    evicted: bool,
}

/// Outcome of one `refresh_all` sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// Status info for a tenant (returned by the API).
#[derive(Debug, Clone, Serialize)]
pub struct TenantStatus {
    pub tenant: String,
    pub has_credential: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    pub last_used_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Owns the per-tenant API credentials.
pub struct TenantAccessManager {
    tenants: Mutex<HashMap<String, Arc<TenantSlot>>>,
    agent: Arc<dyn IssuingAgent>,
    keys: TenantConfig,
    settings: AccessSettings,
}

impl TenantAccessManager {
    pub fn new(agent: Arc<dyn IssuingAgent>, keys: TenantConfig, settings: AccessSettings) -> Self {
        Self { tenants: Mutex::new(HashMap::new()), agent, keys, settings }
    }

    /// Return a snapshot of the tenant's current credential.
    ///
    /// Waits for an in-flight bootstrap or refresh of the same tenant. An
    /// unknown tenant is bootstrapped when the policy allows it. The returned
    /// credential may be expired if its last refresh failed.
    pub async fn get(&self, tenant: &str) -> Result<ApiCredential, AccessError> {
        loop {
            let slot = match self.policy_slot(tenant) {
                Some(slot) => slot,
                None => return Err(AccessError::TenantUnknown(tenant.to_owned())),
            };
            let mut state = slot.state.lock().await;
            if state.evicted {
                continue;
            }

            if let Some(credential) = state.credential.clone() {
                state.last_used_ms = epoch_ms();
                return Ok(credential);
            }
            if self.settings.policy == BootstrapPolicy::Disabled {
                drop(state);
                self.discard_empty(tenant);
                return Err(AccessError::TenantUnknown(tenant.to_owned()));
            }

            match self.fetch(tenant).await {
                Ok(credential) => {
                    tracing::info!(tenant, "tenant credential bootstrapped");
                    state.credential = Some(credential.clone());
                    state.last_used_ms = epoch_ms();
                    state.last_error = None;
                    return Ok(credential);
                }
                Err(e) => {
                    tracing::warn!(tenant, err = %e, "tenant credential bootstrap failed");
                    drop(state);
                    self.discard_empty(tenant);
                    return Err(e);
                }
            }
        }
    }

    /// Fetch and install a credential regardless of the bootstrap policy.
    pub async fn bootstrap(&self, tenant: &str) -> Result<(), AccessError> {
        let slot = self.live_slot(tenant).await;
        let mut state = slot.state.lock().await;
        match self.fetch(tenant).await {
            Ok(credential) => {
                state.credential = Some(credential.clone());
                if state.last_used_ms == 0 {
                    state.last_used_ms = credential.issued_at_ms;
                }
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                if state.credential.is_some() {
                    state.last_error = Some(e.clone());
                } else {
                    drop(state);
                    self.discard_empty(tenant);
                }
                Err(e)
            }
        }
    }

    /// Bootstrap every tenant listed in the tenant config. Failures are logged.
    pub async fn bootstrap_configured(&self) {
        let tenants: Vec<String> = self.keys.tenants.iter().map(|t| t.id.clone()).collect();
        let results = futures_util::future::join_all(
            tenants.iter().map(|tenant| async move { (tenant, self.bootstrap(tenant).await) }),
        )
        .await;
        for (tenant, result) in results {
            match result {
                Ok(()) => tracing::info!(tenant = %tenant, "tenant credential bootstrapped"),
                Err(e) => tracing::warn!(tenant = %tenant, err = %e, "startup bootstrap failed"),
            }
        }
    }

    /// Install a credential supplied by an operator.
    pub async fn seed(&self, tenant: &str, token: String, expires_in: Option<u64>) {
        let ttl = expires_in.map(Duration::from_secs).unwrap_or(self.settings.token_ttl);
        self.seed_credential(tenant, ApiCredential::issued(token, epoch_ms(), ttl)).await;
    }

    /// Install a prepared credential. Seeding does not count as a use.
    pub async fn seed_credential(&self, tenant: &str, credential: ApiCredential) {
        let slot = self.live_slot(tenant).await;
        let mut state = slot.state.lock().await;
        state.last_used_ms = state.last_used_ms.max(credential.issued_at_ms);
        state.credential = Some(credential);
        state.last_error = None;
        tracing::info!(tenant, "tenant credential seeded");
    }

    /// Refresh every credential that expires within the lead time.
    ///
    /// Tenants are refreshed concurrently. A failed refresh keeps the old
    /// credential and records the error on the tenant.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let slots: Vec<(String, Arc<TenantSlot>)> = {
            let tenants = self.tenants.lock();
            tenants.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let outcomes = futures_util::future::join_all(
            slots.iter().map(|(tenant, slot)| self.refresh_one(tenant, slot)),
        )
        .await;

        let mut summary = RefreshSummary::default();
        for outcome in outcomes.into_iter().flatten() {
            if outcome {
                summary.refreshed += 1;
            } else {
                summary.failed += 1;
            }
        }
        if summary.refreshed + summary.failed > 0 {
            tracing::debug!(
                refreshed = summary.refreshed,
                failed = summary.failed,
                "credential refresh sweep"
            );
        }
        summary
    }

    /// Returns `None` when no refresh was due, otherwise whether it succeeded.
    ///
    /// Tenants unused for longer than the retention window are left to lapse
    /// so garbage collection can evict them.
    async fn refresh_one(&self, tenant: &str, slot: &TenantSlot) -> Option<bool> {
        let mut state = slot.state.lock().await;
        if state.evicted {
            return None;
        }
        let now = epoch_ms();
        if now.saturating_sub(state.last_used_ms) > self.settings.retention.as_millis() as u64 {
            return None;
        }
        let due = state
            .credential
            .as_ref()
            .is_some_and(|c| c.expires_within(now, self.settings.refresh_lead));
        if !due {
            return None;
        }

        match self.fetch(tenant).await {
            Ok(credential) => {
                state.credential = Some(credential);
                state.last_error = None;
                tracing::info!(tenant, "tenant credential refreshed");
                Some(true)
            }
            Err(e) => {
                let reason = match e {
                    AccessError::Bootstrap { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                let err = AccessError::RefreshFailed { tenant: tenant.to_owned(), reason };
                tracing::warn!(tenant, err = %err, "tenant credential refresh failed");
                state.last_error = Some(err);
                Some(false)
            }
        }
    }

    /// Evict tenants whose credential expired and that went unused for longer
    /// than the retention window. Returns the evicted tenant ids.
    pub fn collect_garbage(&self) -> Vec<String> {
        self.collect_garbage_at(epoch_ms())
    }

    pub fn collect_garbage_at(&self, now_ms: u64) -> Vec<String> {
        let retention = self.settings.retention.as_millis() as u64;
        let mut removed = Vec::new();
        let mut tenants = self.tenants.lock();
        tenants.retain(|tenant, slot| {
            // Busy slots are mid-bootstrap or mid-refresh; check next sweep.
            let Ok(mut state) = slot.state.try_lock() else {
                return true;
            };
            let idle = now_ms.saturating_sub(state.last_used_ms) > retention;
            let stale = match state.credential {
                Some(ref c) => now_ms.saturating_sub(c.expires_at_ms) > retention,
                None => true,
            };
            if idle && stale {
                state.evicted = true;
                removed.push(tenant.clone());
                false
            } else {
                true
            }
        });
        drop(tenants);

        for tenant in &removed {
            tracing::info!(tenant = %tenant, "evicted stale tenant credential");
        }
        removed
    }

    /// Status for all tenants.
    pub async fn status_list(&self) -> Vec<TenantStatus> {
        let slots: Vec<(String, Arc<TenantSlot>)> = {
            let tenants = self.tenants.lock();
            tenants.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        let now = epoch_ms();
        let mut list = Vec::with_capacity(slots.len());
        for (tenant, slot) in slots {
            let state = slot.state.lock().await;
            let credential = state.credential.as_ref();
            list.push(TenantStatus {
                tenant,
                has_credential: credential.is_some(),
                expired: credential.is_some_and(|c| c.is_expired_at(now)),
                expires_in_secs: credential
                    .filter(|c| !c.is_expired_at(now))
                    .map(|c| (c.expires_at_ms - now) / 1000),
                last_used_ms: state.last_used_ms,
                last_error: state.last_error.as_ref().map(ToString::to_string),
            });
        }
        list.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        list
    }

    /// Number of tenants currently holding a slot.
    pub fn tenant_count(&self) -> usize {
        self.tenants.lock().len()
    }

    /// Find or create the tenant's slot.
    fn slot(&self, tenant: &str) -> Arc<TenantSlot> {
        let mut tenants = self.tenants.lock();
        Arc::clone(tenants.entry(tenant.to_owned()).or_default())
    }

    /// Find or create a slot that garbage collection has not evicted.
    async fn live_slot(&self, tenant: &str) -> Arc<TenantSlot> {
        loop {
            let slot = self.slot(tenant);
            if !slot.state.lock().await.evicted {
                return slot;
            }
        }
    }

    /// Like [`Self::slot`], but never creates a slot when bootstrap is disabled.
    fn policy_slot(&self, tenant: &str) -> Option<Arc<TenantSlot>> {
        match self.settings.policy {
            BootstrapPolicy::OnDemand => Some(self.slot(tenant)),
            BootstrapPolicy::Disabled => self.tenants.lock().get(tenant).cloned(),
        }
    }

    /// Drop a slot that never obtained a credential.
    fn discard_empty(&self, tenant: &str) {
        let mut tenants = self.tenants.lock();
        let empty = tenants.get(tenant).is_some_and(|slot| match slot.state.try_lock() {
            Ok(mut state) if state.credential.is_none() => {
                state.evicted = true;
                true
            }
            _ => false,
        });
        if empty {
            tenants.remove(tenant);
        }
    }

    /// Request a fresh credential from the identity endpoint.
    async fn fetch(&self, tenant: &str) -> Result<ApiCredential, AccessError> {
        let api_key = self
            .keys
            .api_key(tenant)
            .ok_or_else(|| AccessError::TenantUnknown(tenant.to_owned()))?;

        let grant = match tokio::time::timeout(
            self.settings.timeout,
            self.agent.tenant_token(tenant, api_key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout),
        }
        .map_err(|source| AccessError::Bootstrap { tenant: tenant.to_owned(), source })?;

        let ttl = grant.expires_in.map(Duration::from_secs).unwrap_or(self.settings.token_ttl);
        Ok(ApiCredential::issued(grant.token, epoch_ms(), ttl))
    }
}

/// Spawn the periodic credential refresh sweep.
pub fn spawn_refresh_loop(
    manager: Arc<TenantAccessManager>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = manager.refresh_all() => {}
            }
        }
        tracing::debug!("credential refresh loop stopped");
    })
}

/// Spawn the periodic tenant garbage collection sweep.
pub fn spawn_gc_loop(
    manager: Arc<TenantAccessManager>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; nothing can be stale yet.
        timer.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {
                    manager.collect_garbage();
                }
            }
        }
        tracing::debug!("tenant gc loop stopped");
    })
}

#[cfg(test)]
#[path = "access_tests.rs"]
mod tests;
