// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::agent::IssuingAgent;
use crate::config::ShowcaseConfig;
use crate::credential::access::{AccessSettings, TenantAccessManager};
use crate::credential::TenantConfig;
use crate::facade::ShowcaseService;
use crate::publish::orchestrator::Orchestrator;
use crate::relay::ConnectionRelay;
use crate::repository::ShowcaseRepository;

/// Shared service state.
pub struct AppState {
    pub config: ShowcaseConfig,
    pub shutdown: CancellationToken,
    pub access: Arc<TenantAccessManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub relay: Arc<ConnectionRelay>,
    pub service: ShowcaseService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: ShowcaseConfig,
        shutdown: CancellationToken,
        agent: Arc<dyn IssuingAgent>,
        tenants: TenantConfig,
        repository: Arc<dyn ShowcaseRepository>,
    ) -> Self {
        let access = Arc::new(TenantAccessManager::new(
            Arc::clone(&agent),
            tenants,
            AccessSettings::from_config(&config),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            agent,
            Arc::clone(&access),
            config.retry_policy(),
            config.agent_timeout(),
        ));
        let relay = Arc::new(ConnectionRelay::new(config.relay_capacity));
        let service =
            ShowcaseService::new(Arc::clone(&orchestrator), Arc::clone(&relay), repository);

        Self {
            config,
            shutdown,
            access,
            orchestrator,
            relay,
            service,
            started_at: Instant::now(),
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
