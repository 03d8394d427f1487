// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Showcase: publishes verifiable-credential schemas and definitions to an
//! issuing agent and relays protocol events to live demo sessions.

pub mod agent;
pub mod config;
pub mod credential;
pub mod error;
pub mod facade;
pub mod publish;
pub mod relay;
pub mod repository;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::agent::client::AgentClient;
use crate::config::ShowcaseConfig;
use crate::credential::access::{spawn_gc_loop, spawn_refresh_loop};
use crate::credential::TenantConfig;
use crate::repository::{MemoryRepository, ShowcaseRepository};
use crate::state::AppState;
use crate::transport::build_router;

/// Run the showcase server until shutdown.
pub async fn run(config: ShowcaseConfig) -> anyhow::Result<()> {
    // reqwest is built without a default crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let tenants = match config.tenant_config {
        Some(ref path) => TenantConfig::load(path)?,
        None => TenantConfig::default(),
    };
    let repository: Arc<dyn ShowcaseRepository> = match config.showcase_file {
        Some(ref path) => Arc::new(MemoryRepository::from_file(path)?),
        None => Arc::new(MemoryRepository::new()),
    };
    let agent = Arc::new(AgentClient::new(config.agent_url.clone(), config.agent_timeout()));

    let state = Arc::new(AppState::new(config.clone(), shutdown.clone(), agent, tenants, repository));

    // Best effort; tenants that fail here bootstrap on first use.
    {
        let access = Arc::clone(&state.access);
        tokio::spawn(async move { access.bootstrap_configured().await });
    }
    let refresh = spawn_refresh_loop(Arc::clone(&state.access), config.refresh_interval(), shutdown.clone());
    let gc = spawn_gc_loop(Arc::clone(&state.access), config.gc_interval(), shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    tracing::info!(agent = %config.agent_url, bootstrap = ?config.bootstrap, "showcase listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    shutdown.cancel();
    let _ = tokio::join!(refresh, gc);
    Ok(())
}
