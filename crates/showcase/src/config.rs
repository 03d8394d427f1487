// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// How the access manager treats a tenant it has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BootstrapPolicy {
    /// Fetch a credential from the issuing agent on first use.
    #[default]
    OnDemand,
    /// Only tenants bootstrapped at startup or seeded by an operator are served.
    Disabled,
}

/// Configuration for the showcase service.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "showcase", about = "Credential showcase publisher and connection relay")]
pub struct ShowcaseConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "SHOWCASE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "SHOWCASE_PORT")]
    pub port: u16,

    /// Bearer token for the operator API. If unset, auth is disabled.
    #[arg(long, env = "SHOWCASE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Shared key the issuing agent sends in `x-api-key` with webhooks.
    /// If unset, webhooks are accepted without a key.
    #[arg(long, env = "SHOWCASE_WEBHOOK_API_KEY")]
    pub webhook_api_key: Option<String>,

    /// Base URL of the issuing agent admin API.
    #[arg(long, default_value = "http://127.0.0.1:8031", env = "SHOWCASE_AGENT_URL")]
    pub agent_url: String,

    /// Path to the tenant configuration JSON file (tenant API keys).
    #[arg(long, env = "SHOWCASE_TENANT_CONFIG")]
    pub tenant_config: Option<std::path::PathBuf>,

    /// Path to a showcase JSON file seeding the in-memory repository.
    #[arg(long, env = "SHOWCASE_SHOWCASE_FILE")]
    pub showcase_file: Option<std::path::PathBuf>,

    /// What to do when a credential is requested for an unknown tenant.
    #[arg(long, value_enum, default_value_t = BootstrapPolicy::OnDemand, env = "SHOWCASE_BOOTSTRAP")]
    pub bootstrap: BootstrapPolicy,

    /// Refresh tenant credentials that expire within this many seconds.
    #[arg(long, default_value_t = 60, env = "SHOWCASE_REFRESH_LEAD_SECS")]
    pub refresh_lead_secs: u64,

    /// Credential refresh sweep interval in milliseconds.
    #[arg(long, default_value_t = 15000, env = "SHOWCASE_REFRESH_MS")]
    pub refresh_ms: u64,

    /// Garbage collection sweep interval in milliseconds.
    #[arg(long, default_value_t = 60000, env = "SHOWCASE_GC_MS")]
    pub gc_ms: u64,

    /// Evict tenants expired and idle for longer than this many seconds.
    #[arg(long, default_value_t = 3600, env = "SHOWCASE_GC_RETENTION_SECS")]
    pub gc_retention_secs: u64,

    /// Token lifetime assumed when the agent does not report one.
    #[arg(long, default_value_t = 3600, env = "SHOWCASE_TOKEN_TTL_SECS")]
    pub token_ttl_secs: u64,

    /// Max registration attempts per publication job before aborting.
    #[arg(long, default_value_t = 5, env = "SHOWCASE_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Initial retry backoff in milliseconds.
    #[arg(long, default_value_t = 500, env = "SHOWCASE_BACKOFF_BASE_MS")]
    pub backoff_base_ms: u64,

    /// Retry backoff ceiling in milliseconds.
    #[arg(long, default_value_t = 30000, env = "SHOWCASE_BACKOFF_MAX_MS")]
    pub backoff_max_ms: u64,

    /// Timeout for every issuing agent call in milliseconds.
    #[arg(long, default_value_t = 10000, env = "SHOWCASE_AGENT_TIMEOUT_MS")]
    pub agent_timeout_ms: u64,

    /// Pending events buffered per relay channel before pushes are dropped.
    #[arg(long, default_value_t = 64, env = "SHOWCASE_RELAY_CAPACITY")]
    pub relay_capacity: usize,

    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long, default_value = "info", env = "SHOWCASE_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format: `text` or `json`.
    #[arg(long, default_value = "text", env = "SHOWCASE_LOG_FORMAT")]
    pub log_format: String,
}

impl ShowcaseConfig {
    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_ms)
    }

    pub fn gc_retention(&self) -> Duration {
        Duration::from_secs(self.gc_retention_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn retry_policy(&self) -> crate::publish::retry::RetryPolicy {
        crate::publish::retry::RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base: Duration::from_millis(self.backoff_base_ms),
            ceiling: Duration::from_millis(self.backoff_max_ms),
        }
    }
}
