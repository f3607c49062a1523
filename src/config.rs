use serde::Deserialize;
use std::time::Duration;

use crate::models::ServerDescriptor;
use crate::scheduler::MonitorConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub monitor: MonitorSection,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Absent = nothing is persisted and every start begins from an empty view.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// POST the batch to `status_url`.
    Remote,
    /// Ping each server from this process.
    Direct,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_mode")]
    pub mode: FetchMode,
    /// Status-check service endpoint; required in remote mode.
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Max timer ticks skipped after repeated failures; 0 = no backoff.
    #[serde(default)]
    pub max_backoff_ticks: u32,
    /// Snapshots older than this are flagged stale in `/api/servers`.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Max number of stats updates buffered for /ws/stats and the writer (slow clients may lag).
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_mode() -> FetchMode {
    FetchMode::Remote
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_stale_after_secs() -> u64 {
    120
}

fn default_broadcast_capacity() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Per-server Server List Ping budget (connect + reply).
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Pings (open sockets) in flight at once, per batch.
    #[serde(default = "default_max_concurrent_pings")]
    pub max_concurrent_pings: usize,
    /// Largest batch `POST /api/check` accepts; bigger bodies get 413.
    #[serde(default = "default_max_check_servers")]
    pub max_check_servers: usize,
}

fn default_ping_timeout_secs() -> u64 {
    5
}

fn default_max_concurrent_pings() -> usize {
    64
}

fn default_max_check_servers() -> usize {
    256
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_timeout_secs: default_ping_timeout_secs(),
            max_concurrent_pings: default_max_concurrent_pings(),
            max_check_servers: default_max_check_servers(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// JSON file of descriptors, re-read every cycle. Takes precedence over `servers`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Seed the view from the last persisted stats on startup.
    #[serde(default = "default_prime_on_start")]
    pub prime_on_start: bool,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_retention_days() -> u32 {
    7
}

fn default_prime_on_start() -> bool {
    true
}

fn default_prune_interval_secs() -> u64 {
    3600
}

impl MonitorSection {
    pub fn scheduler_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_backoff_ticks: self.max_backoff_ticks,
            broadcast_capacity: self.broadcast_capacity,
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        if self.monitor.mode == FetchMode::Remote {
            let url = self.monitor.status_url.as_deref().unwrap_or_default();
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "monitor.status_url must be an http(s) URL in remote mode, got {:?}",
                url
            );
        }
        anyhow::ensure!(
            self.monitor.poll_interval_secs > 0,
            "monitor.poll_interval_secs must be > 0, got {}",
            self.monitor.poll_interval_secs
        );
        anyhow::ensure!(
            self.monitor.request_timeout_secs > 0,
            "monitor.request_timeout_secs must be > 0, got {}",
            self.monitor.request_timeout_secs
        );
        anyhow::ensure!(
            self.monitor.broadcast_capacity > 0,
            "monitor.broadcast_capacity must be > 0, got {}",
            self.monitor.broadcast_capacity
        );
        anyhow::ensure!(
            self.probe.ping_timeout_secs > 0,
            "probe.ping_timeout_secs must be > 0, got {}",
            self.probe.ping_timeout_secs
        );
        anyhow::ensure!(
            self.probe.max_concurrent_pings > 0,
            "probe.max_concurrent_pings must be > 0, got {}",
            self.probe.max_concurrent_pings
        );
        anyhow::ensure!(
            self.probe.max_check_servers > 0,
            "probe.max_check_servers must be > 0, got {}",
            self.probe.max_check_servers
        );
        let mut seen = std::collections::HashSet::new();
        for s in &self.registry.servers {
            anyhow::ensure!(!s.id.is_empty(), "registry.servers: id must be non-empty");
            anyhow::ensure!(
                seen.insert(s.id.as_str()),
                "registry.servers: duplicate id {:?}",
                s.id
            );
        }
        if let Some(storage) = &self.storage {
            anyhow::ensure!(!storage.path.is_empty(), "storage.path must be non-empty");
            anyhow::ensure!(
                storage.retention_days > 0,
                "storage.retention_days must be > 0, got {}",
                storage.retention_days
            );
            anyhow::ensure!(
                storage.prune_interval_secs > 0,
                "storage.prune_interval_secs must be > 0, got {}",
                storage.prune_interval_secs
            );
        }
        Ok(())
    }
}
