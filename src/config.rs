use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// Required by labmon-agent only.
    pub agent: Option<AgentConfig>,
    /// Required by labmon-server only.
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
    /// Forwards inserts to a labmon-server's ingest endpoint. Agents only.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite file path; ignored by the memory backend.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Base URL of the server for the http backend, e.g. "http://dash.lab:8081".
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_pool_size() -> u32 {
    5
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Defaults to the host name when empty or omitted.
    #[serde(default)]
    pub machine_id: String,
    pub lab_id: String,
    pub buffer_path: String,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_batch_interval_secs")]
    pub batch_interval_secs: u64,
    /// How often to log agent stats (samples appended, flushes) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_sample_interval_secs() -> u64 {
    1
}

fn default_batch_interval_secs() -> u64 {
    10
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Per-endpoint default and maximum result counts. Requested limits are clamped to [1, max].
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_series_limit")]
    pub series_default_limit: u32,
    #[serde(default = "default_series_max")]
    pub series_max_limit: u32,
    #[serde(default = "default_machine_avg_limit")]
    pub machine_avg_default_limit: u32,
    #[serde(default = "default_series_max")]
    pub machine_avg_max_limit: u32,
    #[serde(default = "default_series_limit")]
    pub lab_series_default_limit: u32,
    #[serde(default = "default_series_max")]
    pub lab_series_max_limit: u32,
    #[serde(default = "default_series_limit")]
    pub lab_avg_default_limit: u32,
    #[serde(default = "default_lab_avg_max")]
    pub lab_avg_max_limit: u32,
}

fn default_series_limit() -> u32 {
    100
}

fn default_series_max() -> u32 {
    1000
}

fn default_machine_avg_limit() -> u32 {
    50
}

fn default_lab_avg_max() -> u32 {
    5000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            series_default_limit: default_series_limit(),
            series_max_limit: default_series_max(),
            machine_avg_default_limit: default_machine_avg_limit(),
            machine_avg_max_limit: default_series_max(),
            lab_series_default_limit: default_series_limit(),
            lab_series_max_limit: default_series_max(),
            lab_avg_default_limit: default_series_limit(),
            lab_avg_max_limit: default_lab_avg_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Optional cron expression for compaction (e.g. "0 0 3 * * *"). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Compact every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: default_prune_interval_secs(),
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
        }
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

    /// The `[agent]` section, or an error naming it when absent.
    pub fn agent(&self) -> anyhow::Result<&AgentConfig> {
        self.agent
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[agent] section is required to run the agent"))
    }

    /// The `[server]` section, or an error naming it when absent.
    pub fn server(&self) -> anyhow::Result<&ServerConfig> {
        self.server
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[server] section is required to run the server"))
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self.store.backend {
            StoreBackend::Sqlite => anyhow::ensure!(
                !self.store.path.is_empty(),
                "store.path must be non-empty for the sqlite backend"
            ),
            StoreBackend::Http => {
                anyhow::ensure!(
                    self.store.url.starts_with("http://") || self.store.url.starts_with("https://"),
                    "store.url must be an http(s) URL for the http backend, got {:?}",
                    self.store.url
                );
                anyhow::ensure!(
                    self.store.request_timeout_secs > 0,
                    "store.request_timeout_secs must be > 0, got {}",
                    self.store.request_timeout_secs
                );
                anyhow::ensure!(
                    self.server.is_none(),
                    "store.backend = \"http\" is for agents; the server needs sqlite or memory"
                );
            }
            StoreBackend::Memory => anyhow::ensure!(
                self.agent.is_none(),
                "store.backend = \"memory\" cannot be used with [agent]: flushed metrics would be unreadable"
            ),
        }
        anyhow::ensure!(
            self.store.max_pool_size > 0,
            "store.max_pool_size must be > 0, got {}",
            self.store.max_pool_size
        );
        anyhow::ensure!(
            self.store.retention_days > 0,
            "store.retention_days must be > 0, got {}",
            self.store.retention_days
        );
        if let Some(agent) = &self.agent {
            anyhow::ensure!(
                !agent.lab_id.trim().is_empty(),
                "agent.lab_id must be non-empty"
            );
            anyhow::ensure!(
                !agent.buffer_path.is_empty(),
                "agent.buffer_path must be non-empty"
            );
            anyhow::ensure!(
                agent.sample_interval_secs > 0,
                "agent.sample_interval_secs must be > 0, got {}",
                agent.sample_interval_secs
            );
            anyhow::ensure!(
                agent.batch_interval_secs > 0,
                "agent.batch_interval_secs must be > 0, got {}",
                agent.batch_interval_secs
            );
            anyhow::ensure!(
                agent.stats_log_interval_secs > 0,
                "agent.stats_log_interval_secs must be > 0, got {}",
                agent.stats_log_interval_secs
            );
        }
        if let Some(server) = &self.server {
            anyhow::ensure!(
                server.port > 0,
                "server.port must be between 1 and 65535, got {}",
                server.port
            );
        }
        let q = &self.query;
        for (name, default, max) in [
            ("series", q.series_default_limit, q.series_max_limit),
            (
                "machine_avg",
                q.machine_avg_default_limit,
                q.machine_avg_max_limit,
            ),
            (
                "lab_series",
                q.lab_series_default_limit,
                q.lab_series_max_limit,
            ),
            ("lab_avg", q.lab_avg_default_limit, q.lab_avg_max_limit),
        ] {
            anyhow::ensure!(
                default > 0 && default <= max,
                "query.{}_default_limit must be in 1..={}, got {}",
                name,
                max,
                default
            );
        }
        anyhow::ensure!(
            self.maintenance.prune_interval_secs > 0,
            "maintenance.prune_interval_secs must be > 0, got {}",
            self.maintenance.prune_interval_secs
        );
        anyhow::ensure!(
            self.maintenance.vacuum_interval_secs > 0,
            "maintenance.vacuum_interval_secs must be > 0, got {}",
            self.maintenance.vacuum_interval_secs
        );
        if let Some(expr) = &self.maintenance.vacuum_schedule {
            cron::Schedule::from_str(expr).map_err(|e| {
                anyhow::anyhow!(
                    "maintenance.vacuum_schedule {:?} is not a valid cron expression: {}",
                    expr,
                    e
                )
            })?;
        }
        Ok(())
    }
}
