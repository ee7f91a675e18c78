//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Polling cadence and deadline of the health manager.
    pub manager: ManagerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Dependencies to wait for.
    pub probes: Vec<ProbeConfig>,
}

/// Health manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Sleep between unsuccessful rounds in milliseconds.
    pub check_interval_ms: u64,

    /// Maximum total wait in milliseconds.
    pub deadline_ms: u64,

    /// Abort probes still running this long after a round started.
    pub round_timeout_ms: Option<u64>,
}

impl ManagerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1_000,
            deadline_ms: 60_000,
            round_timeout_ms: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Prometheus scrape address; metrics stay in-process when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_address: None,
        }
    }
}

/// A dependency to probe, tagged by `kind`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeConfig {
    Http(HttpProbeConfig),
    Tcp(TcpProbeConfig),
    Postgres(PostgresProbeConfig),
    Rabbitmq(AmqpProbeConfig),
    Pubsub(PubsubProbeConfig),
}

impl ProbeConfig {
    /// Label override, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            ProbeConfig::Http(c) => c.name.as_deref(),
            ProbeConfig::Tcp(c) => c.name.as_deref(),
            ProbeConfig::Postgres(c) => c.name.as_deref(),
            ProbeConfig::Rabbitmq(c) => c.name.as_deref(),
            ProbeConfig::Pubsub(c) => c.name.as_deref(),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            ProbeConfig::Http(c) => c.timeout_ms,
            ProbeConfig::Tcp(c) => c.timeout_ms,
            ProbeConfig::Postgres(c) => c.timeout_ms,
            ProbeConfig::Rabbitmq(c) => c.timeout_ms,
            ProbeConfig::Pubsub(c) => c.timeout_ms,
        }
    }
}

/// HTTP endpoint probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpProbeConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub host: String,

    pub port: u16,

    /// Request path (default: "/").
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Plain TCP reachability probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpProbeConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub host: String,

    pub port: u16,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// PostgreSQL probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresProbeConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub host: String,

    #[serde(default = "default_postgres_port")]
    pub port: u16,

    pub database: String,

    pub user: String,

    #[serde(default)]
    pub password: String,

    /// libpq sslmode (disable, allow, prefer, require, verify-ca, verify-full).
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// PEM bundle used to verify the server in the verify-* modes.
    #[serde(default)]
    pub ssl_root_cert: Option<PathBuf>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// RabbitMQ (AMQP 0-9-1) probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AmqpProbeConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub host: String,

    #[serde(default = "default_amqp_port")]
    pub port: u16,

    #[serde(default = "default_amqp_user")]
    pub user: String,

    #[serde(default = "default_amqp_user")]
    pub password: String,

    /// Virtual host opened after login (default: "/").
    #[serde(default = "default_vhost")]
    pub vhost: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Google Cloud Pub/Sub probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubsubProbeConfig {
    #[serde(default)]
    pub name: Option<String>,

    pub project_id: String,

    /// Emulator "host:port"; falls back to `PUBSUB_EMULATOR_HOST`.
    #[serde(default)]
    pub emulator_host: Option<String>,

    /// API base URL when not using the emulator (default: the global endpoint).
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_amqp_port() -> u16 {
    5672
}

fn default_amqp_user() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}
