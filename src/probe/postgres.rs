//! PostgreSQL probe.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use tokio::time::timeout;

use crate::config::schema::PostgresProbeConfig;
use crate::probe::{delegate_state, Probe, ProbeError, ProbeState};

pub const KIND: &str = "postgres";

const OPEN_CONTEXT: &str = "error opening postgres connection";
const PING_CONTEXT: &str = "error pinging postgres database";

/// Opens a connection, pings it and closes it again.
pub struct PostgresProbe {
    kind: String,
    host: String,
    port: u16,
    database: String,
    user: String,
    password: String,
    ssl_mode: String,
    ssl_root_cert: Option<PathBuf>,
    timeout: Duration,
    state: ProbeState,
}

impl PostgresProbe {
    pub fn from_config(config: &PostgresProbeConfig) -> Self {
        Self {
            kind: config.name.clone().unwrap_or_else(|| KIND.to_string()),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            ssl_mode: config.ssl_mode.clone(),
            ssl_root_cert: config.ssl_root_cert.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            state: ProbeState::new(),
        }
    }

    fn connect_options(&self) -> Result<PgConnectOptions, ProbeError> {
        let ssl_mode: PgSslMode = self
            .ssl_mode
            .parse()
            .map_err(|e| ProbeError::new(OPEN_CONTEXT, e))?;
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(ssl_mode);
        Ok(match &self.ssl_root_cert {
            Some(cert) => options.ssl_root_cert(cert),
            None => options,
        })
    }

    async fn ping(&self, options: &PgConnectOptions) -> Result<(), ProbeError> {
        let mut conn = match timeout(self.timeout, PgConnection::connect_with(options)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(ProbeError::new(OPEN_CONTEXT, e)),
            Err(_) => return Err(timed_out(OPEN_CONTEXT, self.timeout)),
        };

        let pinged = match timeout(self.timeout, conn.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::new(PING_CONTEXT, e)),
            Err(_) => Err(timed_out(PING_CONTEXT, self.timeout)),
        };

        if let Err(e) = conn.close().await {
            tracing::debug!(host = %self.host, error = %e, "Failed to close postgres probe connection");
        }
        pinged
    }
}

fn timed_out(context: &'static str, after: Duration) -> ProbeError {
    ProbeError::msg(context, format!("timed out after {:?}", after))
}

impl std::fmt::Debug for PostgresProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresProbe")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

#[async_trait]
impl Probe for PostgresProbe {
    fn kind(&self) -> &str {
        &self.kind
    }

    delegate_state!();

    async fn execute(&self) -> Result<(), ProbeError> {
        self.state.begin();
        let options = match self.connect_options() {
            Ok(options) => options,
            Err(e) => return self.state.finish(Err(e)),
        };

        self.state.checking();
        let result = self.ping(&options).await;
        if let Err(e) = &result {
            tracing::debug!(host = %self.host, port = self.port, error = %e, "Postgres probe failed");
        }
        self.state.finish(result)
    }
}
