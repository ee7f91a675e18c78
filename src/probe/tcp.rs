//! TCP reachability probe.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::schema::TcpProbeConfig;
use crate::probe::{delegate_state, Probe, ProbeError, ProbeState};

pub const KIND: &str = "tcp";

/// Succeeds when a TCP connection to `host:port` can be established.
#[derive(Debug)]
pub struct TcpProbe {
    kind: String,
    host: String,
    port: u16,
    timeout: Duration,
    state: ProbeState,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            kind: KIND.to_string(),
            host: host.into(),
            port,
            timeout,
            state: ProbeState::new(),
        }
    }

    pub fn from_config(config: &TcpProbeConfig) -> Self {
        let mut probe = Self::new(
            config.host.clone(),
            config.port,
            Duration::from_millis(config.timeout_ms),
        );
        if let Some(name) = &config.name {
            probe.kind = name.clone();
        }
        probe
    }

    async fn connect(&self) -> Result<(), ProbeError> {
        let addr = format!("{}:{}", self.host, self.port);
        match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::new("error connecting to tcp endpoint", e)),
            Err(_) => Err(ProbeError::msg(
                "error connecting to tcp endpoint",
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn kind(&self) -> &str {
        &self.kind
    }

    delegate_state!();

    async fn execute(&self) -> Result<(), ProbeError> {
        self.state.begin();
        self.state.checking();
        let result = self.connect().await;
        if let Err(e) = &result {
            tracing::debug!(host = %self.host, port = self.port, error = %e, "TCP probe failed");
        }
        self.state.finish(result)
    }
}
