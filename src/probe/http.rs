//! HTTP endpoint probe.
//!
//! # Responsibilities
//! - Issue one GET against the configured endpoint
//! - Treat any HTTP response as reachable; only transport failures count
//!
//! # Design Decisions
//! - The client is built on first use and kept until `release`
//! - Request timeout comes from the probe config, not the manager

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::schema::HttpProbeConfig;
use crate::probe::{delegate_state, Probe, ProbeError, ProbeState};

pub const KIND: &str = "http";

const REQUEST_CONTEXT: &str = "error making http GET request";

/// `http://host:port/path`; a missing leading slash on `path` is added.
pub fn endpoint_url(host: &str, port: u16, path: &str) -> String {
    let slash = if path.starts_with('/') { "" } else { "/" };
    format!("http://{host}:{port}{slash}{path}")
}

pub struct HttpProbe {
    kind: String,
    url: String,
    timeout: Duration,
    client: Mutex<Option<reqwest::Client>>,
    state: ProbeState,
}

impl HttpProbe {
    pub fn new(host: &str, port: u16, path: &str, timeout: Duration) -> Self {
        Self {
            kind: KIND.to_string(),
            url: endpoint_url(host, port, path),
            timeout,
            client: Mutex::new(None),
            state: ProbeState::new(),
        }
    }

    pub fn from_config(config: &HttpProbeConfig) -> Self {
        let mut probe = Self::new(
            &config.host,
            config.port,
            &config.path,
            Duration::from_millis(config.timeout_ms),
        );
        if let Some(name) = &config.name {
            probe.kind = name.clone();
        }
        probe
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a client is currently held.
    pub fn has_client(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn client(&self) -> Result<reqwest::Client, ProbeError> {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent("healthgate-probe")
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::new("error building http client", e))?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn kind(&self) -> &str {
        &self.kind
    }

    delegate_state!();

    async fn execute(&self) -> Result<(), ProbeError> {
        self.state.begin();
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return self.state.finish(Err(e)),
        };

        self.state.checking();
        let result = match client.get(&self.url).send().await {
            Ok(response) => {
                tracing::debug!(url = %self.url, status = %response.status(), "HTTP probe reached endpoint");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "HTTP probe failed");
                Err(ProbeError::new(REQUEST_CONTEXT, e))
            }
        };
        self.state.finish(result)
    }

    fn release(&self) {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_unavailable() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        port
    }

    #[test]
    fn test_new_probe_state() {
        let probe = HttpProbe::new("localhost", 4560, "health", Duration::from_secs(10));
        assert_eq!(probe.kind(), KIND);
        assert_eq!(probe.url(), "http://localhost:4560/health");
        assert_eq!(probe.status(), ProbeStatus::Starting);
        assert_eq!(probe.last_check(), UNIX_EPOCH);
        assert!(probe.last_error().is_none());
        assert!(!probe.has_client());
    }

    #[test]
    fn test_endpoint_url_normalizes_path() {
        assert_eq!(endpoint_url("db", 80, "health"), "http://db:80/health");
        assert_eq!(endpoint_url("db", 80, "/health"), "http://db:80/health");
        assert_eq!(endpoint_url("db", 80, ""), "http://db:80/");
    }

    #[tokio::test]
    async fn test_any_response_is_reachable() {
        let port = serve_unavailable().await;
        let probe = HttpProbe::new("127.0.0.1", port, "/", Duration::from_secs(2));

        assert!(probe.execute().await.is_ok());
        assert_eq!(probe.status(), ProbeStatus::Done);
        assert!(probe.last_check() > UNIX_EPOCH);
        assert!(probe.last_check() <= SystemTime::now());
        assert!(probe.has_client());

        probe.release();
        assert!(!probe.has_client());
        probe.release();
    }

    #[tokio::test]
    async fn test_no_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new("127.0.0.1", port, "/", Duration::from_secs(1));
        let err = probe.execute().await.unwrap_err();
        assert_eq!(err.context(), REQUEST_CONTEXT);
        assert_eq!(probe.last_error(), Some(err));
        assert_eq!(probe.status(), ProbeStatus::Done);
        assert!(probe.last_check() > UNIX_EPOCH);
    }
}
