//! Google Cloud Pub/Sub probe.
//!
//! # Responsibilities
//! - Resolve credentials the way a Pub/Sub client would
//! - List the project's topics over the REST API
//!
//! # Design Decisions
//! - The emulator (from config or `PUBSUB_EMULATOR_HOST`) takes no credentials
//! - Otherwise requests carry a bearer token: a fixed one if given, else one
//!   from the ambient Google credentials, resolved on first use and kept
//!   until `release`
//! - A 403 still proves the service answered with the caller's identity

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::StatusCode;

use crate::config::schema::PubsubProbeConfig;
use crate::probe::{delegate_state, Probe, ProbeError, ProbeState};

pub const KIND: &str = "pubsub";

pub const EMULATOR_ENV: &str = "PUBSUB_EMULATOR_HOST";

const PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
const CLIENT_CONTEXT: &str = "error creating new pubsub client";

pub struct PubsubProbe {
    kind: String,
    project_id: String,
    emulator_host: Option<String>,
    endpoint: Option<String>,
    access_token: Option<String>,
    provider: Mutex<Option<Arc<dyn TokenProvider>>>,
    timeout: Duration,
    state: ProbeState,
}

impl PubsubProbe {
    pub fn new(project_id: impl Into<String>, emulator_host: Option<String>, timeout: Duration) -> Self {
        Self {
            kind: KIND.to_string(),
            project_id: project_id.into(),
            emulator_host,
            endpoint: None,
            access_token: None,
            provider: Mutex::new(None),
            timeout,
            state: ProbeState::new(),
        }
    }

    pub fn from_config(config: &PubsubProbeConfig) -> Self {
        let mut probe = Self::new(
            config.project_id.clone(),
            config.emulator_host.clone(),
            Duration::from_millis(config.timeout_ms),
        );
        probe.endpoint = config.endpoint.clone();
        if let Some(name) = &config.name {
            probe.kind = name.clone();
        }
        probe
    }

    /// API base URL used when no emulator is configured.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Send this token instead of resolving the ambient credentials.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn emulator(&self) -> Option<String> {
        self.emulator_host
            .clone()
            .or_else(|| std::env::var(EMULATOR_ENV).ok().filter(|h| !h.is_empty()))
    }

    /// Topics listing URL for the configured project.
    pub fn topics_url(&self) -> String {
        let base = match self.emulator() {
            Some(host) => format!("http://{host}"),
            None => self
                .endpoint
                .as_deref()
                .unwrap_or(PUBSUB_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
        };
        format!("{base}/v1/projects/{}/topics", self.project_id)
    }

    /// Whether ambient credentials are currently held.
    pub fn has_credentials(&self) -> bool {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn token_provider(&self) -> Result<Arc<dyn TokenProvider>, ProbeError> {
        let cached = self
            .provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(provider) = cached {
            return Ok(provider);
        }
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| ProbeError::new(CLIENT_CONTEXT, e))?;
        *self.provider.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Bearer token for the request, or `None` against the emulator.
    async fn bearer(&self) -> Result<Option<String>, ProbeError> {
        if self.emulator().is_some() {
            return Ok(None);
        }
        if let Some(token) = &self.access_token {
            return Ok(Some(token.clone()));
        }
        let provider = self.token_provider().await?;
        let token = provider
            .token(&[PUBSUB_SCOPE])
            .await
            .map_err(|e| ProbeError::new(CLIENT_CONTEXT, e))?;
        Ok(Some(token.as_str().to_string()))
    }

    async fn list_topics(&self, url: &str) -> Result<(), ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::new(CLIENT_CONTEXT, e))?;

        let mut request = client.get(url);
        if let Some(token) = self.bearer().await? {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::new(CLIENT_CONTEXT, e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::FORBIDDEN {
            tracing::debug!(%url, %status, "Pub/Sub reachable");
            Ok(())
        } else {
            Err(ProbeError::msg(
                CLIENT_CONTEXT,
                format!("listing topics returned {status}"),
            ))
        }
    }
}

impl std::fmt::Debug for PubsubProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubProbe")
            .field("kind", &self.kind)
            .field("project_id", &self.project_id)
            .field("emulator_host", &self.emulator_host)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Probe for PubsubProbe {
    fn kind(&self) -> &str {
        &self.kind
    }

    delegate_state!();

    async fn execute(&self) -> Result<(), ProbeError> {
        self.state.begin();
        let url = self.topics_url();

        self.state.checking();
        let result = self.list_topics(&url).await;
        if let Err(e) = &result {
            tracing::debug!(%url, error = %e, "Pub/Sub probe failed");
        }
        self.state.finish(result)
    }

    fn release(&self) {
        self.provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;
    use std::time::UNIX_EPOCH;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn mock_emulator(project: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let expected = format!("GET /v1/projects/{project}/topics ");
                let response: &[u8] = if request.starts_with(&expected) {
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}"
                } else {
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                };
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            }
        });
        addr.to_string()
    }

    /// Answers every request with `status`, or 401 when `token` is set and
    /// the request does not carry it.
    async fn mock_api(status: &'static str, token: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();
                let authorized = match token {
                    Some(token) => request.contains(&format!("authorization: bearer {token}")),
                    None => true,
                };
                let status = if authorized { status } else { "401 Unauthorized" };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_new_probe_state() {
        let probe = PubsubProbe::new("wibble-foo", Some("localhost:8681".into()), Duration::from_secs(1));
        assert_eq!(probe.kind(), KIND);
        assert_eq!(probe.status(), ProbeStatus::Starting);
        assert_eq!(probe.last_check(), UNIX_EPOCH);
        assert!(probe.last_error().is_none());
        assert_eq!(
            probe.topics_url(),
            "http://localhost:8681/v1/projects/wibble-foo/topics"
        );
    }

    #[tokio::test]
    async fn test_emulator_reachable() {
        let host = mock_emulator("wibble-foo").await;
        let probe = PubsubProbe::new("wibble-foo", Some(host), Duration::from_secs(2));
        probe.execute().await.unwrap();
        assert_eq!(probe.status(), ProbeStatus::Done);
        assert!(probe.last_check() > UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_unknown_project_fails() {
        let host = mock_emulator("wibble-foo").await;
        let probe = PubsubProbe::new("other", Some(host), Duration::from_secs(2));
        let err = probe.execute().await.unwrap_err();
        assert_eq!(err.context(), CLIENT_CONTEXT);
        assert!(err.to_string().contains("404"), "{err}");
        assert_eq!(probe.last_error(), Some(err));
    }

    #[test]
    fn test_endpoint_override() {
        let probe = PubsubProbe::new("wibble-foo", None, Duration::from_secs(1))
            .with_endpoint("http://127.0.0.1:9/");
        if std::env::var(EMULATOR_ENV).map_or(true, |h| h.is_empty()) {
            assert_eq!(
                probe.topics_url(),
                "http://127.0.0.1:9/v1/projects/wibble-foo/topics"
            );
        }
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        if std::env::var(EMULATOR_ENV).is_ok() {
            return;
        }
        let endpoint = mock_api("200 OK", Some("ya29.test")).await;
        let probe = PubsubProbe::new("wibble-foo", None, Duration::from_secs(2))
            .with_endpoint(endpoint)
            .with_access_token("ya29.test");
        probe.execute().await.unwrap();
        assert!(!probe.has_credentials());
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail() {
        if std::env::var(EMULATOR_ENV).is_ok() {
            return;
        }
        let endpoint = mock_api("200 OK", Some("ya29.valid")).await;
        let probe = PubsubProbe::new("wibble-foo", None, Duration::from_secs(2))
            .with_endpoint(endpoint)
            .with_access_token("ya29.expired");
        let err = probe.execute().await.unwrap_err();
        assert_eq!(err.context(), CLIENT_CONTEXT);
        assert!(err.to_string().contains("401"), "{err}");
    }

    #[tokio::test]
    async fn test_forbidden_counts_as_reachable() {
        if std::env::var(EMULATOR_ENV).is_ok() {
            return;
        }
        let endpoint = mock_api("403 Forbidden", None).await;
        let probe = PubsubProbe::new("wibble-foo", None, Duration::from_secs(2))
            .with_endpoint(endpoint)
            .with_access_token("ya29.test");
        probe.execute().await.unwrap();
        assert!(probe.last_error().is_none());
    }

    #[tokio::test]
    async fn test_no_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = PubsubProbe::new("wibble-foo", Some(host), Duration::from_secs(1));
        let err = probe.execute().await.unwrap_err();
        assert_eq!(err.context(), CLIENT_CONTEXT);
        assert_eq!(probe.status(), ProbeStatus::Done);
    }
}
