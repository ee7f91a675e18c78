//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use healthgate::{Probe, ProbeError, ProbeState, ProbeStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Probe whose outcome is scripted per attempt.
///
/// Fails with `cause` until it has been executed `fail_times` times, then
/// passes. Counts executions, releases and attempts still in flight.
pub struct ScriptedProbe {
    kind: String,
    cause: &'static str,
    fail_times: usize,
    delay: Duration,
    pub executions: AtomicUsize,
    pub releases: AtomicUsize,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
    state: ProbeState,
}

/// Counts an attempt as running until it returns or is dropped mid-flight.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(running)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProbe {
    pub fn passing(kind: &str) -> Arc<Self> {
        Self::build(kind, "", 0)
    }

    pub fn failing(kind: &str, cause: &'static str) -> Arc<Self> {
        Self::build(kind, cause, usize::MAX)
    }

    /// Fails for the first `times` attempts.
    pub fn flaky(kind: &str, cause: &'static str, times: usize) -> Arc<Self> {
        Self::build(kind, cause, times)
    }

    pub fn slow(kind: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::unwrapped(kind, "", 0)
        })
    }

    fn build(kind: &str, cause: &'static str, fail_times: usize) -> Arc<Self> {
        Arc::new(Self::unwrapped(kind, cause, fail_times))
    }

    fn unwrapped(kind: &str, cause: &'static str, fail_times: usize) -> Self {
        Self {
            kind: kind.to_string(),
            cause,
            fail_times,
            delay: Duration::ZERO,
            executions: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            state: ProbeState::new(),
        }
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn status(&self) -> ProbeStatus {
        self.state.status()
    }

    fn last_check(&self) -> SystemTime {
        self.state.last_check()
    }

    fn last_error(&self) -> Option<ProbeError> {
        self.state.last_error()
    }

    async fn execute(&self) -> Result<(), ProbeError> {
        self.state.begin();
        let attempt = self.executions.fetch_add(1, Ordering::SeqCst);
        self.state.checking();
        let _in_flight = InFlight::enter(&self.running, &self.peak);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = if attempt < self.fail_times {
            Err(ProbeError::msg("error pinging dependency", self.cause))
        } else {
            Ok(())
        };
        self.state.finish(result)
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Upcast helper for registration.
pub fn dyn_probe<P: Probe + 'static>(probe: &Arc<P>) -> Arc<dyn Probe> {
    probe.clone()
}

/// Start a minimal HTTP backend that answers every request with 200.
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
