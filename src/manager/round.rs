//! One polling round: fan-out, barrier, fan-in.
//!
//! # Responsibilities
//! - Spawn one task per probe so probes run in parallel
//! - Wait for every task before the round is evaluated
//! - Isolate panics and, optionally, stop probes that overrun the round
//!
//! # Design Decisions
//! - Probe outcomes are read back through `Probe::last_error` after the barrier
//! - A panicked or aborted probe counts as failing for that round only
//! - Round tasks never outlive the round: dropping it aborts them

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::manager::aggregate::{FailureOrigin, ProbeFailure, RoundOutcome};
use crate::observability::metrics;
use crate::probe::{Probe, ProbeError};

const PANIC_CONTEXT: &str = "error executing probe";
const WATCHDOG_CONTEXT: &str = "probe exceeded round timeout";

enum Joined {
    Finished,
    Panicked(String),
    Overran(Duration),
}

/// Tasks spawned for one round. Dropping the set aborts any still running.
struct RoundTasks(Vec<JoinHandle<()>>);

impl Drop for RoundTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Execute every probe once and aggregate the results.
pub(crate) async fn execute_round(
    probes: &[Arc<dyn Probe>],
    watchdog: Option<Duration>,
) -> RoundOutcome {
    let started = Instant::now();

    let mut tasks = RoundTasks(
        probes
            .iter()
            .map(|probe| {
                let probe = Arc::clone(probe);
                tokio::spawn(async move {
                    // The outcome is recorded in the probe's own state.
                    let _ = probe.execute().await;
                })
            })
            .collect(),
    );

    let mut joined = Vec::with_capacity(tasks.0.len());
    for handle in tasks.0.iter_mut() {
        let result = match watchdog {
            Some(limit) => match timeout_at(started + limit, &mut *handle).await {
                Ok(result) => result,
                Err(_) => {
                    handle.abort();
                    joined.push(Joined::Overran(limit));
                    continue;
                }
            },
            None => handle.await,
        };
        joined.push(match result {
            Ok(()) => Joined::Finished,
            Err(e) => Joined::Panicked(e.to_string()),
        });
    }

    let mut outcome = RoundOutcome {
        probes: probes.len(),
        failures: Vec::new(),
    };
    for (probe, joined) in probes.iter().zip(joined) {
        let failure = match joined {
            Joined::Finished => probe.last_error().map(|e| (e, FailureOrigin::Probe)),
            Joined::Panicked(reason) => {
                tracing::error!(kind = probe.kind(), %reason, "Probe task panicked");
                Some((ProbeError::msg(PANIC_CONTEXT, reason), FailureOrigin::Panicked))
            }
            Joined::Overran(limit) => {
                tracing::warn!(kind = probe.kind(), limit_ms = limit.as_millis() as u64, "Probe aborted by round watchdog");
                Some((
                    ProbeError::msg(WATCHDOG_CONTEXT, format!("still running after {:?}", limit)),
                    FailureOrigin::Watchdog,
                ))
            }
        };

        metrics::record_probe_check(probe.kind(), failure.is_none());
        if let Some((error, origin)) = failure {
            tracing::warn!(kind = probe.kind(), error = %error, ?origin, "Probe unhealthy");
            outcome.failures.push(ProbeFailure {
                kind: probe.kind().to_string(),
                error,
                origin,
            });
        }
    }

    tracing::debug!(
        probes = outcome.probes,
        failing = outcome.failures.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Round complete"
    );
    outcome
}
