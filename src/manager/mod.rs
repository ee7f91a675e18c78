//! Health manager subsystem.
//!
//! # Data Flow
//! ```text
//! register(probe) ──▶ Registry (insertion order)
//!
//! run():
//!     lock registry
//!     → round.rs: spawn every probe, wait for all
//!     → aggregate.rs: healthy iff no probe failed
//!     → healthy: return Ok
//!     → unhealthy and past deadline: return TimeoutError
//!     → otherwise sleep check_interval, next round
//!
//! cleanup(): lock registry → release every probe
//! ```
//!
//! # Design Decisions
//! - One async mutex guards the registry; `run` holds it for its whole duration
//! - Registration during a run waits for the run to finish (`try_register` fails fast instead)
//! - The deadline is only checked between rounds; a slow round may overshoot it
//! - `healthy()` never takes the lock so readiness endpoints can poll it

pub mod aggregate;
pub mod error;
mod round;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::ManagerConfig;
use crate::observability::metrics;
use crate::probe::Probe;

pub use aggregate::{FailureOrigin, ProbeFailure, RoundOutcome, TimeoutError};
pub use error::{HealthError, HealthResult};

/// Validated polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub check_interval: Duration,
    pub deadline: Duration,
    pub round_timeout: Option<Duration>,
}

impl ManagerSettings {
    pub fn new(check_interval: Duration, deadline: Duration) -> Self {
        Self {
            check_interval,
            deadline,
            round_timeout: None,
        }
    }

    pub fn with_round_timeout(mut self, round_timeout: Duration) -> Self {
        self.round_timeout = Some(round_timeout);
        self
    }

    fn validate(&self) -> HealthResult<()> {
        if self.check_interval.is_zero() {
            return Err(HealthError::InvalidConfig {
                field: "check_interval",
                reason: "must be greater than zero",
            });
        }
        if self.deadline.is_zero() {
            return Err(HealthError::InvalidConfig {
                field: "deadline",
                reason: "must be greater than zero",
            });
        }
        if self.round_timeout.is_some_and(|t| t.is_zero()) {
            return Err(HealthError::InvalidConfig {
                field: "round_timeout",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

impl From<&ManagerConfig> for ManagerSettings {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            deadline: config.deadline(),
            round_timeout: config.round_timeout(),
        }
    }
}

#[derive(Default)]
struct Registry {
    probes: Vec<Arc<dyn Probe>>,
    run_started: Option<SystemTime>,
}

/// Runs registered probes until all of them pass or the deadline elapses.
pub struct HealthManager {
    settings: ManagerSettings,
    healthy: AtomicBool,
    registry: Mutex<Registry>,
}

impl HealthManager {
    /// Create a manager polling every `check_interval` for at most `deadline`.
    pub fn new(check_interval: Duration, deadline: Duration) -> HealthResult<Self> {
        Self::with_settings(ManagerSettings::new(check_interval, deadline))
    }

    pub fn with_settings(settings: ManagerSettings) -> HealthResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            healthy: AtomicBool::new(false),
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn from_config(config: &ManagerConfig) -> HealthResult<Self> {
        Self::with_settings(ManagerSettings::from(config))
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Whether the last run finished with every probe passing in one round.
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Add a probe, waiting for any in-progress run to finish first.
    pub async fn register<P>(&self, probe: P) -> HealthResult<()>
    where
        P: Into<Option<Arc<dyn Probe>>>,
    {
        let probe = check_probe(probe.into())?;
        let mut registry = self.registry.lock().await;
        push_probe(&mut registry, probe);
        Ok(())
    }

    /// Add a probe unless a run currently holds the manager.
    pub fn try_register<P>(&self, probe: P) -> HealthResult<()>
    where
        P: Into<Option<Arc<dyn Probe>>>,
    {
        let probe = check_probe(probe.into())?;
        let mut registry = self.registry.try_lock().map_err(|_| HealthError::Busy)?;
        push_probe(&mut registry, probe);
        Ok(())
    }

    pub async fn probe_count(&self) -> usize {
        self.registry.lock().await.probes.len()
    }

    /// Registered probe kinds in registration order.
    pub async fn kinds(&self) -> Vec<String> {
        let registry = self.registry.lock().await;
        registry.probes.iter().map(|p| p.kind().to_string()).collect()
    }

    /// Wall-clock start of the most recent run.
    pub async fn last_run_started(&self) -> Option<SystemTime> {
        self.registry.lock().await.run_started
    }

    /// Poll every registered probe until all pass in the same round.
    ///
    /// Returns `HealthError::Timeout` listing the probes that were still
    /// failing once the deadline has passed. The deadline is evaluated after
    /// each round, so the call can outlast it by one round plus one interval.
    pub async fn run(&self) -> HealthResult<()> {
        let mut registry = self.registry.lock().await;

        self.set_healthy(false);
        registry.run_started = Some(SystemTime::now());
        let started = Instant::now();

        tracing::info!(
            probes = registry.probes.len(),
            check_interval_ms = self.settings.check_interval.as_millis() as u64,
            deadline_ms = self.settings.deadline.as_millis() as u64,
            "Waiting for dependencies"
        );

        let mut rounds: u32 = 0;
        loop {
            rounds += 1;
            let outcome = round::execute_round(&registry.probes, self.settings.round_timeout).await;
            metrics::record_round(outcome.is_healthy());

            if outcome.is_healthy() {
                self.set_healthy(true);
                tracing::info!(
                    rounds,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "All dependencies healthy"
                );
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed > self.settings.deadline {
                let err = outcome.into_timeout(elapsed, rounds);
                tracing::error!(rounds, error = %err, "Dependency wait timed out");
                return Err(err.into());
            }

            tracing::debug!(
                round = rounds,
                failing = outcome.failures.len(),
                "Dependencies unhealthy, retrying"
            );
            tokio::time::sleep(self.settings.check_interval).await;
        }
    }

    /// Release every registered probe's resources.
    pub async fn cleanup(&self) {
        let registry = self.registry.lock().await;
        for probe in &registry.probes {
            probe.release();
        }
        tracing::debug!(probes = registry.probes.len(), "Probes released");
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
        metrics::record_healthy(healthy);
    }
}

impl std::fmt::Debug for HealthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthManager")
            .field("settings", &self.settings)
            .field("healthy", &self.healthy())
            .finish()
    }
}

fn check_probe(probe: Option<Arc<dyn Probe>>) -> HealthResult<Arc<dyn Probe>> {
    let probe = probe.ok_or(HealthError::InvalidProbe("probe is absent"))?;
    if probe.kind().trim().is_empty() {
        return Err(HealthError::InvalidProbe("probe kind is blank"));
    }
    Ok(probe)
}

fn push_probe(registry: &mut Registry, probe: Arc<dyn Probe>) {
    tracing::debug!(kind = probe.kind(), position = registry.probes.len(), "Probe registered");
    registry.probes.push(probe);
}
