//! Round result aggregation.
//!
//! # Responsibilities
//! - Decide whether a round was healthy (every probe succeeded)
//! - Collect failing probes in registration order
//! - Fold the failures of the last round into a timeout error
//!
//! # Design Decisions
//! - Failures stay structured (kind + error) until rendered
//! - All-or-nothing: one failing probe makes the round unhealthy

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::probe::ProbeError;

/// Who produced the error of a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureOrigin {
    /// The probe's own `execute` result, also visible via `last_error`.
    Probe,
    /// The probe task panicked; the error was built by the manager.
    Panicked,
    /// The round watchdog aborted the probe; the error was built by the manager.
    Watchdog,
}

/// One probe that failed a round.
///
/// For manager-built errors the probe's own `last_error` is stale and its
/// status may still read `Checking`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: String,
    pub error: ProbeError,
    pub origin: FailureOrigin,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// Outcome of one round, in registration order.
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub probes: usize,
    pub failures: Vec<ProbeFailure>,
}

impl RoundOutcome {
    pub fn is_healthy(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_timeout(self, elapsed: Duration, rounds: u32) -> TimeoutError {
        TimeoutError {
            elapsed,
            rounds,
            failures: self.failures,
        }
    }
}

/// The deadline elapsed while at least one probe was still failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutError {
    elapsed: Duration,
    rounds: u32,
    failures: Vec<ProbeFailure>,
}

impl TimeoutError {
    pub const MESSAGE: &'static str = "health check timed out with probes failing";

    /// Probes still failing in the last round, in registration order.
    pub fn failures(&self) -> &[ProbeFailure] {
        &self.failures
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Failing probe kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.kind.as_str())
    }

    /// JSON-friendly view for reports.
    pub fn report(&self) -> TimeoutReport {
        TimeoutReport {
            message: Self::MESSAGE,
            elapsed_ms: self.elapsed.as_millis() as u64,
            rounds: self.rounds,
            failures: self
                .failures
                .iter()
                .map(|f| FailureReport {
                    kind: f.kind.clone(),
                    error: f.error.to_string(),
                    origin: f.origin,
                })
                .collect(),
        }
    }
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::MESSAGE)?;
        for (i, failure) in self.failures.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for TimeoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeoutReport {
    pub message: &'static str,
    pub elapsed_ms: u64,
    pub rounds: u32,
    pub failures: Vec<FailureReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub kind: String,
    pub error: String,
    pub origin: FailureOrigin,
}
