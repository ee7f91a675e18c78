//! Probe lifecycle state.
//!
//! # States
//! - Starting: the probe is preparing what it needs for an attempt
//! - Checking: the round-trip against the dependency is in flight
//! - Done: the attempt finished; last check time and last error are valid
//!
//! # State Transitions
//! ```text
//! Starting → Checking → Done      (every execute call, success or failure)
//! Done → Starting                 (next execute call)
//! ```
//!
//! # Design Decisions
//! - One lock per probe; the manager never writes probe state
//! - A fresh probe reports UNIX_EPOCH as its last check ("never")

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::probe::ProbeError;

/// Where a probe is within its current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Starting,
    Checking,
    Done,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeStatus::Starting => "starting",
            ProbeStatus::Checking => "checking",
            ProbeStatus::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Inner {
    status: ProbeStatus,
    last_check: SystemTime,
    last_error: Option<ProbeError>,
}

/// Bookkeeping shared by every probe adapter.
///
/// Adapters call [`begin`](Self::begin) before setup,
/// [`checking`](Self::checking) right before the round-trip and
/// [`finish`](Self::finish) with the outcome.
#[derive(Debug)]
pub struct ProbeState {
    inner: Mutex<Inner>,
}

impl ProbeState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: ProbeStatus::Starting,
                last_check: UNIX_EPOCH,
                last_error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ProbeStatus {
        self.lock().status
    }

    pub fn last_check(&self) -> SystemTime {
        self.lock().last_check
    }

    pub fn last_error(&self) -> Option<ProbeError> {
        self.lock().last_error.clone()
    }

    /// Enter the setup phase of a new attempt.
    pub fn begin(&self) {
        self.lock().status = ProbeStatus::Starting;
    }

    /// Enter the round-trip phase.
    pub fn checking(&self) {
        self.lock().status = ProbeStatus::Checking;
    }

    /// Record the outcome of the attempt and hand it back unchanged.
    pub fn finish(&self, result: Result<(), ProbeError>) -> Result<(), ProbeError> {
        let mut inner = self.lock();
        inner.last_error = result.as_ref().err().cloned();
        inner.last_check = SystemTime::now();
        inner.status = ProbeStatus::Done;
        result
    }
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}
