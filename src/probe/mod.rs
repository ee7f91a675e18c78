//! Dependency probes.
//!
//! # Data Flow
//! ```text
//! HealthManager round
//!     → Probe::execute (one task per probe)
//!     → ProbeState (state.rs) records status, last check, last error
//!     → aggregator reads Probe::last_error after the barrier
//! ```
//!
//! # Design Decisions
//! - Every dependency kind implements the same trait; the manager never downcasts
//! - Each adapter bounds its own round-trip with a timeout
//! - Failures are values (`ProbeError`), never panics
//! - Adapters open and close their client inside `execute`

pub mod amqp;
pub mod error;
pub mod http;
pub mod postgres;
pub mod pubsub;
pub mod state;
pub mod tcp;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::config::ProbeConfig;

pub use amqp::AmqpProbe;
pub use error::ProbeError;
pub use http::HttpProbe;
pub use postgres::PostgresProbe;
pub use pubsub::PubsubProbe;
pub use state::{ProbeState, ProbeStatus};
pub use tcp::TcpProbe;

/// Uniform contract for a dependency reachability check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Label used for aggregation and error reporting.
    fn kind(&self) -> &str;

    fn status(&self) -> ProbeStatus;

    /// Completion time of the last attempt, `UNIX_EPOCH` if it never ran.
    fn last_check(&self) -> SystemTime;

    /// Error of the last attempt, `None` if it succeeded or never ran.
    ///
    /// Only reflects attempts that ran to completion. When the manager
    /// aborts an attempt (watchdog) or the attempt panics, this keeps the
    /// previous value and the failure is reported with a non-`Probe`
    /// [`FailureOrigin`](crate::manager::FailureOrigin) instead.
    fn last_error(&self) -> Option<ProbeError>;

    /// Perform one attempt against the dependency.
    ///
    /// Returns the same value that [`last_error`](Self::last_error) reports
    /// afterwards.
    async fn execute(&self) -> Result<(), ProbeError>;

    /// Release anything held between attempts. Idempotent.
    fn release(&self) {}
}

/// Build the adapter described by a probe config entry.
pub fn from_config(config: &ProbeConfig) -> Arc<dyn Probe> {
    match config {
        ProbeConfig::Http(c) => Arc::new(HttpProbe::from_config(c)),
        ProbeConfig::Tcp(c) => Arc::new(TcpProbe::from_config(c)),
        ProbeConfig::Postgres(c) => Arc::new(PostgresProbe::from_config(c)),
        ProbeConfig::Rabbitmq(c) => Arc::new(AmqpProbe::from_config(c)),
        ProbeConfig::Pubsub(c) => Arc::new(PubsubProbe::from_config(c)),
    }
}

/// Implements the read side of [`Probe`] by delegating to a `state` field.
macro_rules! delegate_state {
    () => {
        fn status(&self) -> $crate::probe::ProbeStatus {
            self.state.status()
        }

        fn last_check(&self) -> std::time::SystemTime {
            self.state.last_check()
        }

        fn last_error(&self) -> Option<$crate::probe::ProbeError> {
            self.state.last_error()
        }
    };
}

pub(crate) use delegate_state;
