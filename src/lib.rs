//! Dependency readiness gate.
//!
//! Register probes for the services a process depends on (HTTP peers,
//! databases, brokers) and block until all of them answer in the same
//! round, or fail once a deadline passes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use healthgate::{HealthManager, Probe};
//! use healthgate::probe::TcpProbe;
//!
//! # async fn example() -> Result<(), healthgate::HealthError> {
//! let manager = HealthManager::new(Duration::from_secs(1), Duration::from_secs(30))?;
//! let db: Arc<dyn Probe> = Arc::new(TcpProbe::new("db", 5432, Duration::from_secs(2)));
//! manager.register(db).await?;
//! manager.run().await?;
//! manager.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod probe;

pub use config::GateConfig;
pub use manager::{HealthError, HealthManager, ManagerSettings, TimeoutError};
pub use probe::{Probe, ProbeError, ProbeState, ProbeStatus};
