//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build manager → Register probes → Run → Cleanup
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Abandon the wait, still clean up
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then manager, then probes
//! - Cleanup runs on every exit path

pub mod signals;
pub mod startup;

pub use signals::shutdown_signal;
pub use startup::{build_manager, wait_for_dependencies};
