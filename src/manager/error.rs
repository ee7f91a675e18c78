//! Health manager error definitions.

use thiserror::Error;

use crate::manager::aggregate::TimeoutError;

/// Errors surfaced by [`HealthManager`](crate::manager::HealthManager).
#[derive(Debug, Clone, Error)]
pub enum HealthError {
    /// Constructor arguments out of range.
    #[error("invalid health manager configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// The probe handed to registration is absent or unusable.
    #[error("cannot register invalid probe: {0}")]
    InvalidProbe(&'static str),

    /// A run currently holds the manager.
    #[error("health manager is busy running checks")]
    Busy,

    /// The deadline elapsed with probes still failing.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl HealthError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HealthError::Timeout(_))
    }

    /// The timeout details, if this is a timeout.
    pub fn as_timeout(&self) -> Option<&TimeoutError> {
        match self {
            HealthError::Timeout(t) => Some(t),
            _ => None,
        }
    }
}

pub type HealthResult<T> = Result<T, HealthError>;
