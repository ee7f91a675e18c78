//! Probe failure type.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

type Cause = Arc<dyn StdError + Send + Sync>;

/// A dependency-specific failure recorded by a probe.
///
/// Carries the step that failed ("error pinging postgres database") and the
/// underlying cause, which is also the error's `source()`. The cause is
/// shared, so the value stored as a probe's last error and the value
/// returned from `execute` are the same error.
#[derive(Debug, Clone, Error)]
#[error("{context}: {cause}")]
pub struct ProbeError {
    context: Cow<'static, str>,
    #[source]
    cause: Cause,
}

impl ProbeError {
    /// Wrap `cause` with the step that produced it.
    pub fn new<E>(context: impl Into<Cow<'static, str>>, cause: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            context: context.into(),
            cause: Arc::from(cause.into()),
        }
    }

    /// Failure with a plain-text cause.
    pub fn msg(context: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(context, message.into())
    }

    /// The step that failed.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

/// Two probe errors are equal when they wrap the very same cause.
impl PartialEq for ProbeError {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context && Arc::ptr_eq(&self.cause, &other.cause)
    }
}

impl Eq for ProbeError {}
