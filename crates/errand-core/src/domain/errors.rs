//! Errors raised by a unit of work.

/// Failure reported by a unit of work.
///
/// The runner retries `Retryable` failures according to its `RetryPolicy`;
/// `Permanent` ends the task immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

impl WorkError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}
