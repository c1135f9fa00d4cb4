use thiserror::Error;

use crate::domain::{EmptyKeyError, TaskType};
use crate::ports::{QueueError, StoreError};

#[derive(Debug, Error)]
pub enum ErrandError {
    #[error("idempotency key must not be empty")]
    EmptyKey,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("stored record is not valid json: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("work not found for task_type={0}")]
    WorkNotFound(TaskType),

    #[error("duplicate work for task_type={0}")]
    DuplicateWork(TaskType),
}

impl From<EmptyKeyError> for ErrandError {
    fn from(_: EmptyKeyError) -> Self {
        Self::EmptyKey
    }
}

impl ErrandError {
    /// Caller mistake, as opposed to an infrastructure or codec failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyKey)
    }

    /// The store or the queue could not be reached or refused the command.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Queue(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_a_client_error() {
        let err = ErrandError::from(EmptyKeyError);
        assert!(err.is_client_error());
        assert!(!err.is_infrastructure());
        assert_eq!(err.to_string(), "idempotency key must not be empty");
    }

    #[test]
    fn store_and_queue_failures_are_infrastructure() {
        let store = ErrandError::from(StoreError::Unavailable("down".into()));
        let queue = ErrandError::from(QueueError::OperationFailed("down".into()));
        assert!(store.is_infrastructure());
        assert!(queue.is_infrastructure());
        assert!(!store.is_client_error());
    }
}
