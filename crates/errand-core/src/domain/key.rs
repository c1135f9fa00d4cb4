//! Idempotency keys and the store key layout derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied token identifying one logical job.
///
/// The only validation is non-emptiness; everything else is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

/// The key was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("idempotency key must not be empty")]
pub struct EmptyKeyError;

impl IdempotencyKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, EmptyKeyError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(EmptyKeyError);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store keys for this job.
    pub fn keys(&self) -> JobKeys {
        JobKeys::new(self)
    }

    /// Path a client polls for the outcome.
    pub fn poll_path(&self) -> String {
        format!("/jobs/{}", self.0)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = EmptyKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

/// Shared-store layout of one job record.
///
/// | key            | writer      | value                    |
/// |----------------|-------------|--------------------------|
/// | `inflight:<k>` | dispatcher  | owning task id           |
/// | `task:<k>`     | dispatcher  | task id                  |
/// | `done:<k>`     | runner      | serialized `JobResult`   |
/// | `failed:<k>`   | runner      | serialized `FailureRecord` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKeys {
    pub inflight: String,
    pub task: String,
    pub done: String,
    pub failed: String,
}

impl JobKeys {
    pub fn new(key: &IdempotencyKey) -> Self {
        Self {
            inflight: format!("inflight:{key}"),
            task: format!("task:{key}"),
            done: format!("done:{key}"),
            failed: format!("failed:{key}"),
        }
    }
}
