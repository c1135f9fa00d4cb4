//! Terminal records written by the runner.
//!
//! Both records are stored as JSON strings (`done:<key>` / `failed:<key>`) and
//! are returned to polling clients as-is, so their serialized shape is part of
//! the HTTP contract.

use serde::{Deserialize, Serialize};

use super::IdempotencyKey;

/// Successful terminal result.
///
/// Example: `{"status":"done","key":"k1","result":{"items":3,"month":"2025-11"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: DoneTag,
    pub key: IdempotencyKey,
    pub result: serde_json::Value,
}

/// Permanent failure of the last run of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub status: FailedTag,
    pub key: IdempotencyKey,
    pub error: String,
    pub attempts: u32,
}

/// Serializes as the literal `"done"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneTag {
    #[default]
    Done,
}

/// Serializes as the literal `"failed"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedTag {
    #[default]
    Failed,
}

impl JobResult {
    pub fn new(key: IdempotencyKey, result: serde_json::Value) -> Self {
        Self {
            status: DoneTag::Done,
            key,
            result,
        }
    }
}

impl FailureRecord {
    pub fn new(key: IdempotencyKey, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: FailedTag::Failed,
            key,
            error: error.into(),
            attempts,
        }
    }
}
