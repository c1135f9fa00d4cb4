//! Job-level views: what a submitter and a poller get back.

use serde_json::Value;

use super::{FailureRecord, IdempotencyKey, TaskId};

/// Result of `JobDispatcher::submit`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// `done:<key>` already existed; nothing was enqueued.
    Cached(Value),

    /// Another submission holds the inflight claim; nothing was enqueued.
    Inflight { poll: String },

    /// This call won the claim and enqueued `task_id`.
    Accepted { poll: String, task_id: TaskId },
}

/// Result of `JobStatusService::poll`, derived from the job's store entries.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// No trace: never submitted, or every entry has expired.
    Unknown,

    /// A task was dispatched and has not reached a terminal state.
    Inflight { task_id: String },

    /// Terminal success, the stored result verbatim.
    Done(Value),

    /// Terminal failure after retries were exhausted.
    Failed(FailureRecord),
}

impl JobStatus {
    /// Compute the status from the raw reads of `done:`, `failed:` and `task:`.
    ///
    /// Precedence is done > failed > task; a stored `done` is authoritative
    /// even if stale markers are still around.
    pub fn derive(
        done: Option<String>,
        failed: Option<String>,
        task: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        if let Some(done) = done {
            return Ok(Self::Done(serde_json::from_str(&done)?));
        }
        if let Some(failed) = failed {
            return Ok(Self::Failed(serde_json::from_str(&failed)?));
        }
        Ok(match task {
            Some(task_id) => Self::Inflight { task_id },
            None => Self::Unknown,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }

    /// Short name used in logs and HTTP bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Inflight { .. } => "inflight",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

impl SubmitOutcome {
    pub(crate) fn inflight(key: &IdempotencyKey) -> Self {
        Self::Inflight {
            poll: key.poll_path(),
        }
    }

    pub(crate) fn accepted(key: &IdempotencyKey, task_id: TaskId) -> Self {
        Self::Accepted {
            poll: key.poll_path(),
            task_id,
        }
    }
}
