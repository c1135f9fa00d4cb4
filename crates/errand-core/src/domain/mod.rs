//! Domain model (keys, ids, envelopes, job status, retry policy, ...).
//!
//! Nothing here performs I/O; the store and queue live behind `ports`.

pub mod errors;
pub mod ids;
pub mod key;
pub mod outcome;
pub mod retry;
pub mod state;
pub mod status;
pub mod task;

pub use errors::WorkError;
pub use ids::{CorrelationId, ParseTaskIdError, TaskId};
pub use key::{EmptyKeyError, IdempotencyKey, JobKeys};
pub use outcome::{FailureRecord, JobResult};
pub use retry::{Decision, RetryPolicy};
pub use state::TaskState;
pub use status::{JobStatus, SubmitOutcome};
pub use task::{TaskEnvelope, TaskType};
