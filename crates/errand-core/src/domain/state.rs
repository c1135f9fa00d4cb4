//! Task state machine for one run of the task runner.

use serde::{Deserialize, Serialize};

/// State of one task while the runner owns it.
///
/// State transitions:
/// - Scheduled -> Running -> Succeeded
/// - Scheduled -> Running -> FailedRetryable -> Scheduled (loop until retries are exhausted)
/// - Scheduled -> Running -> FailedPermanent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for its first attempt or for a backoff delay to elapse.
    Scheduled,

    /// Currently executing the unit of work.
    Running,

    /// Result written to `done:<key>`.
    Succeeded,

    /// Attempt failed, another one will be scheduled.
    FailedRetryable,

    /// Retries exhausted or the failure was not retryable.
    FailedPermanent,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::FailedPermanent)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Scheduled, Running)
                | (Running, Succeeded)
                | (Running, FailedRetryable)
                | (Running, FailedPermanent)
                | (FailedRetryable, Scheduled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::TaskState::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Scheduled, Running, true)]
    #[case(Running, Succeeded, true)]
    #[case(Running, FailedRetryable, true)]
    #[case(FailedRetryable, Scheduled, true)]
    #[case(Running, FailedPermanent, true)]
    #[case(Scheduled, Succeeded, false)]
    #[case(Succeeded, Running, false)]
    #[case(FailedPermanent, Scheduled, false)]
    #[case(FailedRetryable, Running, false)]
    fn transitions(#[case] from: TaskState, #[case] to: TaskState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_success_and_permanent_failure_are_terminal() {
        assert!(Succeeded.is_terminal());
        assert!(FailedPermanent.is_terminal());
        assert!(!Scheduled.is_terminal());
        assert!(!Running.is_terminal());
        assert!(!FailedRetryable.is_terminal());
    }
}
