//! Per-job knobs shared by the dispatcher and the runner.

use std::time::Duration;

/// JobOptions はジョブ記録の寿命と失敗時の扱いを決める
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    /// TTL of `inflight:`, `task:`, `done:` and `failed:` entries.
    pub ttl: Duration,

    /// Write `failed:<key>` and release the claim when a task gives up.
    /// When off, the inflight marker is left to expire on its own.
    pub record_failures: bool,

    /// Refresh the inflight TTL at this interval while work runs.
    pub lease_heartbeat: Option<Duration>,
}

impl JobOptions {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            ttl: Self::DEFAULT_TTL,
            record_failures: true,
            lease_heartbeat: None,
        }
    }
}
