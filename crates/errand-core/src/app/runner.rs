//! TaskRunner - 1 つの envelope を終端状態まで実行する
//!
//! # フロー
//! 1. task_type から UnitOfWork を解決（未登録なら即 FailedPermanent）
//! 2. 試行: UnitOfWork を実行 → `done:<key>` を書く → `inflight:<key>` を消す
//!    （値が自分の task_id のときだけ。lease を失った後の claim は他人のもの）
//! 3. 失敗したら RetryPolicy::decide で Retry / GiveUp を決める
//! 4. GiveUp なら（record_failures のとき）`failed:<key>` を書いて claim を解放
//!
//! 結果の保存も試行の一部なので、`done` の書き込み失敗は再試行の対象になります。

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;

use crate::app::options::JobOptions;
use crate::app::registry::WorkRegistry;
use crate::domain::{
    Decision, FailureRecord, IdempotencyKey, JobKeys, JobResult, RetryPolicy, TaskEnvelope,
    TaskId, TaskState, WorkError,
};
use crate::ports::{KeyStore, UnitOfWork, WorkContext};

/// Summary of one `TaskRunner::run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub task_id: TaskId,
    pub key: IdempotencyKey,
    /// `Succeeded` or `FailedPermanent`.
    pub state: TaskState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// TaskRunner は worker 側のプロセスで動く
pub struct TaskRunner {
    store: Arc<dyn KeyStore>,
    registry: Arc<WorkRegistry>,
    policy: RetryPolicy,
    options: JobOptions,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn KeyStore>,
        registry: Arc<WorkRegistry>,
        policy: RetryPolicy,
        options: JobOptions,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            options,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Run `envelope` until it succeeds or gives up.
    pub async fn run(&self, envelope: TaskEnvelope) -> RunReport {
        let keys = envelope.key().keys();

        let work = match self.registry.resolve(envelope.task_type()) {
            Ok(work) => work,
            Err(err) => {
                let err = WorkError::permanent(err.to_string());
                tracing::error!(
                    correlation_id = %envelope.correlation_id(),
                    task_id = %envelope.task_id(),
                    key = %envelope.key(),
                    task_type = %envelope.task_type(),
                    status = "failed",
                    error = %err,
                    "no unit of work registered"
                );
                self.record_failure(&envelope, &keys, &err, 0).await;
                return self.report(&envelope, TaskState::FailedPermanent, 0, Some(&err));
            }
        };

        let mut state = TaskState::Scheduled;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            advance(&mut state, TaskState::Running);
            let retries = attempt - 1;
            tracing::info!(
                correlation_id = %envelope.correlation_id(),
                task_id = %envelope.task_id(),
                key = %envelope.key(),
                retries,
                "task attempt started"
            );

            let ctx = WorkContext {
                task_id: envelope.task_id(),
                key: envelope.key().clone(),
                correlation_id: envelope.correlation_id().clone(),
                attempt,
            };
            let started = Instant::now();
            let result = self
                .attempt(work.as_ref(), &ctx, envelope.payload(), &keys)
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let err = match result {
                Ok(()) => {
                    advance(&mut state, TaskState::Succeeded);
                    tracing::info!(
                        correlation_id = %envelope.correlation_id(),
                        task_id = %envelope.task_id(),
                        key = %envelope.key(),
                        retries,
                        duration_ms,
                        status = "success",
                        "task succeeded"
                    );
                    return self.report(&envelope, state, attempt, None);
                }
                Err(err) => err,
            };

            tracing::warn!(
                correlation_id = %envelope.correlation_id(),
                task_id = %envelope.task_id(),
                key = %envelope.key(),
                retries,
                duration_ms,
                status = "failed",
                error = %err,
                "task attempt failed"
            );

            match self.policy.decide(attempt, &err) {
                Decision::Retry { delay, reason } => {
                    advance(&mut state, TaskState::FailedRetryable);
                    tracing::info!(
                        correlation_id = %envelope.correlation_id(),
                        task_id = %envelope.task_id(),
                        key = %envelope.key(),
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "task retry scheduled"
                    );
                    tokio::time::sleep(delay).await;
                    advance(&mut state, TaskState::Scheduled);
                }
                Decision::GiveUp { reason } => {
                    advance(&mut state, TaskState::FailedPermanent);
                    tracing::error!(
                        correlation_id = %envelope.correlation_id(),
                        task_id = %envelope.task_id(),
                        key = %envelope.key(),
                        retries,
                        status = "failed",
                        error = %err,
                        reason = %reason,
                        "task failed permanently"
                    );
                    self.record_failure(&envelope, &keys, &err, attempt).await;
                    return self.report(&envelope, state, attempt, Some(&err));
                }
            }
        }
    }

    /// One attempt: run the work and persist its result.
    async fn attempt(
        &self,
        work: &dyn UnitOfWork,
        ctx: &WorkContext,
        payload: &serde_json::Value,
        keys: &JobKeys,
    ) -> Result<(), WorkError> {
        let output = self
            .with_heartbeat(work.run(ctx, payload), ctx, keys)
            .await?;

        let record = serde_json::to_string(&JobResult::new(ctx.key.clone(), output))
            .map_err(|e| WorkError::permanent(format!("result encode: {e}")))?;
        self.store
            .set_with_expiry(&keys.done, &record, self.options.ttl)
            .await
            .map_err(|e| WorkError::retryable(format!("persist result: {e}")))?;

        // done は書けているので、ここでの失敗は TTL 任せにする
        match self
            .store
            .delete_if_equals(&keys.inflight, &ctx.task_id.to_string())
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                correlation_id = %ctx.correlation_id,
                task_id = %ctx.task_id,
                key = %ctx.key,
                "inflight marker no longer ours, left in place"
            ),
            Err(err) => tracing::warn!(
                correlation_id = %ctx.correlation_id,
                task_id = %ctx.task_id,
                key = %ctx.key,
                error = %err,
                "failed to clear inflight marker"
            ),
        }
        Ok(())
    }

    /// Drive `work` to completion, refreshing the lease on every heartbeat tick.
    async fn with_heartbeat<F>(&self, work: F, ctx: &WorkContext, keys: &JobKeys) -> F::Output
    where
        F: Future,
    {
        let Some(interval) = self.options.lease_heartbeat.filter(|d| !d.is_zero()) else {
            return work.await;
        };

        tokio::pin!(work);
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = ticker.tick() => self.renew_lease(ctx, keys).await,
            }
        }
    }

    /// Extend `inflight` and `task` while the claim still names this task.
    async fn renew_lease(&self, ctx: &WorkContext, keys: &JobKeys) {
        let ttl = self.options.ttl;
        let owner = ctx.task_id.to_string();
        let renewed = match self.store.get(&keys.inflight).await {
            Ok(Some(holder)) if holder == owner => self.store.expire(&keys.inflight, ttl).await,
            Ok(_) => Ok(false),
            Err(err) => Err(err),
        };
        match renewed {
            Ok(true) => {
                if let Err(err) = self.store.expire(&keys.task, ttl).await {
                    tracing::warn!(
                        correlation_id = %ctx.correlation_id,
                        task_id = %ctx.task_id,
                        key = %ctx.key,
                        error = %err,
                        "failed to renew task marker"
                    );
                }
                tracing::debug!(
                    correlation_id = %ctx.correlation_id,
                    task_id = %ctx.task_id,
                    key = %ctx.key,
                    ttl_secs = ttl.as_secs(),
                    "lease renewed"
                );
            }
            Ok(false) => tracing::warn!(
                correlation_id = %ctx.correlation_id,
                task_id = %ctx.task_id,
                key = %ctx.key,
                "inflight marker gone or taken over, lease lost"
            ),
            Err(err) => tracing::warn!(
                correlation_id = %ctx.correlation_id,
                task_id = %ctx.task_id,
                key = %ctx.key,
                error = %err,
                "failed to renew lease"
            ),
        }
    }

    /// Write `failed:<key>` and release the claim.
    ///
    /// With `record_failures` off nothing is written and the inflight marker
    /// expires on its TTL.
    async fn record_failure(
        &self,
        envelope: &TaskEnvelope,
        keys: &JobKeys,
        err: &WorkError,
        attempts: u32,
    ) {
        if !self.options.record_failures {
            return;
        }

        let record = FailureRecord::new(envelope.key().clone(), err.message(), attempts);
        let written = match serde_json::to_string(&record) {
            Ok(json) => self
                .store
                .set_with_expiry(&keys.failed, &json, self.options.ttl)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = written {
            tracing::warn!(
                correlation_id = %envelope.correlation_id(),
                task_id = %envelope.task_id(),
                key = %envelope.key(),
                error = %reason,
                "failed to record failure, claim kept until ttl"
            );
            return;
        }

        // 別の submitter が取り直した claim は消さない
        let owner = envelope.task_id().to_string();
        for marker in [&keys.inflight, &keys.task] {
            if let Err(e) = self.store.delete_if_equals(marker, &owner).await {
                tracing::warn!(
                    correlation_id = %envelope.correlation_id(),
                    task_id = %envelope.task_id(),
                    marker = %marker,
                    error = %e,
                    "failed to clear marker after failure"
                );
            }
        }
    }

    fn report(
        &self,
        envelope: &TaskEnvelope,
        state: TaskState,
        attempts: u32,
        last_error: Option<&WorkError>,
    ) -> RunReport {
        RunReport {
            task_id: envelope.task_id(),
            key: envelope.key().clone(),
            state,
            attempts,
            last_error: last_error.map(|e| e.message().to_string()),
        }
    }
}

fn advance(state: &mut TaskState, next: TaskState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid transition {state:?} -> {next:?}"
    );
    *state = next;
}
