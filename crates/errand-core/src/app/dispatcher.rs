//! JobDispatcher - 冪等キーによる重複排除と投入
//!
//! # フロー
//! 1. キーが空なら `ErrandError::EmptyKey`（ストアには触らない）
//! 2. `done:<key>` があればそれを返す（副作用なし）
//! 3. `inflight:<key>` を `set_if_absent` で確保（値は task_id）。取れなければ `Inflight`
//! 4. 確保後にもう一度 `done:<key>` を見る。あれば claim を返して `Cached`
//! 5. 古い `failed:<key>` を消して envelope を投入し、`task:<key>` に task_id を記録
//! 6. `Accepted` を返す
//!
//! 重複排除は 3 の `set_if_absent` がストア側で原子的であることだけに依存します。
//! 4 は 2 と 3 の間に worker が完了して `inflight` を消した場合の再実行を防ぎます。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::domain::{
    CorrelationId, IdempotencyKey, JobKeys, SubmitOutcome, TaskEnvelope, TaskId, TaskType,
};
use crate::error::ErrandError;
use crate::ports::{Clock, IdGenerator, KeyStore, TaskQueue};

/// JobDispatcher は HTTP 側のプロセスで動く
pub struct JobDispatcher {
    store: Arc<dyn KeyStore>,
    queue: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    task_type: TaskType,
    ttl: Duration,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn KeyStore>,
        queue: Arc<dyn TaskQueue>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        task_type: TaskType,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            ids,
            task_type,
            ttl,
        }
    }

    /// Task type stamped on every envelope this dispatcher enqueues.
    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    /// Submit `payload` under `key`.
    ///
    /// `correlation_id` is the request id from the HTTP boundary; a fresh one is
    /// generated when absent.
    pub async fn submit(
        &self,
        key: &str,
        payload: Value,
        correlation_id: Option<CorrelationId>,
    ) -> Result<SubmitOutcome, ErrandError> {
        let key = IdempotencyKey::parse(key)?;
        let correlation_id = correlation_id.unwrap_or_else(|| self.ids.correlation_id());
        let keys = key.keys();

        if let Some(cached) = self.cached(&keys).await? {
            tracing::info!(
                correlation_id = %correlation_id,
                key = %key,
                outcome = "cached",
                "job result served from cache"
            );
            return Ok(SubmitOutcome::Cached(cached));
        }

        let task_id = self.ids.task_id();
        let owner = task_id.to_string();
        let claimed = self
            .store
            .set_if_absent(&keys.inflight, &owner, self.ttl)
            .await?;
        if !claimed {
            tracing::info!(
                correlation_id = %correlation_id,
                key = %key,
                outcome = "inflight",
                "job already inflight"
            );
            return Ok(SubmitOutcome::inflight(&key));
        }

        // the previous run may have finished between the first read and the claim
        match self.cached(&keys).await {
            Ok(None) => {}
            Ok(Some(cached)) => {
                self.release_claim(&keys, &owner, &correlation_id).await;
                tracing::info!(
                    correlation_id = %correlation_id,
                    key = %key,
                    outcome = "cached",
                    "job result served from cache"
                );
                return Ok(SubmitOutcome::Cached(cached));
            }
            Err(err) => {
                self.release_claim(&keys, &owner, &correlation_id).await;
                return Err(err);
            }
        }

        let envelope = TaskEnvelope::new(
            task_id,
            self.task_type.clone(),
            key.clone(),
            correlation_id.clone(),
            payload,
            self.clock.now(),
        );

        let task_id = match self.enqueue_claimed(&keys, envelope).await {
            Ok(task_id) => task_id,
            Err(err) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    key = %key,
                    task_id = %task_id,
                    error = %err,
                    "enqueue failed, releasing inflight claim"
                );
                self.release_claim(&keys, &owner, &correlation_id).await;
                return Err(err);
            }
        };

        // The task is already queued; a missing task marker only delays
        // `Inflight` on poll, so it must not turn into a failed submit.
        if let Err(err) = self
            .store
            .set_with_expiry(&keys.task, &owner, self.ttl)
            .await
        {
            tracing::warn!(
                correlation_id = %correlation_id,
                key = %key,
                task_id = %task_id,
                error = %err,
                "failed to record task id"
            );
        }

        tracing::info!(
            correlation_id = %correlation_id,
            key = %key,
            task_id = %task_id,
            outcome = "accepted",
            "job accepted"
        );
        Ok(SubmitOutcome::accepted(&key, task_id))
    }

    async fn enqueue_claimed(
        &self,
        keys: &JobKeys,
        envelope: TaskEnvelope,
    ) -> Result<TaskId, ErrandError> {
        // 前回の失敗記録は新しい試行で上書きされる
        self.store.delete(&keys.failed).await?;
        Ok(self.queue.enqueue(envelope).await?)
    }

    async fn cached(&self, keys: &JobKeys) -> Result<Option<Value>, ErrandError> {
        match self.store.get(&keys.done).await? {
            Some(done) => Ok(Some(serde_json::from_str(&done)?)),
            None => Ok(None),
        }
    }

    /// Drop the inflight claim if it is still ours.
    async fn release_claim(&self, keys: &JobKeys, owner: &str, correlation_id: &CorrelationId) {
        if let Err(err) = self.store.delete_if_equals(&keys.inflight, owner).await {
            tracing::warn!(
                correlation_id = %correlation_id,
                inflight = %keys.inflight,
                error = %err,
                "failed to release inflight claim, it will expire on its ttl"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobResult;
    use crate::impls::{InMemoryKeyStore, InMemoryTaskQueue};
    use crate::ports::{QueueError, StoreError, SystemClock, UlidGenerator};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TTL: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: Arc<InMemoryKeyStore>,
        queue: Arc<InMemoryTaskQueue>,
        dispatcher: JobDispatcher,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryKeyStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let dispatcher = JobDispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            TaskType::new("reports.generate.v1"),
            TTL,
        );
        Fixture {
            store,
            queue,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn first_submit_is_accepted_and_enqueued() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .submit("k1", json!({"month": "2025-11"}), Some(CorrelationId::new("req-1")))
            .await
            .unwrap();

        let SubmitOutcome::Accepted { poll, task_id } = outcome else {
            panic!("expected Accepted, got {outcome:?}");
        };
        assert_eq!(poll, "/jobs/k1");

        let queued = f.queue.snapshot().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].task_id(), task_id);
        assert_eq!(queued[0].correlation_id().as_str(), "req-1");
        assert_eq!(queued[0].payload(), &json!({"month": "2025-11"}));

        assert_eq!(
            f.store.get("inflight:k1").await.unwrap(),
            Some(task_id.to_string())
        );
        assert_eq!(
            f.store.get("task:k1").await.unwrap(),
            Some(task_id.to_string())
        );
    }

    #[tokio::test]
    async fn second_submit_is_inflight_without_enqueue() {
        let f = fixture();
        f.dispatcher.submit("k1", json!({}), None).await.unwrap();
        let outcome = f.dispatcher.submit("k1", json!({}), None).await.unwrap();

        assert_eq!(
            outcome,
            SubmitOutcome::Inflight {
                poll: "/jobs/k1".into()
            }
        );
        assert_eq!(f.queue.len().await, 1);
    }

    #[tokio::test]
    async fn done_result_short_circuits() {
        let f = fixture();
        let done = JobResult::new(IdempotencyKey::parse("k1").unwrap(), json!({"items": 3}));
        f.store
            .set_with_expiry("done:k1", &serde_json::to_string(&done).unwrap(), TTL)
            .await
            .unwrap();

        let outcome = f.dispatcher.submit("k1", json!({}), None).await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Cached(json!({"status": "done", "key": "k1", "result": {"items": 3}}))
        );
        assert!(f.queue.is_empty().await);
        assert_eq!(f.store.get("inflight:k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_key_touches_nothing() {
        let f = fixture();
        let err = f.dispatcher.submit("", json!({}), None).await.unwrap_err();
        assert!(matches!(err, ErrandError::EmptyKey));
        assert!(f.store.keys().await.is_empty());
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn fresh_claim_clears_stale_failure() {
        let f = fixture();
        f.store
            .set_with_expiry("failed:k1", r#"{"status":"failed"}"#, TTL)
            .await
            .unwrap();

        f.dispatcher.submit("k1", json!({}), None).await.unwrap();
        assert_eq!(f.store.get("failed:k1").await.unwrap(), None);
    }

    struct BrokenQueue;

    #[async_trait]
    impl TaskQueue for BrokenQueue {
        async fn enqueue(&self, _envelope: TaskEnvelope) -> Result<TaskId, QueueError> {
            Err(QueueError::OperationFailed("broker down".into()))
        }

        async fn dequeue(&self, _timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn enqueue_failure_releases_the_claim() {
        let store = Arc::new(InMemoryKeyStore::new());
        let dispatcher = JobDispatcher::new(
            store.clone(),
            Arc::new(BrokenQueue),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            TaskType::new("reports.generate.v1"),
            TTL,
        );

        let err = dispatcher.submit("k1", json!({}), None).await.unwrap_err();
        assert!(matches!(err, ErrandError::Queue(_)));
        assert!(err.is_infrastructure());
        assert_eq!(store.get("inflight:k1").await.unwrap(), None);
        assert_eq!(store.get("task:k1").await.unwrap(), None);
    }

    /// Finishes the previous run of `k1` right after the first `done:k1` read,
    /// the way a worker completing at that moment would.
    struct FinishesAfterFirstRead {
        inner: InMemoryKeyStore,
        finished: AtomicBool,
    }

    const DONE_K1: &str = r#"{"status":"done","key":"k1","result":{"items":3}}"#;

    #[async_trait]
    impl KeyStore for FinishesAfterFirstRead {
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let value = self.inner.get(key).await?;
            if key == "done:k1" && !self.finished.swap(true, Ordering::SeqCst) {
                self.inner.set_with_expiry("done:k1", DONE_K1, TTL).await?;
                self.inner.delete("inflight:k1").await?;
            }
            Ok(value)
        }

        async fn set_with_expiry(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<(), StoreError> {
            self.inner.set_with_expiry(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
            self.inner.delete_if_equals(key, expected).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
            self.inner.expire(key, ttl).await
        }
    }

    #[tokio::test]
    async fn result_written_during_claim_is_served_instead_of_rerunning() {
        let store = Arc::new(FinishesAfterFirstRead {
            inner: InMemoryKeyStore::new(),
            finished: AtomicBool::new(false),
        });
        store
            .inner
            .set_with_expiry("inflight:k1", "task-previous", TTL)
            .await
            .unwrap();
        let queue = Arc::new(InMemoryTaskQueue::new());
        let dispatcher = JobDispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            TaskType::new("reports.generate.v1"),
            TTL,
        );

        let outcome = dispatcher.submit("k1", json!({}), None).await.unwrap();

        assert_eq!(
            outcome,
            SubmitOutcome::Cached(json!({"status": "done", "key": "k1", "result": {"items": 3}}))
        );
        assert!(queue.is_empty().await);
        assert_eq!(store.inner.get("inflight:k1").await.unwrap(), None);
        assert_eq!(store.inner.get("done:k1").await.unwrap().as_deref(), Some(DONE_K1));
    }

    #[tokio::test]
    async fn release_does_not_touch_a_claim_taken_by_someone_else() {
        let f = fixture();
        f.store
            .set_with_expiry("inflight:k1", "task-other", TTL)
            .await
            .unwrap();

        let keys = IdempotencyKey::parse("k1").unwrap().keys();
        f.dispatcher
            .release_claim(&keys, "task-mine", &CorrelationId::new("req"))
            .await;
        assert_eq!(
            f.store.get("inflight:k1").await.unwrap().as_deref(),
            Some("task-other")
        );
    }
}
