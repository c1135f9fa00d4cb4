use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::runner::TaskRunner;
use crate::ports::TaskQueue;

/// Pause after a queue error before asking again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Worker group handle.
/// - `request_shutdown()` でワーカー全体が新しいタスクを取らなくなる
///   （待機中の dequeue は最長 `poll_timeout` で戻り、取れた envelope は実行される）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers, each waiting at most `poll_timeout` per dequeue.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn TaskQueue>,
        runner: Arc<TaskRunner>,
        poll_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let r = Arc::clone(&runner);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, r, poll_timeout, &mut rx).await;
            });
            joins.push(join);
        }

        tracing::info!(workers = n, "worker group started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// In-flight executions are not cancelled; workers just stop taking new tasks.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
        tracing::info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    runner: Arc<TaskRunner>,
    poll_timeout: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        // shutdown が来ていたら、または WorkerGroup が drop されていたら抜ける
        if *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err() {
            break;
        }

        // dequeue は shutdown と競合させない。Redis の BRPOP は送った時点で
        // サーバ側で pop されるので、途中で drop すると envelope が消える。
        // poll_timeout ごとに戻ってくるので、shutdown はループ先頭で拾える。
        let envelope = match queue.dequeue(poll_timeout).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "dequeue failed");
                // ここでは何も取り出していないので、shutdown と競合させてよい
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                }
                continue;
            }
        };

        // ここから先は最後まで実行する（shutdown でも中断しない）
        let report = runner.run(envelope).await;
        tracing::debug!(
            worker_id,
            task_id = %report.task_id,
            key = %report.key,
            state = ?report.state,
            attempts = report.attempts,
            "task finished"
        );
    }
    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::options::JobOptions;
    use crate::app::registry::WorkRegistry;
    use crate::domain::{
        CorrelationId, IdempotencyKey, RetryPolicy, TaskEnvelope, TaskId, TaskType,
    };
    use crate::impls::{InMemoryKeyStore, InMemoryTaskQueue, MonthlyReport, ReportRequest};
    use crate::ports::{KeyStore, QueueError};
    use crate::typed::Task;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::{Mutex, Notify};
    use ulid::Ulid;

    fn report_envelope(key: &str) -> TaskEnvelope {
        TaskEnvelope::new(
            TaskId::from_ulid(Ulid::new()),
            TaskType::new(ReportRequest::TYPE),
            IdempotencyKey::parse(key).unwrap(),
            CorrelationId::new("req"),
            json!({}),
            Utc::now(),
        )
    }

    fn report_runner(store: Arc<InMemoryKeyStore>) -> Arc<TaskRunner> {
        let mut registry = WorkRegistry::new();
        registry
            .register_typed::<ReportRequest, _>(MonthlyReport::new(Duration::ZERO))
            .unwrap();
        Arc::new(TaskRunner::new(
            store,
            Arc::new(registry),
            RetryPolicy::default(),
            JobOptions::default(),
        ))
    }

    #[tokio::test]
    async fn workers_drain_the_queue_and_stop() {
        let store = Arc::new(InMemoryKeyStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let runner = report_runner(store.clone());

        for key in ["a", "b", "c"] {
            queue.enqueue(report_envelope(key)).await.unwrap();
        }

        let group = WorkerGroup::spawn(2, queue.clone(), runner, Duration::from_millis(20));
        assert_eq!(group.len(), 2);

        for _ in 0..100 {
            if store.get("done:c").await.unwrap().is_some()
                && store.get("done:a").await.unwrap().is_some()
                && store.get("done:b").await.unwrap().is_some()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        group.shutdown_and_join().await;

        assert!(queue.is_empty().await);
        for key in ["done:a", "done:b", "done:c"] {
            assert!(store.get(key).await.unwrap().is_some(), "{key} missing");
        }
    }

    /// Holds one envelope until `release` fires, like a blocking pop whose
    /// reply arrives late.
    struct SlowHandoff {
        envelope: Mutex<Option<TaskEnvelope>>,
        waiting: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TaskQueue for SlowHandoff {
        async fn enqueue(&self, envelope: TaskEnvelope) -> Result<TaskId, QueueError> {
            let task_id = envelope.task_id();
            *self.envelope.lock().await = Some(envelope);
            Ok(task_id)
        }

        async fn dequeue(&self, timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError> {
            let Some(envelope) = self.envelope.lock().await.take() else {
                tokio::time::sleep(timeout).await;
                return Ok(None);
            };
            self.waiting.notify_one();
            self.release.notified().await;
            Ok(Some(envelope))
        }
    }

    #[tokio::test]
    async fn envelope_popped_during_shutdown_still_runs() {
        let store = Arc::new(InMemoryKeyStore::new());
        let queue = Arc::new(SlowHandoff {
            envelope: Mutex::new(None),
            waiting: Notify::new(),
            release: Notify::new(),
        });
        queue.enqueue(report_envelope("k1")).await.unwrap();

        let group = WorkerGroup::spawn(
            1,
            queue.clone(),
            report_runner(store.clone()),
            Duration::from_millis(20),
        );
        queue.waiting.notified().await;

        group.request_shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.release.notify_one();
        group.shutdown_and_join().await;

        assert!(store.get("done:k1").await.unwrap().is_some());
    }
}
