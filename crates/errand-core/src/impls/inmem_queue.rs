//! InMemoryTaskQueue - 開発用の配送キュー
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による blocking pop
//! - Notify は待機者がいなくても permit を 1 つ保持するので、push と pop の競合で通知を失わない

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{TaskEnvelope, TaskId};
use crate::ports::{QueueError, TaskQueue};

/// InMemoryTaskQueue は単一プロセス用の TaskQueue
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryTaskQueue::new();
/// let task_id = queue.enqueue(envelope).await?;
/// let next = queue.dequeue(Duration::from_secs(5)).await?;
/// ```
pub struct InMemoryTaskQueue {
    ready: Mutex<VecDeque<TaskEnvelope>>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Number of envelopes waiting for a worker.
    pub async fn len(&self) -> usize {
        self.ready.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ready.lock().await.is_empty()
    }

    /// Copy of the waiting envelopes, oldest first.
    pub async fn snapshot(&self) -> Vec<TaskEnvelope> {
        self.ready.lock().await.iter().cloned().collect()
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<TaskId, QueueError> {
        let task_id = envelope.task_id();
        self.ready.lock().await.push_back(envelope);

        // ロックを離してから通知
        self.notify.notify_one();
        Ok(task_id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(envelope) = self.ready.lock().await.pop_front() {
                return Ok(Some(envelope));
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }
}
