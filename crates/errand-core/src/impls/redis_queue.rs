//! RedisTaskQueue - 本番用の配送キュー
//!
//! envelope を JSON にして Redis の list に LPUSH し、worker は BRPOP で取り出します。
//! API プロセスと worker プロセスが別々でも同じ list を共有できます。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::domain::{TaskEnvelope, TaskId};
use crate::ports::{QueueError, TaskQueue};

/// RedisTaskQueue は list ベースの TaskQueue
///
/// # 注意
/// BRPOP は接続をブロックするので、KeyStore とは別の ConnectionManager を使うこと。
#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    list: String,
}

impl RedisTaskQueue {
    pub async fn connect(redis_url: &str, list: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::OperationFailed(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::OperationFailed(e.to_string()))?;
        Ok(Self {
            conn,
            list: list.into(),
        })
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<TaskId, QueueError> {
        let body = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.list)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::OperationFailed(e.to_string()))?;
        Ok(envelope.task_id())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError> {
        let mut conn = self.conn.clone();
        // BRPOP の timeout 0 は「無期限」なので、最低 1ms にする
        let timeout_secs = timeout.as_secs_f64().max(0.001);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.list)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::OperationFailed(e.to_string()))?;

        match popped {
            Some((_list, body)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}
