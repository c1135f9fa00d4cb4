//! TaskQueue port - バックグラウンド実行チャネル（Redis または InMemory）
//!
//! dispatcher が enqueue し、worker が dequeue します。
//! 特定のタスクキュー・フレームワークには依存しません。
//!
//! # 実装
//! - `InMemoryTaskQueue`: 開発・テスト用
//! - `RedisTaskQueue`: 本番用（`redis` feature, LPUSH/BRPOP）

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{TaskEnvelope, TaskId};

/// TaskQueue は TaskEnvelope を worker に配送するキュー
///
/// # 設計原則
/// - 順序保証は不要（同じ key のタスクは dispatcher 側で最大 1 件に絞られる）
/// - dequeue は timeout 付きの blocking pop。`Ok(None)` は「いまは何もない」
/// - リトライはキューではなく runner が行う
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Hand the envelope to the workers. Returns the id the task is known by.
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<TaskId, QueueError>;

    /// Wait up to `timeout` for the next envelope.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    OperationFailed(String),

    #[error("envelope codec: {0}")]
    Codec(#[from] serde_json::Error),
}
