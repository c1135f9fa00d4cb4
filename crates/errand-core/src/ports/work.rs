//! UnitOfWork port - 実際の処理（レポート生成など）の抽象化
//!
//! runner は同じタスクを何度でも再実行します。実装側は再実行に安全であること
//! （`done` が書かれる前に呼び出し元から見える副作用を残さないこと）が前提です。

use async_trait::async_trait;

use crate::domain::{CorrelationId, IdempotencyKey, TaskId, WorkError};

/// What a unit of work knows about the run it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkContext {
    pub task_id: TaskId,
    pub key: IdempotencyKey,
    pub correlation_id: CorrelationId,
    /// 1-indexed attempt number.
    pub attempt: u32,
}

/// UnitOfWork は JSON payload を受け取り JSON 結果を返す
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn run(
        &self,
        ctx: &WorkContext,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, WorkError>;
}
