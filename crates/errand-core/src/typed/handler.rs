//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (UnitOfWork)
//! - Type erasure パターン (TypedHandler<T, H> → dyn UnitOfWork)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::Task;
use crate::domain::WorkError;
use crate::ports::{UnitOfWork, WorkContext};

/// Handler は型付きの Task を実行して `T::Output` を返す
///
/// # ジェネリクスによる型安全性
/// - `Handler<ReportRequest>` は `ReportRequest` しか受け取れない
/// - payload の decode は TypedHandler が一度だけ行う
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, ctx: &WorkContext, task: T) -> Result<T::Output, WorkError>;
}

/// TypedHandler は Handler<T> を object-safe な UnitOfWork に変換する
///
/// decode に失敗した payload は何度やり直しても失敗するので `WorkError::Permanent` にする。
pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> UnitOfWork for TypedHandler<T, H> {
    async fn run(
        &self,
        ctx: &WorkContext,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, WorkError> {
        let task: T = serde_json::from_value(payload.clone())
            .map_err(|e| WorkError::permanent(format!("json decode: {e}")))?;
        let output = self.handler.handle(ctx, task).await?;
        serde_json::to_value(output).map_err(|e| WorkError::permanent(format!("json encode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CorrelationId, IdempotencyKey, TaskId};
    use serde::Deserialize;
    use serde_json::json;
    use ulid::Ulid;

    #[derive(Debug, Deserialize)]
    struct Add {
        a: i64,
        b: i64,
    }

    impl Task for Add {
        const TYPE: &'static str = "test.add.v1";
        type Output = i64;
    }

    struct AddHandler;

    #[async_trait]
    impl Handler<Add> for AddHandler {
        async fn handle(&self, _ctx: &WorkContext, task: Add) -> Result<i64, WorkError> {
            Ok(task.a + task.b)
        }
    }

    fn ctx() -> WorkContext {
        WorkContext {
            task_id: TaskId::from_ulid(Ulid::new()),
            key: IdempotencyKey::parse("k1").unwrap(),
            correlation_id: CorrelationId::new("req-1"),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_and_encodes() {
        let work = TypedHandler::<Add, _>::new(AddHandler);
        let out = work.run(&ctx(), &json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(out, json!(5));
    }

    #[tokio::test]
    async fn undecodable_payload_is_permanent() {
        let work = TypedHandler::<Add, _>::new(AddHandler);
        let err = work.run(&ctx(), &json!({"a": "two"})).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message().contains("json decode"));
    }
}
