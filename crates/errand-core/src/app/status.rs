//! JobStatusService - 冪等キーでジョブの状態を問い合わせる（読み取り専用）

use std::sync::Arc;

use crate::domain::{IdempotencyKey, JobStatus};
use crate::error::ErrandError;
use crate::ports::KeyStore;

/// JobStatusService は `done:` → `failed:` → `task:` の順に読む
///
/// 先に見つかったエントリで結果が決まるので、後ろのキーは読まない。
pub struct JobStatusService {
    store: Arc<dyn KeyStore>,
}

impl JobStatusService {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    pub async fn poll(&self, key: &str) -> Result<JobStatus, ErrandError> {
        let key = IdempotencyKey::parse(key)?;
        let keys = key.keys();

        let done = self.store.get(&keys.done).await?;
        let failed = match done {
            Some(_) => None,
            None => self.store.get(&keys.failed).await?,
        };
        let task = match (&done, &failed) {
            (None, None) => self.store.get(&keys.task).await?,
            _ => None,
        };

        let status = JobStatus::derive(done, failed, task)?;
        tracing::debug!(key = %key, status = status.label(), "job polled");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryKeyStore;
    use crate::ports::ManualClock;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn walks_unknown_inflight_done() {
        let store = Arc::new(InMemoryKeyStore::new());
        let service = JobStatusService::new(store.clone());

        assert_eq!(service.poll("k1").await.unwrap(), JobStatus::Unknown);

        store.set_with_expiry("task:k1", "task-01", TTL).await.unwrap();
        assert_eq!(
            service.poll("k1").await.unwrap(),
            JobStatus::Inflight {
                task_id: "task-01".into()
            }
        );

        let done = json!({"status": "done", "key": "k1", "result": {"items": 3}});
        store
            .set_with_expiry("done:k1", &done.to_string(), TTL)
            .await
            .unwrap();
        assert_eq!(service.poll("k1").await.unwrap(), JobStatus::Done(done));
    }

    #[tokio::test]
    async fn expired_result_reads_as_unknown() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryKeyStore::with_clock(clock.clone()));
        let service = JobStatusService::new(store.clone());

        store
            .set_with_expiry("done:k1", r#"{"status":"done","key":"k1","result":{}}"#, TTL)
            .await
            .unwrap();
        assert!(service.poll("k1").await.unwrap().is_terminal());

        clock.advance(TTL + Duration::from_secs(1));
        assert_eq!(service.poll("k1").await.unwrap(), JobStatus::Unknown);
    }

    #[tokio::test]
    async fn corrupt_record_is_a_codec_error() {
        let store = Arc::new(InMemoryKeyStore::new());
        store.set_with_expiry("done:k1", "not json", TTL).await.unwrap();
        let err = JobStatusService::new(store).poll("k1").await.unwrap_err();
        assert!(matches!(err, ErrandError::Codec(_)));
    }
}
