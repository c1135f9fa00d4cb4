//! KeyStore port - TTL 付きの共有 key/value ストア（Redis または InMemory）
//!
//! dispatcher と worker は別プロセスなので、調整はすべてこのストア経由で行います。
//! プロセス内ロックには頼りません。
//!
//! # 実装
//! - `InMemoryKeyStore`: 開発・テスト用（単一プロセス）
//! - `RedisKeyStore`: 本番用（`redis` feature）

use std::time::Duration;

use async_trait::async_trait;

/// KeyStore は文字列値と TTL を持つ共有ストア
///
/// # 設計原則
/// - `set_if_absent` は必ずストア側の単一アトミック操作で実装する
///   （read-then-write にしない）。重複排除の保証はここに依存する
/// - このレイヤーではリトライしない。失敗は `StoreError` としてそのまま返す
/// - 期限切れのエントリは存在しないものとして扱う
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Create `key` only if it does not exist. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditional write with TTL.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete `key` only while it still holds `expected`, atomically.
    /// Returns whether the entry was removed.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Reset the TTL of an existing entry. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
}

/// StoreError はインフラエラー（ストアに到達できない、コマンド失敗）
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),
}
