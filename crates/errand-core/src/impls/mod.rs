//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryKeyStore**: 開発用・テスト用の KeyStore（単一プロセス）
//! - **InMemoryTaskQueue**: 開発用・テスト用の TaskQueue
//! - **MonthlyReport**: レポート生成のスタブ（一定時間待って固定の結果を返す）
//!
//! # 本番用実装（`redis` feature）
//! - **RedisKeyStore**: `SET NX EX` による共有ストア
//! - **RedisTaskQueue**: list + `LPUSH` / `BRPOP` による配送キュー

pub mod inmem_queue;
pub mod inmem_store;
pub mod report;

#[cfg(feature = "redis")]
pub mod redis_queue;
#[cfg(feature = "redis")]
pub mod redis_store;

/// Default Redis list name, one list per task family.
pub const DEFAULT_QUEUE: &str = "errand:queue:reports";

// 主要な型を再エクスポート
pub use self::inmem_queue::InMemoryTaskQueue;
pub use self::inmem_store::InMemoryKeyStore;
pub use self::report::{MonthlyReport, ReportRequest, ReportSummary};

#[cfg(feature = "redis")]
pub use self::redis_queue::RedisTaskQueue;
#[cfg(feature = "redis")]
pub use self::redis_store::RedisKeyStore;
