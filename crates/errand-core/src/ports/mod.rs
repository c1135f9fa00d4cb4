//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（Redis などの共有ストア、タスクキュー、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - KeyStore が唯一の共有可変リソース（dispatcher と worker の調整はここだけ）
//! - TaskQueue は envelope を運ぶだけで、状態は持たない
//! - クライアントはすべてコンストラクタで注入する（グローバルなシングルトンは使わない）

pub mod clock;
pub mod id_generator;
pub mod key_store;
pub mod task_queue;
pub mod work;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::key_store::{KeyStore, StoreError};
pub use self::task_queue::{QueueError, TaskQueue};
pub use self::work::{UnitOfWork, WorkContext};
