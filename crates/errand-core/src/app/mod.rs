//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **JobDispatcher**: 冪等キーによる重複排除と投入（API 側）
//! - **TaskRunner**: 再試行付きの実行と結果の保存（worker 側）
//! - **JobStatusService**: 状態の問い合わせ（読み取り専用）
//! - **WorkerGroup**: TaskQueue から取り出して TaskRunner に渡すループ
//! - **WorkRegistry**: task_type → UnitOfWork

pub mod builder;
pub mod dispatcher;
pub mod options;
pub mod registry;
pub mod runner;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::dispatcher::JobDispatcher;
pub use self::options::JobOptions;
pub use self::registry::WorkRegistry;
pub use self::runner::{RunReport, TaskRunner};
pub use self::status::JobStatusService;
pub use self::worker_loop::WorkerGroup;
