//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`) と Associated Types (`type Output`)
//! - Trait bounds の組み合わせ (DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task は task_type と payload の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Deserialize)]
/// struct ReportRequest {
///     month: serde_json::Value,
/// }
///
/// impl Task for ReportRequest {
///     const TYPE: &'static str = "reports.generate.v1";
///     type Output = ReportSummary;
/// }
/// ```
///
/// # Trait Bounds
/// - `DeserializeOwned`: キューから取り出した JSON payload を復元するため
/// - `Send + Sync + 'static`: worker タスクをまたいで持ち回るため
pub trait Task: DeserializeOwned + Send + Sync + 'static {
    /// task_type の定義
    ///
    /// # 命名規約
    /// - `{domain}.{action}.v{major}`
    /// - 例: `reports.generate.v1`
    const TYPE: &'static str;

    /// `done:<key>` の `result` に入る値
    type Output: Serialize + Send;
}
