//! MonthlyReport - レポート生成のスタブ
//!
//! 実際の集計は行わず、設定された時間だけ待ってから固定の結果を返します。
//! 何度再実行しても同じ結果になるので、runner の再試行に対して安全です。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::WorkError;
use crate::ports::WorkContext;
use crate::typed::{Handler, Task};

/// Payload of `POST /reports`.
///
/// `month` is passed through untouched; any JSON value (or none) is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub month: serde_json::Value,
}

impl Task for ReportRequest {
    const TYPE: &'static str = "reports.generate.v1";
    type Output = ReportSummary;
}

/// `{"items": 3, "month": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub items: u32,
    pub month: serde_json::Value,
}

/// Fixed-delay report stub.
#[derive(Debug, Clone)]
pub struct MonthlyReport {
    delay: Duration,
}

impl MonthlyReport {
    pub const ITEMS: u32 = 3;
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MonthlyReport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl Handler<ReportRequest> for MonthlyReport {
    async fn handle(
        &self,
        ctx: &WorkContext,
        task: ReportRequest,
    ) -> Result<ReportSummary, WorkError> {
        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            task_id = %ctx.task_id,
            key = %ctx.key,
            delay_ms = self.delay.as_millis() as u64,
            "generating report"
        );
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ReportSummary {
            items: Self::ITEMS,
            month: task.month,
        })
    }
}
