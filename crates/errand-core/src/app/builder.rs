//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 依存はすべて明示的に注入（グローバルなクライアントは持たない）

use std::sync::Arc;
use std::time::Duration;

use crate::app::dispatcher::JobDispatcher;
use crate::app::options::JobOptions;
use crate::app::registry::WorkRegistry;
use crate::app::runner::TaskRunner;
use crate::app::status::JobStatusService;
use crate::app::worker_loop::WorkerGroup;
use crate::domain::{RetryPolicy, TaskType};
use crate::error::ErrandError;
use crate::impls::ReportRequest;
use crate::ports::{Clock, IdGenerator, KeyStore, SystemClock, TaskQueue, UlidGenerator, UnitOfWork};
use crate::typed::{Handler, Task};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .store(Arc::new(InMemoryKeyStore::new()))
///     .queue(Arc::new(InMemoryTaskQueue::new()))
///     .register_typed::<ReportRequest, _>(MonthlyReport::default())?
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - store / queue が未設定なら BuildError
/// - dispatcher が投入する task_type が未登録なら BuildError::MissingWork
pub struct AppBuilder {
    store: Option<Arc<dyn KeyStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    registry: WorkRegistry,
    submit_as: TaskType,
    policy: RetryPolicy,
    options: JobOptions,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no key store configured")]
    MissingStore,

    #[error("no task queue configured")]
    MissingQueue,

    #[error("task type '{0}' is submitted but no unit of work is registered for it")]
    MissingWork(TaskType),
}

impl AppBuilder {
    /// 新しい AppBuilder を作成（投入する task_type はレポート生成）
    pub fn new() -> Self {
        Self {
            store: None,
            queue: None,
            clock: None,
            ids: None,
            registry: WorkRegistry::new(),
            submit_as: TaskType::new(ReportRequest::TYPE),
            policy: RetryPolicy::default(),
            options: JobOptions::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a `UlidGenerator` over the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn register(
        mut self,
        task_type: TaskType,
        work: Arc<dyn UnitOfWork>,
    ) -> Result<Self, ErrandError> {
        self.registry.register(task_type, work)?;
        Ok(self)
    }

    /// Handler を登録
    pub fn register_typed<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, ErrandError> {
        self.registry.register_typed::<T, H>(handler)?;
        Ok(self)
    }

    /// Task type the dispatcher stamps on envelopes.
    pub fn submit_as(mut self, task_type: TaskType) -> Self {
        self.submit_as = task_type;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn job_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    /// AppBuilder を検証して App を生成
    pub fn build(self) -> Result<App, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let queue = self.queue.ok_or(BuildError::MissingQueue)?;
        if !self.registry.contains(&self.submit_as) {
            return Err(BuildError::MissingWork(self.submit_as));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(clock.clone())),
        };

        let dispatcher = JobDispatcher::new(
            store.clone(),
            queue.clone(),
            clock,
            ids,
            self.submit_as,
            self.options.ttl,
        );
        let runner = TaskRunner::new(
            store.clone(),
            Arc::new(self.registry),
            self.policy,
            self.options,
        );
        let status = JobStatusService::new(store);

        Ok(App {
            dispatcher: Arc::new(dispatcher),
            runner: Arc::new(runner),
            status: Arc::new(status),
            queue,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は構築済みのコンポーネントをまとめたもの
///
/// API プロセスは dispatcher / status を、worker プロセスは runner を使う。
#[derive(Clone)]
pub struct App {
    dispatcher: Arc<JobDispatcher>,
    runner: Arc<TaskRunner>,
    status: Arc<JobStatusService>,
    queue: Arc<dyn TaskQueue>,
}

impl App {
    pub fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    pub fn status(&self) -> &Arc<JobStatusService> {
        &self.status
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Spawn `n` workers pulling from this app's queue.
    pub fn spawn_workers(&self, n: usize, poll_timeout: Duration) -> WorkerGroup {
        WorkerGroup::spawn(n, self.queue.clone(), self.runner.clone(), poll_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryKeyStore, InMemoryTaskQueue, MonthlyReport};

    fn with_backends() -> AppBuilder {
        AppBuilder::new()
            .store(Arc::new(InMemoryKeyStore::new()))
            .queue(Arc::new(InMemoryTaskQueue::new()))
    }

    #[test]
    fn test_build_success() {
        let app = with_backends()
            .register_typed::<ReportRequest, _>(MonthlyReport::default())
            .unwrap()
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_build_missing_work() {
        let app = with_backends().build();
        assert!(matches!(
            app,
            Err(BuildError::MissingWork(t)) if t.as_str() == ReportRequest::TYPE
        ));
    }

    #[test]
    fn test_build_missing_store() {
        let app = AppBuilder::new()
            .queue(Arc::new(InMemoryTaskQueue::new()))
            .register_typed::<ReportRequest, _>(MonthlyReport::default())
            .unwrap()
            .build();
        assert!(matches!(app, Err(BuildError::MissingStore)));
    }

    #[test]
    fn test_duplicate_registration() {
        let result = with_backends()
            .register_typed::<ReportRequest, _>(MonthlyReport::default())
            .unwrap()
            .register_typed::<ReportRequest, _>(MonthlyReport::default());
        assert!(matches!(result, Err(ErrandError::DuplicateWork(_))));
    }
}
