//! WorkRegistry - task_type と UnitOfWork の対応表
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権
//!
//! 初期化時に組み立て（mutable）、実行時は読み取り専用で共有します。

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::TaskType;
use crate::error::ErrandError;
use crate::ports::UnitOfWork;
use crate::typed::{Handler, Task, TypedHandler};

/// WorkRegistry は task_type ごとに UnitOfWork を 1 つ保持する
///
/// # 使用例
/// ```ignore
/// let mut registry = WorkRegistry::new();
/// registry.register_typed::<ReportRequest, _>(MonthlyReport::default())?;
///
/// let work = registry.get(&TaskType::new("reports.generate.v1"));
/// ```
#[derive(Default, Clone)]
pub struct WorkRegistry {
    works: HashMap<TaskType, Arc<dyn UnitOfWork>>,
}

impl WorkRegistry {
    pub fn new() -> Self {
        Self {
            works: HashMap::new(),
        }
    }

    /// Register an untyped unit of work. Registering the same task type twice is an error.
    pub fn register(
        &mut self,
        task_type: TaskType,
        work: Arc<dyn UnitOfWork>,
    ) -> Result<(), ErrandError> {
        if self.works.contains_key(&task_type) {
            return Err(ErrandError::DuplicateWork(task_type));
        }
        self.works.insert(task_type, work);
        Ok(())
    }

    /// Register a typed handler under `T::TYPE`.
    pub fn register_typed<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), ErrandError> {
        self.register(
            TaskType::new(T::TYPE),
            Arc::new(TypedHandler::<T, H>::new(handler)),
        )
    }

    pub fn get(&self, task_type: &TaskType) -> Option<Arc<dyn UnitOfWork>> {
        self.works.get(task_type).cloned()
    }

    pub fn resolve(&self, task_type: &TaskType) -> Result<Arc<dyn UnitOfWork>, ErrandError> {
        self.get(task_type)
            .ok_or_else(|| ErrandError::WorkNotFound(task_type.clone()))
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.works.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.works.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    pub fn len(&self) -> usize {
        self.works.len()
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{MonthlyReport, ReportRequest};
    use std::time::Duration;

    #[test]
    fn register_then_resolve() {
        let mut registry = WorkRegistry::new();
        registry
            .register_typed::<ReportRequest, _>(MonthlyReport::new(Duration::ZERO))
            .unwrap();

        assert!(registry.resolve(&TaskType::new(ReportRequest::TYPE)).is_ok());
        assert_eq!(
            registry.registered_types(),
            vec![TaskType::new("reports.generate.v1")]
        );
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = WorkRegistry::new();
        registry
            .register_typed::<ReportRequest, _>(MonthlyReport::default())
            .unwrap();
        let err = registry
            .register_typed::<ReportRequest, _>(MonthlyReport::default())
            .unwrap_err();
        assert!(matches!(err, ErrandError::DuplicateWork(t) if t.as_str() == ReportRequest::TYPE));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_task_type_is_work_not_found() {
        let registry = WorkRegistry::new();
        let err = match registry.resolve(&TaskType::new("missing.v1")) {
            Err(e) => e,
            Ok(_) => panic!("expected WorkNotFound"),
        };
        assert!(err.to_string().contains("missing.v1"));
        assert!(registry.is_empty());
    }
}
