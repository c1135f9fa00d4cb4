//! errand-core
//!
//! Idempotent asynchronous job submission: a submitter claims an idempotency
//! key in a shared key/value store, a background worker runs the job with
//! retries and caches the result under the same key.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（key, ids, envelope, status, retry, state, errors）
//! - **ports**: 抽象化レイヤー（KeyStore, TaskQueue, Clock, IdGenerator, UnitOfWork）
//! - **app**: アプリケーションロジック（builder, dispatcher, runner, status, worker_loop）
//! - **typed**: 型付き Task API（Task trait, Handler trait）
//! - **impls**: 実装（InMemory*, Redis*, MonthlyReport）
//! - **error**: クレート共通のエラー型
//! - **observability**: tracing の初期化

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use crate::error::ErrandError;
