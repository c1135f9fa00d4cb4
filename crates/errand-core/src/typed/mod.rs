//! Typed - 型付き Task API
//!
//! このモジュールは payload の decode を一か所にまとめ、
//! task_type と Handler の対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `ports::UnitOfWork` trait - object-safe, type erasure

pub mod handler;
pub mod task;

// 主要な trait/型 を再エクスポート
pub use self::handler::{Handler, TypedHandler};
pub use self::task::Task;
