//! errand-cli
//!
//! Process wiring for the `errand` binary: settings, the HTTP boundary, and
//! the choice between in-memory and Redis backends.

pub mod config;
pub mod http;
pub mod server;

pub use crate::config::{ConfigError, Role, Settings};
