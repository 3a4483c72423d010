//! LogRelay - forwards new log lines to chat subscribers
//!
//! This library watches a single append-only log file, classifies each new
//! line by severity and fans it out to every subscriber whose threshold
//! admits it. Subscribers manage their own threshold with chat commands.

pub mod app;
pub mod classifier;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod formatting;
pub mod internal_metrics;
pub mod notification;
pub mod severity;
pub mod signal;
pub mod store;
pub mod task_manager;
pub mod watermark;

// Re-export core types for convenience
pub use core::*;
pub use error::RelayError;
