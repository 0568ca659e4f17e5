//! Pulse Check: scheduled store checks built from provider/filter/handler pipelines.

pub mod config;
pub mod context;
pub mod email;
pub mod error;
pub mod jobs;
pub mod platform;
pub mod scheduler;
pub mod server;
pub mod task;
