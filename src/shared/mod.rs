// Shared kernel: configuration, error types and utilities used by every module.

pub mod config;
pub mod errors;
pub mod utils;

pub use config::{load_env, RedisConfig, RetryPolicy, WorkerConfig};
pub use errors::{AppError, AppResult};
