//! Queue-backed ingestion engine for sports data.
//!
//! Background workers claim typed jobs from a per-family queue, dispatch them
//! to registered handlers under a deadline and retry policy, and keep the
//! read cache coherent through dependency-graph-driven invalidation.

pub mod modules;
pub mod shared;

pub use shared::errors::{AppError, AppResult};
