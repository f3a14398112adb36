pub mod cache;
pub mod ingestion;
pub mod invalidation;
pub mod jobs;
