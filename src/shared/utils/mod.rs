pub mod backoff;
pub mod connection;
pub mod logger;
