/// Cache store module
///
/// Key-value operations with TTL over the shared Redis connection, plus an
/// in-memory implementation for tests and embedded deployments. Holds no
/// business logic; invalidation policy lives in `modules::invalidation`.
pub mod domain;
pub mod infrastructure;

pub use domain::{CacheKeys, CacheStore, DomainType};
pub use infrastructure::{MemoryCacheStore, RedisCacheStore};
