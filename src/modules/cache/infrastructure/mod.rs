pub mod memory_cache;
pub mod redis_cache;

pub use memory_cache::MemoryCacheStore;
pub use redis_cache::RedisCacheStore;
