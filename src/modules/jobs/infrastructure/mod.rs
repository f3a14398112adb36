pub mod memory_transport;
pub mod redis_transport;

pub use memory_transport::MemoryQueueTransport;
pub use redis_transport::RedisQueueTransport;
