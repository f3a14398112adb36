pub mod keys;
pub mod repository;

pub use keys::{CacheKeys, DomainType};
pub use repository::CacheStore;
