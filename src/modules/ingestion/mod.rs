pub mod handlers;

pub use handlers::{CleanupHandler, EntityFetcher, EntityRepository, RawEntity, SyncHandler};
