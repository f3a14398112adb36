/// Cache invalidation module
///
/// A static dependency registry describes which domain types derive from
/// which; the engine turns one changed entity into the set of cache keys to
/// clear, optionally cascading through the transitive closure.
pub mod engine;
pub mod registry;

pub use engine::{InvalidationEngine, InvalidationOutcome, InvalidationRequest};
pub use registry::{default_registry, DependencyRegistry};
