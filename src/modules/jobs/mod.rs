/// Background job processing
///
/// Typed jobs flow producer-side through the `QueueAdapter` into a
/// `QueueTransport` (Redis or in-memory), and consumer-side through the
/// `WorkerLifecycleManager`, which claims jobs and hands them to the
/// `JobDispatcher` routing table.
pub mod dispatcher;
pub mod domain;
pub mod infrastructure;
pub mod queue;
pub mod worker;

pub use dispatcher::{DispatchOutcome, JobDispatcher, JobHandler, JobRoute};
pub use domain::entities::{
    CleanupPayload, Job, JobEnvelope, JobFamily, JobOperation, JobRecord, JobStatus, SyncPayload,
};
pub use domain::transport::{QueueCounts, QueueTransport, TransportEvent};
pub use infrastructure::{MemoryQueueTransport, RedisQueueTransport};
pub use queue::QueueAdapter;
pub use worker::{WorkerLifecycleManager, WorkerState, WorkerStatistics};
