pub mod entities;
pub mod transport;

pub use entities::{
    CleanupPayload, Job, JobEnvelope, JobFamily, JobOperation, JobRecord, JobStatus, SyncPayload,
};
pub use transport::{QueueCounts, QueueTransport, TransportEvent};
