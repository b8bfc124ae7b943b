pub mod ingest;
pub mod pipeline;
pub mod scheduler;

pub use ingest::{FetchError, FetchedHistory, Ingestor};
pub use pipeline::{priced_markets, Pipeline, Snapshot};
pub use scheduler::{
    RefreshError, RefreshScheduler, RefreshState, RefreshTrigger, SchedulerStatus, SnapshotReader,
};
