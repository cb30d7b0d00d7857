//! Job queue.
//!
//! ## Components
//!
//! - `Job`: a submitted value map with its owner and lifecycle status
//! - `JobStore`: persistence and the atomic claim (in-memory or SQLite)
//! - `WorkerPool`: workers that claim queued jobs and run the `JobAction`

pub mod pool;
pub mod sqlite;
pub mod store;
pub mod types;

pub use pool::{JobAction, PoolStats, WorkerPool, WorkerPoolConfig, WorkerPoolHandle};
pub use sqlite::SqliteJobStore;
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{InvalidTransition, Job, JobOutcome, JobStatus, ValueMap};
