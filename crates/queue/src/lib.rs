//! `queue` crate: runs executions as detached background jobs.
//!
//! [`WorkerPool::trigger`] creates the `PENDING` record and hands the job to
//! a fixed set of workers over a bounded channel; callers are acknowledged
//! as soon as the record exists.

pub mod error;
pub mod job;
pub mod pool;

pub use error::QueueError;
pub use job::Ticket;
pub use pool::{PoolConfig, WorkerPool};
