//! Durable render job queue.
//!
//! The queue is the exclusive gateway to the job store: producers enqueue,
//! workers claim, and every state transition flows through the [`JobStore`]
//! trait. Two implementations are provided:
//!
//! - [`PgJobStore`]: Postgres-backed, using a locking read that skips locked
//!   rows so concurrent workers partition the pending set with no duplicate
//!   delivery and no lock waits.
//! - [`MemoryJobStore`]: in-process store with the identical contract, for
//!   tests and single-node deployments.
//!
//! The store handle is constructed once at process start and passed by
//! reference; there is no global queue instance.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobStore;
pub use postgres::{connect_pool, PgJobStore};
pub use store::{JobStore, QueueStats};
