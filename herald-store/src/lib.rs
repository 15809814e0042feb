//! Persisted queue of outbound campaign emails.
//!
//! This crate owns the queue item model, its status state machine, and the
//! [`QueueStore`] contract the delivery dispatcher schedules against. The
//! in-memory implementation is the default backing store; anything that can
//! honor the trait (a database table, a KV namespace) can replace it.

pub mod error;
pub mod item;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError, ValidationError};
pub use item::{NewQueueItem, QueueItem, QueueStats, QueueStatus};
pub use memory::MemoryQueueStore;
pub use store::QueueStore;
