//! Resume capability for relay runs
//!
//! Provides the durable watermark (checkpoint) that marks the exclusive start
//! of the next run's query window, persisted with atomic writes.

pub mod checkpoint;
pub mod store;

pub use checkpoint::Checkpoint;
pub use store::{CheckpointStore, ResumeError, MAX_CHECKPOINT_FILE_SIZE};
