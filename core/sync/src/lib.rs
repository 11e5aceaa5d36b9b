//! Paperbase Sync Engine
//!
//! This crate orchestrates metadata sync passes over cloud connections:
//! - One pass per connection: list remote files, diff against tracked
//!   records, reconcile additions and updates
//! - Per-file failure isolation: a bad file never aborts the batch
//! - Linear connection status transitions with a process-local guard
//!   against concurrent passes
//! - Bounded retry for transient network failures on the listing call

pub mod engine;
pub mod retry;

pub use engine::{SyncEngine, SyncOutcome};
pub use retry::{retry_with_config, RetryConfig};
