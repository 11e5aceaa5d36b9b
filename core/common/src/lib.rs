//! Common utilities and types shared across the Paperbase cloud sync crates.
//!
//! This module provides the error taxonomy and the persisted record types
//! used throughout the subsystem, ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{CloudStorageConnection, CloudSyncedFile, FileSyncStatus, SyncStatus};
