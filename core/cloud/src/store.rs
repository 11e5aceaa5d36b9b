//! Storage collaborator boundary.
//!
//! The subsystem never owns persistence. The application's storage layer
//! implements [`ConnectionStore`]; everything here goes through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use paperbase_common::{CloudSyncedFile, FileSyncStatus, Result, SyncStatus};

/// Credential fields written back after a token refresh.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub token_expires_at: DateTime<Utc>,
}

/// Connection sync-state fields written by the sync engine.
///
/// `last_sync_at` is only touched when `Some`; `sync_error` is stored as
/// given, so `None` clears a previous message.
#[derive(Debug, Clone)]
pub struct SyncStatusUpdate {
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
}

/// A synced-file record not yet persisted.
#[derive(Debug, Clone)]
pub struct NewSyncedFile {
    pub connection_id: i64,
    pub project_id: i64,
    pub cloud_file_id: String,
    pub cloud_path: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size: u64,
    pub cloud_modified_at: Option<DateTime<Utc>>,
    pub sync_status: FileSyncStatus,
}

/// Metadata fields rewritten when a remote file moved forward.
#[derive(Debug, Clone)]
pub struct SyncedFileUpdate {
    pub name: String,
    pub mime_type: Option<String>,
    pub size: u64,
    pub cloud_modified_at: Option<DateTime<Utc>>,
    pub sync_status: FileSyncStatus,
}

/// Persistence layer behind the subsystem.
///
/// [`crate::memory::MemoryStore`] provides an in-memory stand-in for tests.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Persist refreshed credentials onto a connection record.
    async fn update_connection_tokens(&self, connection_id: i64, update: TokenUpdate)
        -> Result<()>;

    /// Persist connection-level sync state.
    async fn update_connection_sync_status(
        &self,
        connection_id: i64,
        update: SyncStatusUpdate,
    ) -> Result<()>;

    /// Look up the tracked record for a remote file, if any.
    async fn get_synced_file_by_cloud_id(
        &self,
        connection_id: i64,
        cloud_file_id: &str,
    ) -> Result<Option<CloudSyncedFile>>;

    /// Create a tracked record for a newly observed remote file.
    async fn create_synced_file(&self, record: NewSyncedFile) -> Result<CloudSyncedFile>;

    /// Rewrite the metadata of an existing tracked record.
    async fn update_synced_file(&self, id: i64, update: SyncedFileUpdate) -> Result<()>;
}
