//! Persisted record types shared across the cloud sync subsystem.
//!
//! These mirror the rows owned by the application's storage layer. The
//! subsystem never talks to a database directly; it reads and mutates these
//! records through the `ConnectionStore` collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection-level sync status.
///
/// Transitions are linear per connection: `Idle -> Syncing -> (Idle | Error)`.
/// A connection must never be observed as `Syncing` by two concurrent passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No pass running; the connection is ready to sync.
    Idle,
    /// A pass is in flight.
    Syncing,
    /// The last pass failed; `sync_error` carries the message.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Per-file status on a tracked record.
///
/// `Pending` signals the external content-fetch process that a (re-)download
/// is due; this subsystem only mirrors metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSyncStatus {
    /// Metadata recorded; content fetch outstanding.
    Pending,
    /// Content matches the recorded metadata.
    Synced,
    /// The content fetch failed.
    Error,
}

impl fmt::Display for FileSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSyncStatus::Pending => write!(f, "pending"),
            FileSyncStatus::Synced => write!(f, "synced"),
            FileSyncStatus::Error => write!(f, "error"),
        }
    }
}

/// One authorized link between a Paperbase organization and an external
/// cloud-storage account.
///
/// Created when a user completes the OAuth authorization flow. Credential
/// fields are mutated on token refresh; sync-state fields only by the sync
/// engine. The access token must never be used past `token_expires_at` minus
/// the 5-minute safety buffer without a refresh first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudStorageConnection {
    pub id: i64,
    /// Registry identifier, e.g. `google_drive`.
    pub provider: String,
    /// Optional folder id restricting the connection to a subtree.
    pub root_folder_id: Option<String>,
    /// Short-lived bearer token. `None` means the connection is unusable.
    pub access_token: Option<String>,
    /// Long-lived token for refreshing access. Some providers omit it on
    /// subsequent grants.
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
}

/// Local mirror of one remote file already observed by a sync pass.
///
/// At most one record exists per `(connection_id, cloud_file_id)` pair.
/// Records are created on first observation and updated when the remote
/// timestamp moves strictly forward; they are never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSyncedFile {
    pub id: i64,
    pub connection_id: i64,
    pub project_id: i64,
    /// Provider-native file identifier.
    pub cloud_file_id: String,
    pub cloud_path: String,
    pub name: String,
    /// Dropbox reports no MIME type.
    pub mime_type: Option<String>,
    pub size: u64,
    /// Provider-side modification time as of the last observation.
    pub cloud_modified_at: Option<DateTime<Utc>>,
    pub sync_status: FileSyncStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::Syncing).unwrap(),
            "\"syncing\""
        );
        assert_eq!(
            serde_json::from_str::<SyncStatus>("\"error\"").unwrap(),
            SyncStatus::Error
        );
    }

    #[test]
    fn test_file_sync_status_display() {
        assert_eq!(FileSyncStatus::Pending.to_string(), "pending");
        assert_eq!(SyncStatus::Idle.to_string(), "idle");
    }

    #[test]
    fn test_connection_serialization() {
        let connection = CloudStorageConnection {
            id: 7,
            provider: "dropbox".to_string(),
            root_folder_id: None,
            access_token: Some("at".to_string()),
            refresh_token: None,
            token_expires_at: Some(Utc::now()),
            sync_status: SyncStatus::Idle,
            last_sync_at: None,
            sync_error: None,
        };

        let json = serde_json::to_string(&connection).unwrap();
        let deserialized: CloudStorageConnection = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id, connection.id);
        assert_eq!(deserialized.provider, connection.provider);
        assert_eq!(deserialized.sync_status, SyncStatus::Idle);
    }
}
