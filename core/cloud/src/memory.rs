//! In-memory connection store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use paperbase_common::{CloudStorageConnection, CloudSyncedFile, Error, Result};

use crate::store::{ConnectionStore, NewSyncedFile, SyncStatusUpdate, SyncedFileUpdate, TokenUpdate};

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<i64, CloudStorageConnection>,
    synced_files: Vec<CloudSyncedFile>,
    next_file_id: i64,
}

/// In-memory connection store.
///
/// Useful for testing and development. All data is stored in memory and
/// lost on drop. Updates against unknown connection ids fail like a real
/// store would.
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                next_file_id: 1,
                ..Inner::default()
            })),
        }
    }

    /// Seed a connection record.
    pub fn insert_connection(&self, connection: CloudStorageConnection) {
        self.inner
            .write()
            .unwrap()
            .connections
            .insert(connection.id, connection);
    }

    /// Current state of a connection record.
    pub fn connection(&self, id: i64) -> Option<CloudStorageConnection> {
        self.inner.read().unwrap().connections.get(&id).cloned()
    }

    /// Snapshot of every tracked file record.
    pub fn synced_files(&self) -> Vec<CloudSyncedFile> {
        self.inner.read().unwrap().synced_files.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn update_connection_tokens(
        &self,
        connection_id: i64,
        update: TokenUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let connection = inner
            .connections
            .get_mut(&connection_id)
            .ok_or_else(|| Error::Storage(format!("Connection {} not found", connection_id)))?;

        connection.access_token = Some(update.access_token);
        connection.token_expires_at = Some(update.token_expires_at);
        Ok(())
    }

    async fn update_connection_sync_status(
        &self,
        connection_id: i64,
        update: SyncStatusUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let connection = inner
            .connections
            .get_mut(&connection_id)
            .ok_or_else(|| Error::Storage(format!("Connection {} not found", connection_id)))?;

        connection.sync_status = update.sync_status;
        if let Some(last_sync_at) = update.last_sync_at {
            connection.last_sync_at = Some(last_sync_at);
        }
        connection.sync_error = update.sync_error;
        Ok(())
    }

    async fn get_synced_file_by_cloud_id(
        &self,
        connection_id: i64,
        cloud_file_id: &str,
    ) -> Result<Option<CloudSyncedFile>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .synced_files
            .iter()
            .find(|f| f.connection_id == connection_id && f.cloud_file_id == cloud_file_id)
            .cloned())
    }

    async fn create_synced_file(&self, record: NewSyncedFile) -> Result<CloudSyncedFile> {
        let mut inner = self.inner.write().unwrap();

        // Same uniqueness guarantee a database constraint would give.
        if inner
            .synced_files
            .iter()
            .any(|f| f.connection_id == record.connection_id && f.cloud_file_id == record.cloud_file_id)
        {
            return Err(Error::Storage(format!(
                "Synced file already exists for cloud id {}",
                record.cloud_file_id
            )));
        }

        let id = inner.next_file_id;
        inner.next_file_id += 1;

        let file = CloudSyncedFile {
            id,
            connection_id: record.connection_id,
            project_id: record.project_id,
            cloud_file_id: record.cloud_file_id,
            cloud_path: record.cloud_path,
            name: record.name,
            mime_type: record.mime_type,
            size: record.size,
            cloud_modified_at: record.cloud_modified_at,
            sync_status: record.sync_status,
        };

        inner.synced_files.push(file.clone());
        Ok(file)
    }

    async fn update_synced_file(&self, id: i64, update: SyncedFileUpdate) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let file = inner
            .synced_files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::Storage(format!("Synced file {} not found", id)))?;

        file.name = update.name;
        file.mime_type = update.mime_type;
        file.size = update.size;
        file.cloud_modified_at = update.cloud_modified_at;
        file.sync_status = update.sync_status;
        Ok(())
    }
}
