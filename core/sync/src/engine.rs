//! Sync engine: one metadata pass per connection.
//!
//! A pass lists the connection's top-level remote files once, diffs them
//! against the tracked records, and reconciles additions and updates.
//! Folders are skipped, not recursed; recursive sync is a deliberate
//! non-goal of this pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use paperbase_cloud::client::CloudFile;
use paperbase_cloud::factory::ClientProvider;
use paperbase_cloud::store::{ConnectionStore, NewSyncedFile, SyncStatusUpdate, SyncedFileUpdate};
use paperbase_common::{CloudStorageConnection, Error, FileSyncStatus, Result, SyncStatus};

use crate::retry::{retry_with_config, RetryConfig};

/// Aggregate result of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Remote files observed for the first time.
    pub added: u32,
    /// Tracked records refreshed from a newer remote timestamp.
    pub updated: u32,
    /// Files whose reconciliation failed; the pass itself still completes.
    pub errors: u32,
}

/// Orchestrates sync passes over cloud connections.
pub struct SyncEngine<P: ClientProvider> {
    clients: P,
    store: Arc<dyn ConnectionStore>,
    retry: RetryConfig,
    /// Connections with a pass in flight in this process. The persisted
    /// `Syncing` flag alone cannot exclude two passes racing between its
    /// read and write.
    in_flight: Mutex<HashSet<i64>>,
}

impl<P: ClientProvider> SyncEngine<P> {
    pub fn new(clients: P, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            clients,
            store,
            retry: RetryConfig::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Override the retry policy for the remote listing call.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run one full metadata pass for `connection`.
    ///
    /// The connection's status is moved to `Syncing` before any remote call
    /// so concurrent readers observe the pass, then back to `Idle` (with
    /// `last_sync_at` stamped and the error cleared) on completion, or to
    /// `Error` with the failure message when the client cannot be built or
    /// the listing itself fails. Per-file failures are absorbed into the
    /// returned `errors` count and never abort the batch.
    ///
    /// # Errors
    /// - `Error::SyncInProgress` when a pass is already running for this
    ///   connection
    pub async fn sync_connection(
        &self,
        connection: &CloudStorageConnection,
        project_id: i64,
    ) -> Result<SyncOutcome> {
        if connection.sync_status == SyncStatus::Syncing {
            return Err(Error::SyncInProgress(connection.id));
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, connection.id)?;

        self.store
            .update_connection_sync_status(
                connection.id,
                SyncStatusUpdate {
                    sync_status: SyncStatus::Syncing,
                    last_sync_at: None,
                    sync_error: None,
                },
            )
            .await?;

        match self.run_pass(connection, project_id).await {
            Ok(outcome) => {
                self.store
                    .update_connection_sync_status(
                        connection.id,
                        SyncStatusUpdate {
                            sync_status: SyncStatus::Idle,
                            last_sync_at: Some(Utc::now()),
                            sync_error: None,
                        },
                    )
                    .await?;

                info!(
                    connection = connection.id,
                    added = outcome.added,
                    updated = outcome.updated,
                    errors = outcome.errors,
                    "Sync pass completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(status_err) = self
                    .store
                    .update_connection_sync_status(
                        connection.id,
                        SyncStatusUpdate {
                            sync_status: SyncStatus::Error,
                            last_sync_at: None,
                            sync_error: Some(err.to_string()),
                        },
                    )
                    .await
                {
                    warn!(
                        connection = connection.id,
                        "Failed to record sync error: {}", status_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_pass(
        &self,
        connection: &CloudStorageConnection,
        project_id: i64,
    ) -> Result<SyncOutcome> {
        let client = self.clients.client_for(connection.clone())?;
        let files = retry_with_config(&self.retry, || client.list_files(None)).await?;

        let mut outcome = SyncOutcome::default();

        for file in &files {
            if file.is_folder {
                continue;
            }

            match self.reconcile_file(connection.id, project_id, file).await {
                Ok(Reconciliation::Added) => outcome.added += 1,
                Ok(Reconciliation::Updated) => outcome.updated += 1,
                Ok(Reconciliation::Unchanged) => {}
                Err(err) => {
                    warn!(
                        connection = connection.id,
                        file = %file.name,
                        "Failed to reconcile file: {}",
                        err
                    );
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn reconcile_file(
        &self,
        connection_id: i64,
        project_id: i64,
        file: &CloudFile,
    ) -> Result<Reconciliation> {
        let existing = self
            .store
            .get_synced_file_by_cloud_id(connection_id, &file.id)
            .await?;

        let Some(existing) = existing else {
            self.store
                .create_synced_file(NewSyncedFile {
                    connection_id,
                    project_id,
                    cloud_file_id: file.id.clone(),
                    cloud_path: file.path.clone(),
                    name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    size: file.size,
                    cloud_modified_at: file.modified_at,
                    sync_status: FileSyncStatus::Pending,
                })
                .await?;
            return Ok(Reconciliation::Added);
        };

        // A record with no stored timestamp compares as the epoch, so any
        // remote timestamp counts as newer.
        let stored = existing.cloud_modified_at.unwrap_or(epoch());
        let remote = file.modified_at.unwrap_or(epoch());
        if remote <= stored {
            return Ok(Reconciliation::Unchanged);
        }

        self.store
            .update_synced_file(
                existing.id,
                SyncedFileUpdate {
                    name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    size: file.size,
                    cloud_modified_at: file.modified_at,
                    // Pending again: the content-fetch process owes a re-download.
                    sync_status: FileSyncStatus::Pending,
                },
            )
            .await?;
        Ok(Reconciliation::Updated)
    }
}

enum Reconciliation {
    Added,
    Updated,
    Unchanged,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Process-local exclusion of concurrent passes per connection.
///
/// Releases on drop, so every exit path of a pass frees the connection.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<i64>>,
    connection_id: i64,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<i64>>, connection_id: i64) -> Result<Self> {
        let mut in_flight = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(connection_id) {
            return Err(Error::SyncInProgress(connection_id));
        }
        Ok(Self { set, connection_id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.set.lock() {
            in_flight.remove(&self.connection_id);
        }
    }
}
