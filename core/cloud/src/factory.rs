//! Selects and constructs the provider client for a connection.

use std::sync::Arc;

use paperbase_common::{CloudStorageConnection, Result};

use crate::client::CloudClient;
use crate::dropbox::DropboxClient;
use crate::gdrive::GoogleDriveClient;
use crate::onedrive::OneDriveClient;
use crate::registry::{ProviderKind, ProviderRegistry};
use crate::store::ConnectionStore;

/// Anything that can hand out a provider client for a connection.
///
/// The sync engine depends on this seam rather than on the concrete factory
/// so tests can substitute scripted clients.
pub trait ClientProvider: Send + Sync {
    fn client_for(&self, connection: CloudStorageConnection) -> Result<Box<dyn CloudClient>>;
}

/// Constructs the concrete client matching a connection's provider.
///
/// Pure dispatch: no I/O, and credential resolution stays lazy until a
/// token exchange or refresh actually happens.
pub struct ClientFactory {
    registry: ProviderRegistry,
    store: Arc<dyn ConnectionStore>,
}

impl ClientFactory {
    pub fn new(registry: ProviderRegistry, store: Arc<dyn ConnectionStore>) -> Self {
        Self { registry, store }
    }
}

impl ClientProvider for ClientFactory {
    fn client_for(&self, connection: CloudStorageConnection) -> Result<Box<dyn CloudClient>> {
        let config = self.registry.get(&connection.provider)?.clone();

        Ok(match config.kind {
            ProviderKind::GoogleDrive => {
                Box::new(GoogleDriveClient::new(config, connection, self.store.clone()))
            }
            ProviderKind::OneDrive => {
                Box::new(OneDriveClient::new(config, connection, self.store.clone()))
            }
            ProviderKind::Dropbox => {
                Box::new(DropboxClient::new(config, connection, self.store.clone()))
            }
        })
    }
}
