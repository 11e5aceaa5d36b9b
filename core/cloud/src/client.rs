//! Provider client contract and shared token-validity logic.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use paperbase_common::{CloudStorageConnection, Error, Result};

use crate::oauth::TokenSet;
use crate::store::{ConnectionStore, TokenUpdate};

/// Proactive refresh margin before the recorded token expiry.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// Request timeout applied to every provider HTTP call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = "Paperbase/0.1";

/// Normalized view of one remote file or folder.
///
/// Produced fresh on every listing or metadata call; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudFile {
    /// Provider-native identifier.
    pub id: String,
    pub name: String,
    /// Dropbox reports no MIME type.
    pub mime_type: Option<String>,
    /// Size in bytes; 0 when the provider omits it.
    pub size: u64,
    /// Display path from the provider root.
    pub path: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub is_folder: bool,
    /// Ephemeral direct-download URL where the vendor supplies one (OneDrive).
    pub download_url: Option<String>,
}

/// Account identity used to label a connection for the end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

/// Common contract over the vendor APIs.
///
/// Every method ensures a valid access token first; callers never reason
/// about expiry themselves.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Registry id of the provider behind this client.
    fn provider_id(&self) -> &str;

    /// List the immediate children of `folder_id`, of the connection's
    /// configured root folder, or of the provider root, in that order of
    /// preference. Returns an empty vec, never an error, for a folder
    /// without children.
    async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<CloudFile>>;

    /// Fetch raw file content.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Fetch normalized metadata for a single file.
    async fn file_metadata(&self, file_id: &str) -> Result<CloudFile>;

    /// Fetch the account identity behind the connection.
    async fn user_info(&self) -> Result<UserInfo>;

    /// Exchange the stored refresh token for a new access token.
    ///
    /// # Errors
    /// - `Error::NoRefreshToken` when the connection has none; the
    ///   connection is then unrecoverable without re-authorization
    async fn refresh_access_token(&self) -> Result<TokenSet>;
}

/// Check whether a token with the given expiry needs a proactive refresh.
///
/// `None` means the provider reported no expiry; the token is used as-is.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - now < Duration::seconds(EXPIRY_BUFFER_SECS),
        None => false,
    }
}

/// Connection state shared between a client and the storage collaborator.
///
/// The mutex serializes token refreshes per connection; refreshing twice in
/// parallel invalidates the first new token with some vendors.
pub struct ConnectionHandle {
    connection: Mutex<CloudStorageConnection>,
    store: Arc<dyn ConnectionStore>,
}

impl ConnectionHandle {
    pub fn new(connection: CloudStorageConnection, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            connection: Mutex::new(connection),
            store,
        }
    }

    /// Root folder configured on the connection, if any.
    pub async fn root_folder_id(&self) -> Option<String> {
        self.connection.lock().await.root_folder_id.clone()
    }

    /// Refresh token currently stored on the connection.
    pub async fn refresh_token(&self) -> Result<String> {
        self.connection
            .lock()
            .await
            .refresh_token
            .clone()
            .ok_or(Error::NoRefreshToken)
    }

    /// Return a valid bearer token for the next API call.
    ///
    /// A connection without any access token fails immediately. When the
    /// stored expiry is inside the buffer, `refresh` is invoked with the
    /// stored refresh token and the new credentials are persisted through
    /// the storage collaborator before the token is handed out.
    pub async fn access_token<F, Fut>(&self, refresh: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenSet>>,
    {
        let mut connection = self.connection.lock().await;

        let current = connection.access_token.clone().ok_or(Error::NoAccessToken)?;
        if !needs_refresh(connection.token_expires_at, Utc::now()) {
            return Ok(current);
        }

        let refresh_token = connection
            .refresh_token
            .clone()
            .ok_or(Error::NoRefreshToken)?;

        info!(connection = connection.id, "Access token inside expiry buffer, refreshing");
        let tokens = refresh(refresh_token).await?;

        connection.access_token = Some(tokens.access_token.clone());
        connection.token_expires_at = Some(tokens.expires_at);

        self.store
            .update_connection_tokens(
                connection.id,
                TokenUpdate {
                    access_token: tokens.access_token.clone(),
                    token_expires_at: tokens.expires_at,
                },
            )
            .await?;

        Ok(tokens.access_token)
    }
}

/// HTTP client shared by every provider implementation: bounded request
/// timeout, identifying user agent.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    Error::Network(err.to_string())
}

/// Parse a provider response, mapping non-2xx statuses to `ProviderApi`
/// with the raw body preserved for diagnostics.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ProviderApi {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| Error::InvalidInput(format!("Malformed provider response: {}", e)))
}

/// Like [`read_json`] but for raw content downloads.
pub(crate) async fn read_bytes(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ProviderApi {
            status: status.as_u16(),
            body,
        });
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(transport_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use paperbase_common::SyncStatus;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn connection(
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> CloudStorageConnection {
        CloudStorageConnection {
            id: 1,
            provider: "google_drive".to_string(),
            root_folder_id: None,
            access_token: access_token.map(str::to_owned),
            refresh_token: refresh_token.map(str::to_owned),
            token_expires_at: expires_at,
            sync_status: SyncStatus::Idle,
            last_sync_at: None,
            sync_error: None,
        }
    }

    #[test]
    fn test_needs_refresh_inside_buffer() {
        let now = Utc::now();
        // 4 minutes 59 seconds left: refresh.
        assert!(needs_refresh(Some(now + Duration::seconds(299)), now));
        // 5 minutes 1 second left: no refresh.
        assert!(!needs_refresh(Some(now + Duration::seconds(301)), now));
        // Already expired: refresh.
        assert!(needs_refresh(Some(now - Duration::hours(1)), now));
        // No recorded expiry: use the token as-is.
        assert!(!needs_refresh(None, now));
    }

    proptest! {
        #[test]
        fn prop_refresh_exactly_when_inside_buffer(offset_secs in -100_000i64..100_000i64) {
            let now = Utc::now();
            let expires_at = now + Duration::seconds(offset_secs);
            prop_assert_eq!(
                needs_refresh(Some(expires_at), now),
                offset_secs < EXPIRY_BUFFER_SECS
            );
        }
    }

    #[tokio::test]
    async fn test_valid_token_is_used_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let expires_at = Utc::now() + Duration::hours(1);
        let handle = ConnectionHandle::new(
            connection(Some("current"), Some("refresh"), Some(expires_at)),
            store,
        );

        let refreshed = Arc::new(AtomicBool::new(false));
        let flag = refreshed.clone();
        let token = handle
            .access_token(|_| async move {
                flag.store(true, Ordering::SeqCst);
                Err(Error::NoRefreshToken)
            })
            .await
            .unwrap();

        assert_eq!(token, "current");
        assert!(!refreshed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let stale = connection(
            Some("stale"),
            Some("refresh-1"),
            Some(Utc::now() - Duration::minutes(10)),
        );
        store.insert_connection(stale.clone());
        let handle = ConnectionHandle::new(stale, store.clone());

        let new_expiry = Utc::now() + Duration::hours(1);
        let token = handle
            .access_token(|refresh_token| async move {
                assert_eq!(refresh_token, "refresh-1");
                Ok(TokenSet {
                    access_token: "fresh".to_string(),
                    refresh_token: None,
                    expires_at: new_expiry,
                })
            })
            .await
            .unwrap();

        assert_eq!(token, "fresh");
        let persisted = store.connection(1).unwrap();
        assert_eq!(persisted.access_token.as_deref(), Some("fresh"));
        assert_eq!(persisted.token_expires_at, Some(new_expiry));
    }

    #[tokio::test]
    async fn test_missing_access_token_fails_without_refresh() {
        let store = Arc::new(MemoryStore::new());
        let handle = ConnectionHandle::new(connection(None, Some("refresh"), None), store);

        let refreshed = Arc::new(AtomicBool::new(false));
        let flag = refreshed.clone();
        let err = handle
            .access_token(|_| async move {
                flag.store(true, Ordering::SeqCst);
                Err(Error::NoRefreshToken)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoAccessToken));
        assert!(!refreshed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_fails_before_any_call() {
        let store = Arc::new(MemoryStore::new());
        let handle = ConnectionHandle::new(
            connection(Some("stale"), None, Some(Utc::now() - Duration::minutes(1))),
            store,
        );

        let refreshed = Arc::new(AtomicBool::new(false));
        let flag = refreshed.clone();
        let err = handle
            .access_token(|_| async move {
                flag.store(true, Ordering::SeqCst);
                Err(Error::NoRefreshToken)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoRefreshToken));
        assert!(!refreshed.load(Ordering::SeqCst));
    }
}
