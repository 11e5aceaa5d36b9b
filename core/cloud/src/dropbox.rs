//! Dropbox provider client (API v2).
//!
//! Dropbox addresses content by path rather than opaque ids (a parallel
//! `id` field still exists), represents the root as an empty path string,
//! and is the one provider that authenticates token refresh over HTTP Basic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use paperbase_common::{CloudStorageConnection, Result};

use crate::client::{
    http_client, read_bytes, read_json, transport_error, CloudClient, CloudFile, ConnectionHandle,
    UserInfo,
};
use crate::oauth::{self, ClientCredentials, TokenSet};
use crate::registry::CloudProviderConfig;
use crate::store::ConnectionStore;

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// Dropbox entry metadata; `.tag` distinguishes files from folders.
#[derive(Debug, Deserialize)]
struct DropboxEntry {
    #[serde(rename = ".tag", default)]
    tag: String,
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    path_lower: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<DropboxEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    email: String,
    name: AccountName,
}

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

/// Dropbox client bound to one connection.
pub struct DropboxClient {
    config: CloudProviderConfig,
    handle: ConnectionHandle,
    http: Client,
}

impl DropboxClient {
    pub fn new(
        config: CloudProviderConfig,
        connection: CloudStorageConnection,
        store: Arc<dyn ConnectionStore>,
    ) -> Self {
        Self {
            config,
            handle: ConnectionHandle::new(connection, store),
            http: http_client(),
        }
    }

    async fn bearer(&self) -> Result<String> {
        self.handle
            .access_token(|refresh_token| async move {
                let credentials = ClientCredentials::from_env(&self.config)?;
                oauth::refresh_with_basic_credentials(
                    &self.http,
                    &self.config,
                    &credentials,
                    &refresh_token,
                )
                .await
            })
            .await
    }

    /// RPC-style endpoint call: JSON body in, JSON body out.
    async fn rpc<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{}/{}", API_BASE, endpoint))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response).await
    }

    fn to_cloud_file(entry: DropboxEntry) -> CloudFile {
        let is_folder = entry.tag == "folder";
        let path = entry
            .path_display
            .or(entry.path_lower)
            .unwrap_or_else(|| format!("/{}", entry.name));
        // Entries always carry an id in practice; fall back to the path,
        // which is equally addressable in this API.
        let id = entry.id.unwrap_or_else(|| path.clone());

        CloudFile {
            id,
            name: entry.name,
            mime_type: None,
            size: entry.size,
            path,
            modified_at: entry.server_modified,
            is_folder,
            download_url: None,
        }
    }
}

#[async_trait]
impl CloudClient for DropboxClient {
    fn provider_id(&self) -> &str {
        self.config.id
    }

    async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<CloudFile>> {
        let root = self.handle.root_folder_id().await;
        // Root is the empty string, not the literal word "root".
        let path = folder_id.map(str::to_owned).or(root).unwrap_or_default();

        let mut page: ListFolderResponse = self
            .rpc(
                "files/list_folder",
                serde_json::json!({ "path": path, "recursive": false }),
            )
            .await?;

        let mut entries = page.entries;
        while page.has_more {
            page = self
                .rpc(
                    "files/list_folder/continue",
                    serde_json::json!({ "cursor": page.cursor }),
                )
                .await?;
            entries.extend(page.entries.drain(..));
        }

        Ok(entries.into_iter().map(Self::to_cloud_file).collect())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.bearer().await?;
        // Content endpoints take their argument in a header, not the body.
        let arg = serde_json::json!({ "path": file_id }).to_string();

        let response = self
            .http
            .post(format!("{}/files/download", CONTENT_BASE))
            .bearer_auth(&token)
            .header("Dropbox-API-Arg", arg)
            .send()
            .await
            .map_err(transport_error)?;

        read_bytes(response).await
    }

    async fn file_metadata(&self, file_id: &str) -> Result<CloudFile> {
        let entry: DropboxEntry = self
            .rpc(
                "files/get_metadata",
                serde_json::json!({ "path": file_id }),
            )
            .await?;
        Ok(Self::to_cloud_file(entry))
    }

    async fn user_info(&self) -> Result<UserInfo> {
        let account: AccountResponse = self
            .rpc("users/get_current_account", serde_json::Value::Null)
            .await?;
        Ok(UserInfo {
            email: account.email,
            name: account.name.display_name,
        })
    }

    async fn refresh_access_token(&self) -> Result<TokenSet> {
        let refresh_token = self.handle.refresh_token().await?;
        let credentials = ClientCredentials::from_env(&self.config)?;
        oauth::refresh_with_basic_credentials(&self.http, &self.config, &credentials, &refresh_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_detection_by_tag() {
        let folder: DropboxEntry = serde_json::from_str(
            r#"{".tag":"folder","name":"Projects","id":"id:f1","path_display":"/Projects"}"#,
        )
        .unwrap();
        let entry = DropboxClient::to_cloud_file(folder);
        assert!(entry.is_folder);
        assert_eq!(entry.id, "id:f1");
        assert_eq!(entry.path, "/Projects");
    }

    #[test]
    fn test_file_carries_no_mime_type_and_falls_back_to_path_id() {
        let file: DropboxEntry = serde_json::from_str(
            r#"{
                ".tag": "file",
                "name": "brief.pdf",
                "path_display": "/Projects/brief.pdf",
                "size": 90210,
                "server_modified": "2024-05-12T15:50:38Z"
            }"#,
        )
        .unwrap();

        let entry = DropboxClient::to_cloud_file(file);
        assert!(!entry.is_folder);
        assert!(entry.mime_type.is_none());
        assert_eq!(entry.size, 90210);
        assert_eq!(entry.id, "/Projects/brief.pdf");
        assert!(entry.modified_at.is_some());
    }
}
