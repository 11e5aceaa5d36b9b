//! Google Drive provider client (Drive API v3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
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

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Folders are ordinary files with this vendor MIME type.
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime";

/// Google Drive file metadata from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// Reported as a decimal string, absent for Docs-native types.
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    user: AboutUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email_address: Option<String>,
}

/// Google Drive client bound to one connection.
pub struct GoogleDriveClient {
    config: CloudProviderConfig,
    handle: ConnectionHandle,
    http: Client,
}

impl GoogleDriveClient {
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
                oauth::refresh_with_body_credentials(
                    &self.http,
                    &self.config,
                    &credentials,
                    &refresh_token,
                )
                .await
            })
            .await
    }

    fn to_cloud_file(file: DriveFile) -> CloudFile {
        let is_folder = file.mime_type == FOLDER_MIME_TYPE;
        let size = file
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let path = format!("/{}", file.name);

        CloudFile {
            id: file.id,
            name: file.name,
            mime_type: Some(file.mime_type),
            size,
            path,
            modified_at: file.modified_time,
            is_folder,
            download_url: None,
        }
    }
}

#[async_trait]
impl CloudClient for GoogleDriveClient {
    fn provider_id(&self) -> &str {
        self.config.id
    }

    async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<CloudFile>> {
        let folder = match folder_id {
            Some(id) => id.to_string(),
            None => self
                .handle
                .root_folder_id()
                .await
                .unwrap_or_else(|| "root".to_string()),
        };

        // Folder membership is a query filter, not a path segment.
        let query = format!(
            "'{}' in parents and trashed = false",
            folder.replace('\'', "\\'")
        );

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.bearer().await?;
            let mut request = self
                .http
                .get(format!("{}/files", DRIVE_API_BASE))
                .bearer_auth(&token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "files(id,name,mimeType,size,modifiedTime),nextPageToken"),
                    ("pageSize", "1000"),
                ]);

            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request.send().await.map_err(transport_error)?;
            let page: DriveFileList = read_json(response).await?;
            files.extend(page.files.into_iter().map(Self::to_cloud_file));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(files)
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", DRIVE_API_BASE, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(transport_error)?;

        read_bytes(response).await
    }

    async fn file_metadata(&self, file_id: &str) -> Result<CloudFile> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", DRIVE_API_BASE, file_id))
            .bearer_auth(&token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await
            .map_err(transport_error)?;

        let file: DriveFile = read_json(response).await?;
        Ok(Self::to_cloud_file(file))
    }

    async fn user_info(&self) -> Result<UserInfo> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(format!("{}/about", DRIVE_API_BASE))
            .bearer_auth(&token)
            .query(&[("fields", "user(displayName,emailAddress)")])
            .send()
            .await
            .map_err(transport_error)?;

        let about: AboutResponse = read_json(response).await?;
        Ok(UserInfo {
            email: about.user.email_address.unwrap_or_default(),
            name: about.user.display_name.unwrap_or_default(),
        })
    }

    async fn refresh_access_token(&self) -> Result<TokenSet> {
        let refresh_token = self.handle.refresh_token().await?;
        let credentials = ClientCredentials::from_env(&self.config)?;
        oauth::refresh_with_body_credentials(&self.http, &self.config, &credentials, &refresh_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_detection_by_vendor_mime_type() {
        let folder: DriveFile = serde_json::from_str(
            r#"{"id":"f1","name":"Reports","mimeType":"application/vnd.google-apps.folder"}"#,
        )
        .unwrap();
        let entry = GoogleDriveClient::to_cloud_file(folder);

        assert!(entry.is_folder);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.path, "/Reports");
    }

    #[test]
    fn test_size_string_parsed_and_missing_size_defaults_to_zero() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"d1","name":"notes.pdf","mimeType":"application/pdf","size":"2048","modifiedTime":"2024-03-01T09:30:00Z"}"#,
        )
        .unwrap();
        let entry = GoogleDriveClient::to_cloud_file(file);
        assert_eq!(entry.size, 2048);
        assert!(!entry.is_folder);
        assert!(entry.modified_at.is_some());

        let doc: DriveFile = serde_json::from_str(
            r#"{"id":"d2","name":"plan","mimeType":"application/vnd.google-apps.document"}"#,
        )
        .unwrap();
        assert_eq!(GoogleDriveClient::to_cloud_file(doc).size, 0);
    }
}
