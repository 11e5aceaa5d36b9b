//! Microsoft OneDrive provider client (Graph API v1.0).

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

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// OneDrive drive item from the Graph API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
    /// Present exactly when the item is a folder; there is no folder MIME type.
    #[serde(default)]
    folder: Option<FolderFacet>,
    #[serde(default)]
    file: Option<FileFacet>,
    #[serde(default)]
    parent_reference: Option<ParentReference>,
    /// Ephemeral pre-authenticated content URL supplied by the vendor.
    #[serde(rename = "@microsoft.graph.downloadUrl", default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FolderFacet {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentReference {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
}

/// OneDrive client bound to one connection.
pub struct OneDriveClient {
    config: CloudProviderConfig,
    handle: ConnectionHandle,
    http: Client,
}

impl OneDriveClient {
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

    /// Children endpoint for a folder; `root` is a literal path segment when
    /// no explicit id is given.
    fn children_url(folder_id: Option<&str>) -> String {
        match folder_id {
            Some(id) => format!("{}/me/drive/items/{}/children", GRAPH_API_BASE, id),
            None => format!("{}/me/drive/root/children", GRAPH_API_BASE),
        }
    }

    fn to_cloud_file(item: DriveItem) -> CloudFile {
        let is_folder = item.folder.is_some();
        let mime_type = item.file.and_then(|f| f.mime_type);

        // parentReference.path looks like "/drive/root:/Sub/Folder".
        let parent = item
            .parent_reference
            .and_then(|p| p.path)
            .map(|p| p.trim_start_matches("/drive/root:").to_string())
            .unwrap_or_default();
        let path = format!("{}/{}", parent, item.name);

        CloudFile {
            id: item.id,
            name: item.name,
            mime_type,
            size: item.size,
            path,
            modified_at: item.last_modified_date_time,
            is_folder,
            download_url: item.download_url,
        }
    }
}

#[async_trait]
impl CloudClient for OneDriveClient {
    fn provider_id(&self) -> &str {
        self.config.id
    }

    async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<CloudFile>> {
        let root = self.handle.root_folder_id().await;
        let folder = folder_id.map(str::to_owned).or(root);

        let mut files = Vec::new();
        let mut url = Self::children_url(folder.as_deref());

        loop {
            let token = self.bearer().await?;
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(transport_error)?;

            let page: ChildrenResponse = read_json(response).await?;
            files.extend(page.value.into_iter().map(Self::to_cloud_file));

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(files)
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.bearer().await?;
        // The content endpoint redirects to a pre-authenticated URL; the
        // vendor's direct downloadUrl is exposed on CloudFile for callers
        // that want to skip this hop.
        let response = self
            .http
            .get(format!(
                "{}/me/drive/items/{}/content",
                GRAPH_API_BASE, file_id
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        read_bytes(response).await
    }

    async fn file_metadata(&self, file_id: &str) -> Result<CloudFile> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(format!("{}/me/drive/items/{}", GRAPH_API_BASE, file_id))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        let item: DriveItem = read_json(response).await?;
        Ok(Self::to_cloud_file(item))
    }

    async fn user_info(&self) -> Result<UserInfo> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(format!("{}/me", GRAPH_API_BASE))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        let user: GraphUser = read_json(response).await?;
        Ok(UserInfo {
            email: user.mail.or(user.user_principal_name).unwrap_or_default(),
            name: user.display_name.unwrap_or_default(),
        })
    }

    async fn refresh_access_token(&self) -> Result<TokenSet> {
        let refresh_token = self.handle.refresh_token().await?;
        let credentials = ClientCredentials::from_env(&self.config)?;
        oauth::refresh_with_body_credentials(&self.http, &self.config, &credentials, &refresh_token)
            .await
    }
}
