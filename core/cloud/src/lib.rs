//! Cloud provider abstraction for Paperbase.
//!
//! This crate normalizes three structurally different vendor APIs
//! (Google Drive, Microsoft OneDrive, Dropbox) into one file model behind
//! the `CloudClient` trait, and owns OAuth2 token exchange and proactive
//! refresh for the connections that use them.
//!
//! # Design Principles
//! - Provider isolation: vendor quirks stay inside the vendor's module
//! - Token validity is checked before every API call; callers never reason
//!   about expiry
//! - The registry is explicitly constructed and immutable; no global state
//! - Persistence goes through the `ConnectionStore` collaborator only

pub mod client;
pub mod dropbox;
pub mod factory;
pub mod gdrive;
pub mod memory;
pub mod oauth;
pub mod onedrive;
pub mod registry;
pub mod store;

pub use client::{needs_refresh, CloudClient, CloudFile, ConnectionHandle, UserInfo};
pub use dropbox::DropboxClient;
pub use factory::{ClientFactory, ClientProvider};
pub use gdrive::GoogleDriveClient;
pub use memory::MemoryStore;
pub use oauth::{build_authorization_url, exchange_code, ClientCredentials, TokenSet};
pub use onedrive::OneDriveClient;
pub use registry::{CloudProviderConfig, ProviderKind, ProviderRegistry};
pub use store::{
    ConnectionStore, NewSyncedFile, SyncStatusUpdate, SyncedFileUpdate, TokenUpdate,
};
