//! Common error types for the Paperbase cloud sync subsystem.

use thiserror::Error;

/// Top-level error type for cloud sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required OAuth client credentials are missing from the environment.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider's token endpoint rejected an exchange or refresh.
    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    /// A provider API call returned a non-success response.
    #[error("Provider API error {status}: {body}")]
    ProviderApi { status: u16, body: String },

    /// The connection has no access token at all and must not be used.
    #[error("Connection has no access token")]
    NoAccessToken,

    /// The connection has no refresh token; the user must re-authorize.
    #[error("Connection has no refresh token, re-authorization required")]
    NoRefreshToken,

    /// The connection references a provider that is not registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A sync pass is already in flight for this connection.
    #[error("Sync already in progress for connection {0}")]
    SyncInProgress(i64),

    /// A network transport failure (no HTTP response was received).
    #[error("Network error: {0}")]
    Network(String),

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Check if this error is a transient transport failure worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
