//! Provider registry: the compiled-in table of supported cloud vendors.

use std::collections::HashMap;

use paperbase_common::{Error, Result};

/// Which concrete client implementation serves a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GoogleDrive,
    OneDrive,
    Dropbox,
}

/// Static OAuth and endpoint configuration for one provider.
///
/// Loaded once at process start; only the names of the credential
/// environment variables are compiled in, never the secrets themselves.
#[derive(Debug, Clone)]
pub struct CloudProviderConfig {
    pub kind: ProviderKind,
    /// Registry identifier stored on connection records.
    pub id: &'static str,
    pub display_name: &'static str,
    /// OAuth2 authorization endpoint.
    pub auth_url: &'static str,
    /// OAuth2 token endpoint, used for both code exchange and refresh.
    pub token_url: &'static str,
    pub scopes: &'static [&'static str],
    /// Environment variable holding the OAuth client id.
    pub client_id_env: &'static str,
    /// Environment variable holding the OAuth client secret.
    pub client_secret_env: &'static str,
}

/// Registry of provider configurations.
///
/// Explicitly constructed and handed to the factory at process start;
/// read-only afterwards.
pub struct ProviderRegistry {
    configs: HashMap<&'static str, CloudProviderConfig>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// Register a provider configuration.
    ///
    /// # Errors
    /// - Returns error if the id is already registered
    pub fn register(&mut self, config: CloudProviderConfig) -> Result<()> {
        if self.configs.contains_key(config.id) {
            return Err(Error::InvalidInput(format!(
                "Provider '{}' is already registered",
                config.id
            )));
        }
        self.configs.insert(config.id, config);
        Ok(())
    }

    /// Look up a provider configuration by id.
    ///
    /// # Errors
    /// - `Error::UnknownProvider` when the id is not registered
    pub fn get(&self, id: &str) -> Result<&CloudProviderConfig> {
        self.configs
            .get(id)
            .ok_or_else(|| Error::UnknownProvider(id.to_string()))
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, id: &str) -> bool {
        self.configs.contains_key(id)
    }

    /// Get the list of registered provider ids.
    pub fn providers(&self) -> Vec<&'static str> {
        self.configs.keys().copied().collect()
    }

    /// Create a registry with every supported provider.
    pub fn with_default_providers() -> Self {
        let mut registry = Self::new();

        for config in [GOOGLE_DRIVE, ONEDRIVE, DROPBOX] {
            registry
                .register(config)
                .expect("default provider registered twice");
        }

        registry
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_default_providers()
    }
}

const GOOGLE_DRIVE: CloudProviderConfig = CloudProviderConfig {
    kind: ProviderKind::GoogleDrive,
    id: "google_drive",
    display_name: "Google Drive",
    auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    scopes: &["https://www.googleapis.com/auth/drive.readonly"],
    client_id_env: "GOOGLE_DRIVE_CLIENT_ID",
    client_secret_env: "GOOGLE_DRIVE_CLIENT_SECRET",
};

const ONEDRIVE: CloudProviderConfig = CloudProviderConfig {
    kind: ProviderKind::OneDrive,
    id: "onedrive",
    display_name: "OneDrive",
    auth_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
    token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
    scopes: &["Files.Read", "User.Read", "offline_access"],
    client_id_env: "ONEDRIVE_CLIENT_ID",
    client_secret_env: "ONEDRIVE_CLIENT_SECRET",
};

const DROPBOX: CloudProviderConfig = CloudProviderConfig {
    kind: ProviderKind::Dropbox,
    id: "dropbox",
    display_name: "Dropbox",
    auth_url: "https://www.dropbox.com/oauth2/authorize",
    token_url: "https://api.dropboxapi.com/oauth2/token",
    scopes: &["files.metadata.read", "files.content.read", "account_info.read"],
    client_id_env: "DROPBOX_CLIENT_ID",
    client_secret_env: "DROPBOX_CLIENT_SECRET",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_all_providers() {
        let registry = ProviderRegistry::with_default_providers();

        for id in ["google_drive", "onedrive", "dropbox"] {
            assert!(registry.has_provider(id), "missing {}", id);
            let config = registry.get(id).unwrap();
            assert_eq!(config.id, id);
            assert!(!config.scopes.is_empty());
        }
    }

    #[test]
    fn test_unknown_provider_fails() {
        let registry = ProviderRegistry::with_default_providers();
        let err = registry.get("icloud").unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(id) if id == "icloud"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ProviderRegistry::with_default_providers();
        assert!(registry.register(GOOGLE_DRIVE).is_err());
    }

    #[test]
    fn test_credential_env_names_follow_provider_prefix() {
        let registry = ProviderRegistry::with_default_providers();

        let google = registry.get("google_drive").unwrap();
        assert_eq!(google.client_id_env, "GOOGLE_DRIVE_CLIENT_ID");
        assert_eq!(google.client_secret_env, "GOOGLE_DRIVE_CLIENT_SECRET");

        let dropbox = registry.get("dropbox").unwrap();
        assert_eq!(dropbox.client_id_env, "DROPBOX_CLIENT_ID");
        assert_eq!(dropbox.client_secret_env, "DROPBOX_CLIENT_SECRET");
    }
}
