//! OAuth2 authorization-code flow and token refresh.
//!
//! Authorization URLs are built locally; token grants go straight to the
//! provider's token endpoint as form POSTs. Google and Microsoft expect the
//! client id and secret as body parameters, Dropbox authenticates the
//! refresh grant with HTTP Basic instead — both styles live here so the
//! clients can pick the one their vendor requires.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use paperbase_common::{Error, Result};

use crate::registry::CloudProviderConfig;

/// Token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Access/refresh token pair returned by a token-endpoint call.
///
/// `refresh_token` is absent on refresh responses from most providers and on
/// repeat grants from some; callers keep the previously stored one then.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// OAuth client credentials resolved from the environment.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// Resolve both credentials from the process environment.
    ///
    /// # Errors
    /// - `Error::Configuration` when either variable is unset or empty
    pub fn from_env(config: &CloudProviderConfig) -> Result<Self> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve credentials through an arbitrary lookup (injectable for tests).
    pub fn resolve(
        config: &CloudProviderConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let client_id = require_var(config.client_id_env, &lookup)?;
        let client_secret = require_var(config.client_secret_env, &lookup)?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

fn require_var(key: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Configuration(format!("{} is not set", key)))
}

/// Build the URL the user visits to authorize a connection.
///
/// `state` is the caller-generated anti-CSRF token; the caller verifies it on
/// the redirect. No network call is made.
pub fn build_authorization_url(
    config: &CloudProviderConfig,
    state: &str,
    redirect_uri: &str,
) -> Result<Url> {
    build_authorization_url_with(config, state, redirect_uri, |key| std::env::var(key).ok())
}

/// [`build_authorization_url`] with an injectable environment lookup.
pub fn build_authorization_url_with(
    config: &CloudProviderConfig,
    state: &str,
    redirect_uri: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Url> {
    let client_id = require_var(config.client_id_env, lookup)?;

    let mut url = Url::parse(config.auth_url)
        .map_err(|e| Error::InvalidInput(format!("Invalid authorize URL: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("response_type", "code");
        query.append_pair("state", state);
        if !config.scopes.is_empty() {
            query.append_pair("scope", &config.scopes.join(" "));
        }
        // Offline-access flags for every provider; each vendor ignores the
        // ones it does not know. Simpler than tailoring the parameter set
        // per provider.
        query.append_pair("access_type", "offline");
        query.append_pair("prompt", "consent");
        query.append_pair("token_access_type", "offline");
    }

    Ok(url)
}

/// Exchange an authorization code for a token pair.
///
/// One-shot interactive flow: no retry, the redirect handler surfaces any
/// failure to the end user.
///
/// # Errors
/// - `Error::Configuration` when client credentials are missing
/// - `Error::TokenExchange` with status and raw body on a non-2xx response
pub async fn exchange_code(
    http: &Client,
    config: &CloudProviderConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenSet> {
    let credentials = ClientCredentials::from_env(config)?;

    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    post_token_request(http, config.token_url, &params, None).await
}

/// Refresh an access token, authenticating with body parameters
/// (Google Drive, OneDrive).
pub async fn refresh_with_body_credentials(
    http: &Client,
    config: &CloudProviderConfig,
    credentials: &ClientCredentials,
    refresh_token: &str,
) -> Result<TokenSet> {
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    post_token_request(http, config.token_url, &params, None).await
}

/// Refresh an access token, authenticating the client over HTTP Basic
/// (Dropbox). A genuine protocol difference, not one to normalize away.
pub async fn refresh_with_basic_credentials(
    http: &Client,
    config: &CloudProviderConfig,
    credentials: &ClientCredentials,
    refresh_token: &str,
) -> Result<TokenSet> {
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];

    post_token_request(http, config.token_url, &params, Some(credentials)).await
}

async fn post_token_request(
    http: &Client,
    token_url: &str,
    params: &[(&str, &str)],
    basic: Option<&ClientCredentials>,
) -> Result<TokenSet> {
    let mut request = http.post(token_url).form(params);
    if let Some(credentials) = basic {
        request = request.basic_auth(&credentials.client_id, Some(&credentials.client_secret));
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::Network(format!("Token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Network(format!("Failed to read token response: {}", e)))?;

    if !status.is_success() {
        return Err(Error::TokenExchange {
            status: status.as_u16(),
            body,
        });
    }

    token_set_from_json(&body, Utc::now())
}

/// Wire shape of a token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn token_set_from_json(body: &str, now: DateTime<Utc>) -> Result<TokenSet> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Error::InvalidInput(format!("Malformed token response: {}", e)))?;

    let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(TokenSet {
        access_token: parsed.access_token,
        refresh_token: parsed.refresh_token,
        expires_at: now + Duration::seconds(expires_in),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "GOOGLE_DRIVE_CLIENT_ID" => Some("test-id".to_string()),
            "GOOGLE_DRIVE_CLIENT_SECRET" => Some("test-secret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_authorization_url_carries_standard_params() {
        let registry = ProviderRegistry::with_default_providers();
        let config = registry.get("google_drive").unwrap();

        let url = build_authorization_url_with(
            config,
            "xyz789",
            "https://app.example.com/oauth/callback",
            lookup,
        )
        .unwrap();

        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(pairs.contains(&("client_id".to_string(), "test-id".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("state".to_string(), "xyz789".to_string())));
        assert!(pairs.contains(&(
            "scope".to_string(),
            "https://www.googleapis.com/auth/drive.readonly".to_string()
        )));
        // Offline flags are always present, even where the vendor ignores them.
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("token_access_type".to_string(), "offline".to_string())));
    }

    #[test]
    fn test_authorization_url_without_client_id_fails() {
        let registry = ProviderRegistry::with_default_providers();
        let config = registry.get("dropbox").unwrap();

        let err =
            build_authorization_url_with(config, "state", "https://cb.example.com", |_| None)
                .unwrap_err();

        assert!(matches!(err, Error::Configuration(msg) if msg.contains("DROPBOX_CLIENT_ID")));
    }

    #[test]
    fn test_resolve_rejects_empty_credentials() {
        let registry = ProviderRegistry::with_default_providers();
        let config = registry.get("onedrive").unwrap();

        let err = ClientCredentials::resolve(config, |_| Some(String::new())).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_token_set_defaults_expiry_to_an_hour() {
        let now = Utc::now();
        let tokens =
            token_set_from_json(r#"{"access_token":"at-1","refresh_token":"rt-1"}"#, now).unwrap();

        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(tokens.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_token_set_uses_reported_expiry_and_optional_refresh() {
        let now = Utc::now();
        let tokens =
            token_set_from_json(r#"{"access_token":"at-2","expires_in":120}"#, now).unwrap();

        assert_eq!(tokens.refresh_token, None);
        assert_eq!(tokens.expires_at, now + Duration::seconds(120));
    }

    #[test]
    fn test_malformed_token_response_fails() {
        let err = token_set_from_json(r#"{"token_type":"bearer"}"#, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
