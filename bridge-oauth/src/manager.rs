//! OAuth Token Manager (spec §4.4): discovery, refresh-grant flow, preemptive
//! refresh, and single-flight coalescing of concurrent refresh attempts for
//! the same profile within one bridge.
//!
//! Grounded on the refresh-token half of `McpOAuthManager` in the pack's
//! `rocode-mcp` oauth module — this manager deliberately only implements the
//! refresh grant, never the authorization-code+PKCE flow, which is out of
//! scope here (profiles are provisioned by an external collaborator; this
//! component just keeps an already-issued token warm).

use crate::error::OAuthError;
use bridge_secrets::{OAuthCredentials, SecretStore, SecretStoreExt};
use chrono::Utc;
use dashmap::DashMap;
use oauth2::basic::BasicClient;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The preemptive refresh window from spec §3/§6: refresh when within this
/// many seconds of `expiresAt`.
pub const REFRESH_BUFFER_SEC: i64 = 60;

/// Called after a successful refresh so the caller can update the auth
/// profile's `expiresAt`/`scopes`/timestamps (spec §4.4 "persistence callback").
pub trait ProfileRefreshObserver: Send + Sync {
    fn on_refreshed(&self, server_url: &str, profile: &str, credentials: &OAuthCredentials);
}

pub struct NoopObserver;
impl ProfileRefreshObserver for NoopObserver {
    fn on_refreshed(&self, _server_url: &str, _profile: &str, _credentials: &OAuthCredentials) {}
}

pub struct OAuthTokenManager {
    secrets: Arc<dyn SecretStore>,
    http: reqwest::Client,
    observer: Arc<dyn ProfileRefreshObserver>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OAuthTokenManager {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            http: reqwest::Client::new(),
            observer: Arc::new(NoopObserver),
            refresh_locks: DashMap::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProfileRefreshObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns a currently valid access token, refreshing first if within
    /// `REFRESH_BUFFER_SEC` of expiry. Concurrent callers for the same
    /// `(server_url, profile)` coalesce onto a single in-flight refresh.
    pub async fn valid_access_token(&self, server_url: &str, profile: &str) -> Result<String, OAuthError> {
        let credentials = self
            .secrets
            .get_oauth_credentials(server_url, profile)?
            .ok_or_else(|| OAuthError::NoCredentials {
                server_url: server_url.to_string(),
                profile: profile.to_string(),
            })?;

        let now = Utc::now().timestamp();
        if credentials.expires_at - now > REFRESH_BUFFER_SEC {
            return Ok(credentials.access_token);
        }

        self.refresh(server_url, profile).await
    }

    /// Forces a refresh regardless of current expiry, as used by the
    /// transport's "one retry after refresh" auth-error handling (spec §4.3).
    pub async fn refresh(&self, server_url: &str, profile: &str) -> Result<String, OAuthError> {
        let lock_key = format!("{server_url}:{profile}");
        let lock = self
            .refresh_locks
            .entry(lock_key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-read after acquiring the lock: another caller may have already
        // refreshed while we waited.
        let credentials = self
            .secrets
            .get_oauth_credentials(server_url, profile)?
            .ok_or_else(|| OAuthError::NoCredentials {
                server_url: server_url.to_string(),
                profile: profile.to_string(),
            })?;
        let now = Utc::now().timestamp();
        if credentials.expires_at - now > REFRESH_BUFFER_SEC {
            return Ok(credentials.access_token);
        }

        let refresh_token = credentials.refresh_token.clone().ok_or_else(|| OAuthError::NoRefreshToken {
            server_url: server_url.to_string(),
            profile: profile.to_string(),
        })?;

        let token_endpoint = crate::discovery::discover_token_endpoint(&self.http, server_url).await?;

        let client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_token_uri(TokenUrl::new(token_endpoint)?);
        let client = match &credentials.client_secret {
            Some(secret) => client.set_client_secret(ClientSecret::new(secret.clone())),
            None => client,
        };

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http)
            .await
            .map_err(|err| match err {
                oauth2::RequestTokenError::ServerResponse(_) => OAuthError::RefreshRejected {
                    server_url: server_url.to_string(),
                    profile: profile.to_string(),
                },
                other => OAuthError::RefreshRequest(other.to_string()),
            })?;

        let refreshed = OAuthCredentials {
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(credentials.refresh_token),
            token_type: "Bearer".to_string(),
            expires_at: response
                .expires_in()
                .map(|d| now + d.as_secs() as i64)
                .unwrap_or(credentials.expires_at),
            scope: response
                .scopes()
                .map(|s| s.iter().map(|sc| sc.to_string()).collect::<Vec<_>>().join(" "))
                .or(credentials.scope),
        };

        self.secrets.set_oauth_credentials(server_url, profile, &refreshed)?;
        self.observer.on_refreshed(server_url, profile, &refreshed);

        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_secrets::MemorySecretStore;

    fn store_with_expired_credentials() -> Arc<MemorySecretStore> {
        let store = Arc::new(MemorySecretStore::new());
        store
            .set_oauth_credentials(
                "https://mcp.example.com",
                "work",
                &OAuthCredentials {
                    client_id: "client-1".into(),
                    client_secret: None,
                    access_token: "stale".into(),
                    refresh_token: None,
                    token_type: "Bearer".into(),
                    expires_at: Utc::now().timestamp() - 10,
                    scope: None,
                },
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_an_error() {
        let store = store_with_expired_credentials();
        let manager = OAuthTokenManager::new(store);
        let err = manager.valid_access_token("https://mcp.example.com", "work").await.unwrap_err();
        assert!(matches!(err, OAuthError::NoRefreshToken { .. }));
    }

    #[tokio::test]
    async fn non_expired_token_is_returned_without_refreshing() {
        let store = Arc::new(MemorySecretStore::new());
        store
            .set_oauth_credentials(
                "https://mcp.example.com",
                "work",
                &OAuthCredentials {
                    client_id: "client-1".into(),
                    client_secret: None,
                    access_token: "fresh".into(),
                    refresh_token: Some("rt".into()),
                    token_type: "Bearer".into(),
                    expires_at: Utc::now().timestamp() + 3600,
                    scope: None,
                },
            )
            .unwrap();
        let manager = OAuthTokenManager::new(store);
        let token = manager.valid_access_token("https://mcp.example.com", "work").await.unwrap();
        assert_eq!(token, "fresh");
    }
}
