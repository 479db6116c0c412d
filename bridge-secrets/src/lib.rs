//! # Bridge Secrets
//!
//! A thin facade over the OS keychain (spec §4.2) exposing typed get/set/delete
//! for the three namespaces the session-bridge ever persists secret material
//! under: OAuth credential triples, per-session HTTP headers, and per-session
//! proxy bearer tokens. Grounded directly on the `KeyringSecretStore` /
//! `SecretKey` pattern used for OAuth tokens elsewhere in the pack, extended
//! with the additional namespaces this spec needs.
//!
//! This is the only component allowed to hold secret material in memory for
//! longer than one request; everything else receives values, uses them, and
//! drops them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Which of the three persisted-secret shapes a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretNamespace {
    /// `auth:<serverUrl>:<profile>` — an `OAuthCredentials` blob.
    OAuthCredentials,
    /// `session:<name>:headers` — a `HashMap<String, String>` of HTTP headers.
    SessionHeaders,
    /// `session:<name>:proxy-bearer` — a single opaque bearer token string.
    ProxyBearer,
}

impl SecretNamespace {
    fn prefix(self) -> &'static str {
        match self {
            SecretNamespace::OAuthCredentials => "auth",
            SecretNamespace::SessionHeaders => "session-headers",
            SecretNamespace::ProxyBearer => "session-proxy-bearer",
        }
    }
}

/// A fully qualified key for one stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretKey {
    pub namespace: SecretNamespace,
    pub identifier: String,
}

impl SecretKey {
    pub fn new(namespace: SecretNamespace, identifier: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: identifier.into(),
        }
    }

    pub fn oauth_credentials(server_url: &str, profile: &str) -> Self {
        Self::new(SecretNamespace::OAuthCredentials, format!("{server_url}:{profile}"))
    }

    pub fn session_headers(session_name: &str) -> Self {
        Self::new(SecretNamespace::SessionHeaders, session_name)
    }

    pub fn proxy_bearer(session_name: &str) -> Self {
        Self::new(SecretNamespace::ProxyBearer, session_name)
    }

    fn username(&self) -> String {
        format!("{}::{}", self.namespace.prefix(), self.identifier)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("keychain backend error: {0}")]
    Backend(String),
    #[error("stored value for {0:?} is not valid JSON: {1}")]
    Malformed(SecretNamespace, serde_json::Error),
}

/// The OAuth credential triple kept only in the Secret Store (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Unix seconds.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

pub trait SecretStore: Send + Sync {
    fn set_raw(&self, key: &SecretKey, value: &str) -> Result<(), SecretStoreError>;
    fn get_raw(&self, key: &SecretKey) -> Result<Option<String>, SecretStoreError>;
    fn delete(&self, key: &SecretKey) -> Result<(), SecretStoreError>;
}

/// Convenience typed helpers layered over any `SecretStore` implementation.
pub trait SecretStoreExt: SecretStore {
    fn set_oauth_credentials(&self, server_url: &str, profile: &str, creds: &OAuthCredentials) -> Result<(), SecretStoreError> {
        let key = SecretKey::oauth_credentials(server_url, profile);
        let value = serde_json::to_string(creds).expect("OAuthCredentials always serializes");
        self.set_raw(&key, &value)
    }

    fn get_oauth_credentials(&self, server_url: &str, profile: &str) -> Result<Option<OAuthCredentials>, SecretStoreError> {
        let key = SecretKey::oauth_credentials(server_url, profile);
        match self.get_raw(&key)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SecretStoreError::Malformed(SecretNamespace::OAuthCredentials, e)),
        }
    }

    fn set_session_headers(&self, session_name: &str, headers: &HashMap<String, String>) -> Result<(), SecretStoreError> {
        let key = SecretKey::session_headers(session_name);
        let value = serde_json::to_string(headers).expect("header map always serializes");
        self.set_raw(&key, &value)
    }

    fn get_session_headers(&self, session_name: &str) -> Result<Option<HashMap<String, String>>, SecretStoreError> {
        let key = SecretKey::session_headers(session_name);
        match self.get_raw(&key)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SecretStoreError::Malformed(SecretNamespace::SessionHeaders, e)),
        }
    }

    fn set_proxy_bearer(&self, session_name: &str, token: &str) -> Result<(), SecretStoreError> {
        self.set_raw(&SecretKey::proxy_bearer(session_name), token)
    }

    fn get_proxy_bearer(&self, session_name: &str) -> Result<Option<String>, SecretStoreError> {
        self.get_raw(&SecretKey::proxy_bearer(session_name))
    }

    /// Removes every namespace a session could have populated. Called by
    /// `consolidate(cleanExpired: true)` (spec §4.1 step 2).
    fn delete_session_secrets(&self, session_name: &str) -> Result<(), SecretStoreError> {
        self.delete(&SecretKey::session_headers(session_name))?;
        self.delete(&SecretKey::proxy_bearer(session_name))
    }
}

impl<T: SecretStore + ?Sized> SecretStoreExt for T {}

/// Production store backed by the OS-native keychain via `keyring`.
#[derive(Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    const DEFAULT_SERVICE: &'static str = "dev.mcp-bridge";

    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    fn entry(&self, username: &str) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(&self.service, username).map_err(|err| {
            SecretStoreError::Backend(format!(
                "keyring entry for service `{}` and user `{username}`: {err}",
                self.service
            ))
        })
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SERVICE)
    }
}

impl SecretStore for KeyringSecretStore {
    fn set_raw(&self, key: &SecretKey, value: &str) -> Result<(), SecretStoreError> {
        let entry = self.entry(&key.username())?;
        entry
            .set_password(value)
            .map_err(|err| SecretStoreError::Backend(err.to_string()))
    }

    fn get_raw(&self, key: &SecretKey) -> Result<Option<String>, SecretStoreError> {
        let entry = self.entry(&key.username())?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(SecretStoreError::Backend(err.to_string())),
        }
    }

    fn delete(&self, key: &SecretKey) -> Result<(), SecretStoreError> {
        let entry = self.entry(&key.username())?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(SecretStoreError::Backend(err.to_string())),
        }
    }
}

impl fmt::Debug for KeyringSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyringSecretStore").field("service", &self.service).finish()
    }
}

/// In-memory store for tests so nothing touches the real OS keychain.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn set_raw(&self, key: &SecretKey, value: &str) -> Result<(), SecretStoreError> {
        self.secrets.lock().unwrap().insert(key.username(), value.to_string());
        Ok(())
    }

    fn get_raw(&self, key: &SecretKey) -> Result<Option<String>, SecretStoreError> {
        Ok(self.secrets.lock().unwrap().get(&key.username()).cloned())
    }

    fn delete(&self, key: &SecretKey) -> Result<(), SecretStoreError> {
        self.secrets.lock().unwrap().remove(&key.username());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credentials() -> OAuthCredentials {
        OAuthCredentials {
            client_id: "client-1".into(),
            client_secret: Some("shh".into()),
            access_token: "at-1".into(),
            refresh_token: Some("rt-1".into()),
            token_type: "Bearer".into(),
            expires_at: 1_900_000_000,
            scope: Some("tools resources".into()),
        }
    }

    #[test]
    fn oauth_credentials_round_trip() {
        let store = MemorySecretStore::new();
        store
            .set_oauth_credentials("https://mcp.example.com", "work", &sample_credentials())
            .unwrap();
        let got = store
            .get_oauth_credentials("https://mcp.example.com", "work")
            .unwrap()
            .unwrap();
        assert_eq!(got, sample_credentials());
    }

    #[test]
    fn session_headers_round_trip_and_delete_clears_both_namespaces() {
        let store = MemorySecretStore::new();
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer xyz".to_string());
        store.set_session_headers("s1", &headers).unwrap();
        store.set_proxy_bearer("s1", "proxy-token").unwrap();

        assert_eq!(store.get_session_headers("s1").unwrap(), Some(headers));
        assert_eq!(store.get_proxy_bearer("s1").unwrap().as_deref(), Some("proxy-token"));

        store.delete_session_secrets("s1").unwrap();
        assert_eq!(store.get_session_headers("s1").unwrap(), None);
        assert_eq!(store.get_proxy_bearer("s1").unwrap(), None);
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let store = MemorySecretStore::new();
        assert!(store.get_oauth_credentials("https://nope", "x").unwrap().is_none());
    }
}
