use bridge_common::BridgeError;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("no token endpoint found for {server_url} via well-known discovery")]
    DiscoveryFailed { server_url: String },

    #[error("discovery request to {url} failed: {source}")]
    DiscoveryRequest { url: String, source: reqwest::Error },

    #[error("no stored OAuth credentials for {server_url}/{profile}")]
    NoCredentials { server_url: String, profile: String },

    #[error("no refresh token available for {server_url}/{profile}; re-authenticate")]
    NoRefreshToken { server_url: String, profile: String },

    #[error("refresh token invalid or expired for {server_url}/{profile}; re-authenticate")]
    RefreshRejected { server_url: String, profile: String },

    #[error("token refresh request failed: {0}")]
    RefreshRequest(String),

    #[error("secret store error: {0}")]
    Secrets(#[from] bridge_secrets::SecretStoreError),

    #[error("invalid token endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<OAuthError> for BridgeError {
    fn from(err: OAuthError) -> Self {
        BridgeError::auth(err.to_string())
    }
}
