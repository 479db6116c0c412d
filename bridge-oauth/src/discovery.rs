//! Authorization-server metadata discovery (spec §4.4).
//!
//! Tries, in order: `<serverUrl>/.well-known/oauth-authorization-server`,
//! `<serverUrl>/.well-known/openid-configuration`, then the same two paths
//! at the origin root (scheme://host[:port], path stripped). Returns the
//! first response that parses and carries a `token_endpoint`.

use crate::error::OAuthError;
use serde::Deserialize;
use url::Url;

const WELL_KNOWN_PATHS: [&str; 2] = [
    ".well-known/oauth-authorization-server",
    ".well-known/openid-configuration",
];

#[derive(Debug, Deserialize)]
struct AuthorizationServerMetadata {
    token_endpoint: String,
}

pub async fn discover_token_endpoint(http: &reqwest::Client, server_url: &str) -> Result<String, OAuthError> {
    let parsed = Url::parse(server_url)?;
    let origin_root = format!(
        "{}://{}{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default(),
        parsed.port().map(|p| format!(":{p}")).unwrap_or_default(),
    );

    for base in [server_url.trim_end_matches('/'), origin_root.trim_end_matches('/')] {
        for suffix in WELL_KNOWN_PATHS {
            let url = format!("{base}/{suffix}");
            match try_fetch(http, &url).await {
                Ok(Some(endpoint)) => return Ok(endpoint),
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(url = %url, error = %err, "discovery probe failed, trying next candidate");
                }
            }
        }
    }

    Err(OAuthError::DiscoveryFailed {
        server_url: server_url.to_string(),
    })
}

async fn try_fetch(http: &reqwest::Client, url: &str) -> Result<Option<String>, OAuthError> {
    let response = match http.get(url).send().await {
        Ok(resp) => resp,
        Err(source) => {
            return Err(OAuthError::DiscoveryRequest {
                url: url.to_string(),
                source,
            });
        }
    };
    if !response.status().is_success() {
        return Ok(None);
    }
    match response.json::<AuthorizationServerMetadata>().await {
        Ok(metadata) => Ok(Some(metadata.token_endpoint)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_through_to_origin_root_when_server_path_has_no_metadata() {
        let (base, handle) = spawn_metadata_server().await;
        let http = reqwest::Client::new();
        let endpoint = discover_token_endpoint(&http, &format!("{base}/mcp")).await.unwrap();
        assert_eq!(endpoint, format!("{base}/oauth/token"));
        handle.abort();
    }

    /// Serves `oauth-authorization-server` metadata only at the origin root,
    /// so discovery must fall through past the per-path well-known probes.
    async fn spawn_metadata_server() -> (String, tokio::task::JoinHandle<()>) {
        use axum::{Json, Router, routing::get};
        use serde_json::json;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token_endpoint = format!("http://{addr}/oauth/token");

        let app = Router::new().route(
            "/.well-known/oauth-authorization-server",
            get(move || {
                let token_endpoint = token_endpoint.clone();
                async move { Json(json!({ "token_endpoint": token_endpoint })) }
            }),
        );

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (format!("http://{addr}"), handle)
    }
}
