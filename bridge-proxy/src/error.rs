//! Error shape returned to proxy clients (spec §4.9): a JSON-RPC error object
//! on the wire, never the upstream access token, regardless of which layer
//! (auth middleware, dispatch, serialization) produced it.

use crate::dispatch::DispatchError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bridge_common::BridgeError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("missing Authorization header")]
    Unauthenticated,
    #[error("bearer token did not match")]
    Forbidden,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, bridge_error) = match self {
            ProxyError::Unauthenticated => (StatusCode::UNAUTHORIZED, BridgeError::auth("missing Authorization header")),
            ProxyError::Forbidden => (StatusCode::FORBIDDEN, BridgeError::auth("bearer token did not match")),
            ProxyError::Dispatch(DispatchError::UnknownMethod(method)) => {
                (StatusCode::BAD_REQUEST, BridgeError::client(format!("unknown or unsupported method: {method}")))
            }
            ProxyError::Dispatch(err @ DispatchError::InvalidParams { .. }) => (StatusCode::BAD_REQUEST, BridgeError::client(err.to_string())),
            ProxyError::Dispatch(DispatchError::Core(core)) => {
                let err = BridgeError::from(core);
                (status_for(&err), err)
            }
        };
        (status, Json(json!({"error": bridge_error}))).into_response()
    }
}

fn status_for(err: &BridgeError) -> StatusCode {
    match err.kind {
        bridge_common::ErrorKind::AuthError => StatusCode::UNAUTHORIZED,
        bridge_common::ErrorKind::SessionExpired => StatusCode::GONE,
        bridge_common::ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
        bridge_common::ErrorKind::ClientError | bridge_common::ErrorKind::McpError => StatusCode::BAD_REQUEST,
    }
}
