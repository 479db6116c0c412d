//! The bridge IPC wire format (spec §4.7, §6): line-delimited JSON over a
//! Unix-domain socket, one object per line. Requests carry an `id` the
//! response echoes back; errors carry a `{code, message}` body mirroring
//! `bridge_common::BridgeError`'s shape so it round-trips without loss.

use bridge_common::{BridgeError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcErrorBody {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcErrorBody>,
}

impl IpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn err(id: u64, error: &BridgeError) -> Self {
        Self {
            id,
            result: None,
            error: Some(IpcErrorBody {
                code: error.kind.exit_code(),
                message: error.message.clone(),
            }),
        }
    }

    pub fn into_result(self) -> Result<Value, BridgeError> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(err) => Err(BridgeError::new(kind_from_exit_code(err.code), err.message)),
        }
    }
}

fn kind_from_exit_code(code: i32) -> ErrorKind {
    match code {
        2 => ErrorKind::AuthError,
        3 => ErrorKind::NetworkError,
        4 => ErrorKind::SessionExpired,
        _ => ErrorKind::ClientError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = IpcRequest {
            id: 7,
            method: "listTools".to_string(),
            params: Some(serde_json::json!({"cursor": null})),
        };
        let line = serde_json::to_string(&req).unwrap();
        let parsed: IpcRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.method, "listTools");
    }

    #[test]
    fn error_response_recovers_its_kind() {
        let err = BridgeError::auth("refresh token rejected");
        let response = IpcResponse::err(1, &err);
        let recovered = response.into_result().unwrap_err();
        assert_eq!(recovered.kind, ErrorKind::AuthError);
        assert_eq!(recovered.message, "refresh token rejected");
    }

    #[test]
    fn ok_response_carries_the_result_through() {
        let response = IpcResponse::ok(2, serde_json::json!({"tools": []}));
        let value = response.into_result().unwrap();
        assert_eq!(value, serde_json::json!({"tools": []}));
    }
}
