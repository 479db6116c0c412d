//! Translates a JSON-RPC MCP envelope into a client core call (spec §4.9:
//! "forwards `tools/*`, `resources/*`, `prompts/*`, `logging/setLevel`, and
//! `ping` to the bridge's client core").

use bridge_core::{CoreError, McpClient};
use rmcp::model::LoggingLevel;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown or unsupported method: {0}")]
    UnknownMethod(String),
    #[error("invalid params for {method}: {source}")]
    InvalidParams { method: String, source: serde_json::Error },
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Forwards one JSON-RPC `method`/`params` pair to the matching `McpClient`
/// operation and serializes its result back into a JSON value suitable as
/// a JSON-RPC `result`.
pub async fn dispatch(client: &McpClient, method: &str, params: Value) -> Result<Value, DispatchError> {
    match method {
        "ping" => {
            client.ping().await?;
            Ok(Value::Null)
        }
        "tools/list" => {
            let cursor = cursor_param(&params);
            Ok(serde_json::to_value(client.list_tools(cursor).await?)?)
        }
        "tools/call" => {
            let (name, arguments) = tool_call_params(&params, method)?;
            Ok(serde_json::to_value(client.call_tool(name, arguments).await?)?)
        }
        "resources/list" => {
            let cursor = cursor_param(&params);
            Ok(serde_json::to_value(client.list_resources(cursor).await?)?)
        }
        "resources/templates/list" => {
            let cursor = cursor_param(&params);
            Ok(serde_json::to_value(client.list_resource_templates(cursor).await?)?)
        }
        "resources/read" => {
            let uri = uri_param(&params, method)?;
            Ok(serde_json::to_value(client.read_resource(uri).await?)?)
        }
        "resources/subscribe" => {
            let uri = uri_param(&params, method)?;
            client.subscribe_resource(uri).await?;
            Ok(Value::Null)
        }
        "resources/unsubscribe" => {
            let uri = uri_param(&params, method)?;
            client.unsubscribe_resource(uri).await?;
            Ok(Value::Null)
        }
        "prompts/list" => {
            let cursor = cursor_param(&params);
            Ok(serde_json::to_value(client.list_prompts(cursor).await?)?)
        }
        "prompts/get" => {
            let (name, arguments) = tool_call_params(&params, method)?;
            Ok(serde_json::to_value(client.get_prompt(name, arguments).await?)?)
        }
        "logging/setLevel" => {
            let level: LoggingLevel = serde_json::from_value(params.get("level").cloned().unwrap_or(Value::Null))
                .map_err(|source| DispatchError::InvalidParams { method: method.to_string(), source })?;
            client.set_logging_level(level).await?;
            Ok(Value::Null)
        }
        other => Err(DispatchError::UnknownMethod(other.to_string())),
    }
}

fn cursor_param(params: &Value) -> Option<String> {
    params.get("cursor").and_then(Value::as_str).map(str::to_string)
}

fn uri_param(params: &Value, method: &str) -> Result<String, DispatchError> {
    params
        .get("uri")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DispatchError::InvalidParams {
            method: method.to_string(),
            source: serde::de::Error::missing_field("uri"),
        })
}

fn tool_call_params(params: &Value, method: &str) -> Result<(String, Option<serde_json::Map<String, Value>>), DispatchError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DispatchError::InvalidParams {
            method: method.to_string(),
            source: serde::de::Error::missing_field("name"),
        })?;
    let arguments = params.get("arguments").and_then(Value::as_object).cloned();
    Ok((name, arguments))
}
