//! Wire types for the Codex app-server JSON-RPC dialect.
//!
//! The app-server speaks newline-delimited JSON without the `"jsonrpc"`
//! version field. A request is one line of the form
//!
//! ```text
//! {"method":"initialize","id":1,"params":{...}}
//! ```
//!
//! and a response carries the same `id` plus either `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Request id of the `initialize` call.
pub const INITIALIZE_REQUEST_ID: u64 = 1;

/// Request id of the `account/rateLimits/read` call.
pub const RATE_LIMITS_REQUEST_ID: u64 = 2;

pub const INITIALIZE_METHOD: &str = "initialize";
pub const RATE_LIMITS_METHOD: &str = "account/rateLimits/read";

/// Identity announced to the agent in the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, id: u64, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            id,
            params,
        }
    }

    /// The `initialize` handshake with an empty capability set.
    pub fn initialize(client_info: &ClientInfo) -> Self {
        Self::new(
            INITIALIZE_METHOD,
            INITIALIZE_REQUEST_ID,
            Some(json!({
                "clientInfo": client_info,
                "capabilities": {}
            })),
        )
    }

    /// The rate-limit query. Takes no params.
    pub fn read_rate_limits() -> Self {
        Self::new(RATE_LIMITS_METHOD, RATE_LIMITS_REQUEST_ID, None)
    }

    /// Serialize to one newline-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// A decoded response envelope.
///
/// `result: null` deserializes to `None` and is treated as a missing result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initialize_line_shape() {
        let info = ClientInfo {
            name: "cxreset".to_string(),
            version: "9.9.9".to_string(),
        };
        let line = RpcRequest::initialize(&info).to_line().unwrap();

        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(
            value,
            json!({
                "method": "initialize",
                "id": 1,
                "params": {
                    "clientInfo": {"name": "cxreset", "version": "9.9.9"},
                    "capabilities": {}
                }
            })
        );
    }

    #[test]
    fn test_rate_limits_request_omits_params() {
        let line = RpcRequest::read_rate_limits().to_line().unwrap();
        assert_eq!(line, "{\"method\":\"account/rateLimits/read\",\"id\":2}\n");
    }

    #[test]
    fn test_default_client_info_uses_package_identity() {
        let info = ClientInfo::default();
        assert_eq!(info.name, "cxreset");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_response_with_error() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"id":1,"error":{"code":-32600,"message":"not logged in"}}"#,
        )
        .unwrap();

        assert_eq!(response.id, 1);
        assert!(response.result.is_none());
        assert_eq!(
            response.error,
            Some(RpcErrorObject {
                code: -32600,
                message: "not logged in".to_string(),
            })
        );
    }

    #[test]
    fn test_null_result_is_missing() {
        let response: RpcResponse = serde_json::from_str(r#"{"id":2,"result":null}"#).unwrap();
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_malformed_error_object_is_rejected() {
        let parsed = serde_json::from_str::<RpcResponse>(r#"{"id":1,"error":"boom"}"#);
        assert!(parsed.is_err());
    }
}
