//! Wire protocol types.
//!
//! JSON-RPC 2.0 envelopes, one message per line, carrying the config
//! service's request and response messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method name for attribute listing.
pub const METHOD_ATTRIBUTES: &str = "ConfigAttributes";
/// Method name for loading.
pub const METHOD_LOAD: &str = "ConfigLoad";
/// Method name for validation.
pub const METHOD_VALIDATE: &str = "ConfigValidate";
/// Method name for finalization.
pub const METHOD_FINALIZE: &str = "ConfigFinalize";
/// Notification asking the server to cancel an in-flight request.
pub const METHOD_CANCEL: &str = "$/cancelRequest";

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The message was not a valid request.
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Request parameters could not be decoded.
pub const INVALID_PARAMS: i32 = -32602;
/// The server failed internally (encoding, panicked delegate).
pub const INTERNAL_ERROR: i32 = -32603;
/// The native implementation reported an error.
pub const BUSINESS_ERROR: i32 = -32000;
/// The local end of the transport failed (never sent by a server).
pub const TRANSPORT_ERROR: i32 = -32001;
/// The request was cancelled before it completed.
pub const REQUEST_CANCELLED: i32 = -32800;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Parameters (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), method: method.into(), params }
    }
}

/// JSON-RPC request ID (can be string or number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID
    Number(i64),
    /// String ID
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Request ID (null when the request could not be parsed)
    pub id: Option<RequestId>,
    /// Result (if successful)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// A successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: Some(id), result: Some(result), error: None }
    }

    /// A failed response.
    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) }
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get the result value.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, JsonRpcError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let result = self
            .result
            .ok_or_else(|| JsonRpcError::new(INTERNAL_ERROR, "No result in response"))?;

        serde_json::from_value(result)
            .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Failed to parse result: {}", e)))
    }
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create an error with the given code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    /// The native implementation failed; `message` is its error text verbatim.
    pub fn business(message: impl Into<String>) -> Self {
        Self::new(BUSINESS_ERROR, message)
    }

    /// The request was cancelled.
    pub fn cancelled(cause: impl std::fmt::Display) -> Self {
        Self::new(REQUEST_CANCELLED, format!("Request cancelled: {cause}"))
    }

    /// Request parameters could not be decoded.
    pub fn invalid_params(message: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, message.to_string())
    }

    /// The server failed internally.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, message.to_string())
    }

    /// The local transport failed.
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::new(TRANSPORT_ERROR, message.to_string())
    }

    /// Whether this error reports a native-implementation failure.
    pub fn is_business(&self) -> bool {
        self.code == BUSINESS_ERROR
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), method: method.into(), params }
    }
}

/// Any message a server can receive.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A call expecting a response.
    Request(JsonRpcRequest),
    /// A fire-and-forget message.
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Parse one message line.
    ///
    /// A message carrying an `id` key is a request, whatever the key holds; a
    /// request whose id is not a number or string is rejected rather than
    /// mistaken for a notification. Non-JSON input is a [`PARSE_ERROR`],
    /// JSON that is not a well-formed message an [`INVALID_REQUEST`].
    pub fn parse(line: &str) -> Result<Self, JsonRpcError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| JsonRpcError::new(PARSE_ERROR, format!("Invalid message: {}", e)))?;
        let is_request = value.as_object().is_some_and(|fields| fields.contains_key("id"));

        let invalid = |e: serde_json::Error| JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {}", e));
        if is_request {
            serde_json::from_value(value).map(Self::Request).map_err(invalid)
        } else {
            serde_json::from_value(value).map(Self::Notification).map_err(invalid)
        }
    }
}

/// Parameters of [`METHOD_CANCEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    /// ID of the request to cancel
    pub id: RequestId,
}

// ============================================================================
// Config service messages
// ============================================================================

/// Request without fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullRequest {}

/// Response of `ConfigAttributes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributesResponse {
    /// Attribute names, in display order
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Request of `ConfigLoad`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Encoded raw config data
    pub data: String,
}

/// Response of `ConfigLoad`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResponse {
    /// Encoded loaded config data
    pub data: String,
}

/// Request of `ConfigValidate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// Encoded config data
    pub data: String,
    /// Opaque machine blob
    #[serde(default)]
    pub machine: Vec<u8>,
}

/// Response of `ConfigValidate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Validation errors; empty when valid
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Request of `ConfigFinalize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    /// Encoded config data
    pub data: String,
}

/// Response of `ConfigFinalize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResponse {
    /// Encoded final config data
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest::new(1_i64, METHOD_LOAD, None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"ConfigLoad\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_incoming_distinguishes_notifications() {
        let request =
            IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":7,"method":"ConfigAttributes"}"#)
                .unwrap();
        assert!(matches!(request, IncomingMessage::Request(r) if r.id == RequestId::Number(7)));

        let notification =
            IncomingMessage::parse(r#"{"jsonrpc":"2.0","method":"$/cancelRequest","params":{"id":7}}"#)
                .unwrap();
        assert!(matches!(notification, IncomingMessage::Notification(n) if n.method == METHOD_CANCEL));
    }

    #[test]
    fn test_incoming_bad_id_is_invalid_request() {
        for line in [
            r#"{"jsonrpc":"2.0","id":1.5,"method":"ConfigAttributes"}"#,
            r#"{"jsonrpc":"2.0","id":{},"method":"ConfigAttributes"}"#,
            r#"{"jsonrpc":"2.0","id":null,"method":"ConfigAttributes"}"#,
        ] {
            let err = IncomingMessage::parse(line).unwrap_err();
            assert_eq!(err.code, INVALID_REQUEST, "{line}");
        }
    }

    #[test]
    fn test_incoming_parse_errors() {
        assert_eq!(IncomingMessage::parse("not json").unwrap_err().code, PARSE_ERROR);
        assert_eq!(IncomingMessage::parse("[1, 2]").unwrap_err().code, INVALID_REQUEST);
        assert_eq!(IncomingMessage::parse(r#"{"jsonrpc":"2.0"}"#).unwrap_err().code, INVALID_REQUEST);
    }

    #[test]
    fn test_response_into_result() {
        let response = JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({"attributes": ["memory", "cpus"]}),
        );
        assert!(response.is_success());
        let result: AttributesResponse = response.into_result().unwrap();
        assert_eq!(result.attributes, vec!["memory", "cpus"]);
    }

    #[test]
    fn test_failure_response_keeps_error() {
        let response =
            JsonRpcResponse::failure(Some(RequestId::Number(2)), JsonRpcError::business("bad box"));
        let err = response.into_result::<LoadResponse>().unwrap_err();
        assert!(err.is_business());
        assert_eq!(err.message, "bad box");
        assert_eq!(err.to_string(), "[-32000] bad box");
    }

    #[test]
    fn test_validate_request_carries_machine_bytes() {
        let request = ValidateRequest { data: "{}".to_string(), machine: vec![0, 159, 255] };
        let json = serde_json::to_string(&request).unwrap();
        let back: ValidateRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
