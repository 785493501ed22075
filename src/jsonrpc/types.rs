use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{RpcError, RpcResult};

/// Protocol version stamped on every outbound message
pub const JSONRPC_VERSION: &str = "2.0";

/// Request parameters
///
/// JSON-RPC 2.0 only allows structured params: an ordered list (by-position)
/// or an object (by-name). An absent `params` is modelled as `Option::None`
/// on the request, never as an empty variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Params {
    /// By-position parameters
    Positional(Vec<Value>),

    /// By-name parameters
    Named(Map<String, Value>),
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Named(map)
    }
}

impl TryFrom<Value> for Params {
    type Error = Value;

    /// Only arrays and objects are valid params; anything else is handed back
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(values) => Ok(Params::Positional(values)),
            Value::Object(map) => Ok(Params::Named(map)),
            other => Err(other),
        }
    }
}

/// JSONRPC 2.0 Request message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// JSONRPC version - MUST be exactly "2.0"
    pub jsonrpc: String,

    /// Method name to be invoked
    pub method: String,

    /// Parameters for the method (omitted from the wire when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,

    /// Correlation id (omitted for fire-and-forget calls)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    /// Build a request. Pure: no id is reserved here, the caller decides.
    pub fn new(method: impl Into<String>, params: Option<Params>, id: Option<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Check if this is a notification (no id)
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSONRPC 2.0 Response message
///
/// Only produced by servers (see the `echo_server` binary). The client side
/// treats inbound responses as untyped JSON until they are validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// JSONRPC version - MUST be exactly "2.0"
    pub jsonrpc: String,

    /// Result value (required on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error object (required on error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,

    /// Request identifier from the original request
    pub id: Value,
}

impl Response {
    /// Create a success response
    pub fn success(result: Value, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(error: ErrorObject, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSONRPC 2.0 Error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error type indicator (must be integer)
    pub code: i32,

    /// Short error description
    pub message: String,

    /// Additional error information (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Pre-defined JSONRPC error codes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
        }
    }
}

impl ErrorObject {
    /// Create a new error object
    pub fn new(code: ErrorCode, data: Option<Value>) -> Self {
        Self {
            code: code as i32,
            message: code.message().to_string(),
            data,
        }
    }

    /// Create a custom error
    pub fn custom(code: i32, message: String, data: Option<Value>) -> Self {
        Self { code, message, data }
    }
}

/// The `(error, result)` pair a response handler receives
///
/// Both halves are copied verbatim from the inbound message. `into_result`
/// folds them into a `Result` for callers who prefer `?` over inspecting
/// the raw pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub error: Option<Value>,
    pub result: Option<Value>,
}

impl Outcome {
    pub fn from_parts(error: Option<Value>, result: Option<Value>) -> Self {
        Self { error, result }
    }

    /// `Ok(result)` unless an error object is present. A missing result
    /// becomes `Value::Null`; an explicit `"error": null` counts as no error.
    pub fn into_result(self) -> RpcResult<Value> {
        match self.error {
            None | Some(Value::Null) => Ok(self.result.unwrap_or(Value::Null)),
            Some(raw) => match serde_json::from_value::<ErrorObject>(raw.clone()) {
                Ok(error) => Err(RpcError::Remote {
                    code: error.code,
                    message: error.message,
                    data: error.data,
                }),
                Err(_) => Err(RpcError::Remote {
                    code: ErrorCode::InternalError as i32,
                    message: "Malformed error object".to_string(),
                    data: Some(raw),
                }),
            },
        }
    }
}
