//! Error types for beacon-mcp
//!
//! ## JSON-RPC Error Codes
//!
//! Standard JSON-RPC 2.0 error codes are defined in the specification:
//! <https://www.jsonrpc.org/specification#error_object>
//!
//! | Code   | Message          | Meaning                                  |
//! |--------|------------------|------------------------------------------|
//! | -32700 | Parse error      | Invalid JSON was received                |
//! | -32600 | Invalid Request  | The JSON sent is not a valid Request     |
//! | -32601 | Method not found | The method does not exist / is not available |
//! | -32602 | Invalid params   | Invalid method parameter(s)              |
//! | -32603 | Internal error   | Internal JSON-RPC error                  |
//!
//! ## MCP-Specific Error Codes
//!
//! The server error range (-32000 to -32099) carries protocol-specific
//! conditions:
//!
//! | Code   | Name            | Meaning                                  |
//! |--------|-----------------|------------------------------------------|
//! | -32000 | ServerError     | Generic server error                     |
//! | -32001 | NotFound        | Unknown tool, resource, or prompt        |
//! | -32002 | Unauthorized    | Authentication required or failed        |
//! | -32003 | Forbidden       | Authorization denied                     |
//! | -32004 | Timeout         | Operation exceeded its time budget       |
//! | -32005 | ValidationError | Input failed validation                  |
//!
//! Errors come in two tiers. *Protocol errors* ([`ProtocolError`]) surface to
//! the client as JSON-RPC `error` envelopes and are translated exactly once,
//! at the dispatcher boundary. *Handler errors* raised from a tool callable
//! never become protocol errors; the dispatcher folds them into a successful
//! response whose `result.isError` is true.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC and MCP error codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Invalid JSON was received
    ParseError = -32700,
    /// The JSON sent is not a valid Request object
    InvalidRequest = -32600,
    /// The method does not exist / is not available
    MethodNotFound = -32601,
    /// Invalid method parameter(s)
    InvalidParams = -32602,
    /// Internal server error
    InternalError = -32603,
    /// Generic server error
    ServerError = -32000,
    /// Unknown tool, resource, or prompt
    NotFound = -32001,
    /// Authentication required or failed
    Unauthorized = -32002,
    /// Authorization denied
    Forbidden = -32003,
    /// Operation exceeded its time budget
    Timeout = -32004,
    /// Input failed validation
    ValidationError = -32005,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Wire-level JSON-RPC error object: `{code, message, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A typed protocol-level error raised inside the dispatcher.
///
/// Protocol errors carry one of the codes in [`ErrorCode`] and are encoded
/// into JSON-RPC error envelopes at the dispatcher boundary only. Middleware
/// and handlers raise them with `?`; nothing below the boundary encodes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<Value>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Convert into the wire-level error object.
    pub fn into_object(self) -> ErrorObject {
        ErrorObject {
            code: self.code.code(),
            message: self.message,
            data: self.data,
        }
    }
}

impl From<ProtocolError> for ErrorObject {
    fn from(err: ProtocolError) -> Self {
        err.into_object()
    }
}

/// beacon-mcp error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Handler(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create a handler-level error from any `Display` type.
    ///
    /// Handler errors raised from a tool callable become `isError` tool
    /// results; raised anywhere else they become `InternalError` envelopes.
    pub fn handler<E: std::fmt::Display>(err: E) -> Self {
        Error::Handler(err.to_string())
    }

    /// Translate into the protocol error encoded at the dispatcher boundary.
    ///
    /// `Protocol` errors keep their code; everything else collapses into
    /// `InternalError` with the raised message.
    pub fn into_protocol(self) -> ProtocolError {
        match self {
            Error::Protocol(err) => err,
            other => ProtocolError::internal(other.to_string()),
        }
    }
}

/// Result type alias for beacon-mcp
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_wire_values() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InvalidParams.code(), -32602);
        assert_eq!(ErrorCode::InternalError.code(), -32603);
        assert_eq!(ErrorCode::ServerError.code(), -32000);
        assert_eq!(ErrorCode::NotFound.code(), -32001);
        assert_eq!(ErrorCode::Unauthorized.code(), -32002);
        assert_eq!(ErrorCode::Forbidden.code(), -32003);
        assert_eq!(ErrorCode::Timeout.code(), -32004);
        assert_eq!(ErrorCode::ValidationError.code(), -32005);
    }

    #[test]
    fn protocol_error_into_object() {
        let obj = ProtocolError::not_found("Unknown tool: frob").into_object();
        assert_eq!(obj.code, -32001);
        assert_eq!(obj.message, "Unknown tool: frob");
        assert!(obj.data.is_none());
    }

    #[test]
    fn data_is_skipped_when_absent() {
        let obj: ErrorObject = ProtocolError::invalid_params("bad").into();
        let json = serde_json::to_value(&obj).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn handler_error_translates_to_internal() {
        let err = Error::handler("boom").into_protocol();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn protocol_error_keeps_code_through_translation() {
        let err: Error = ProtocolError::forbidden("no").into();
        let translated = err.into_protocol();
        assert_eq!(translated.code, ErrorCode::Forbidden);
    }
}
