//! JSON-RPC 2.0 framing
//!
//! Parses raw frames into [`Message`]s and emits response, error, and
//! notification envelopes. Classification is field-driven:
//!
//! - a present `id` key (even zero or the empty string) makes the frame a
//!   [`Request`]; an absent key makes it a [`Notification`]. A present but
//!   `null` id is rejected.
//! - `jsonrpc` must be exactly `"2.0"`.
//! - `params` must be an object or omitted; omitted is treated as `{}`.
//!
//! Malformed JSON yields `ParseError` (-32700); structural violations yield
//! `InvalidRequest` (-32600). Encoding always emits the `jsonrpc` field and
//! never escapes slashes.

use serde_json::{json, Map, Value};

use crate::error::ProtocolError;
use crate::protocol::{Message, Notification, Request, RequestId, JSONRPC_VERSION};

/// Parse a raw frame into a [`Message`].
pub fn parse(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::parse_error(format!("Parse error: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| ProtocolError::invalid_request("Message must be a JSON object"))?;

    match obj.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        _ => {
            return Err(ProtocolError::invalid_request(format!(
                "Invalid JSON-RPC version: expected \"{}\"",
                JSONRPC_VERSION
            )));
        }
    }

    let method = match obj.get("method") {
        Some(Value::String(method)) => method.clone(),
        Some(_) => return Err(ProtocolError::invalid_request("Method must be a string")),
        None => return Err(ProtocolError::invalid_request("Missing method")),
    };

    let mut params = match obj.get("params") {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(ProtocolError::invalid_request(
                "Params must be an object when present",
            ));
        }
    };
    let meta = params.remove("_meta");

    match obj.get("id") {
        None => Ok(Message::Notification(Notification { method, params })),
        Some(id) => {
            let id = parse_id(id)?;
            Ok(Message::Request(Request {
                id,
                method,
                params,
                meta,
            }))
        }
    }
}

fn parse_id(id: &Value) -> Result<RequestId, ProtocolError> {
    match id {
        Value::String(s) => Ok(RequestId::String(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| ProtocolError::invalid_request("Request id must be an integer")),
        _ => Err(ProtocolError::invalid_request(
            "Request id must be a string or integer",
        )),
    }
}

/// Build a success envelope as a JSON value.
pub fn result_envelope(id: &RequestId, result: Value, meta: Option<Value>) -> Value {
    let mut result = result;
    if let (Some(meta), Some(obj)) = (meta, result.as_object_mut()) {
        obj.insert("_meta".to_string(), meta);
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

/// Build an error envelope as a JSON value. A `None` id serializes as `null`,
/// used when the request id is unknown (e.g. the parse itself failed).
pub fn error_envelope(id: Option<&RequestId>, error: &ProtocolError) -> Value {
    let mut obj = json!({
        "code": error.code.code(),
        "message": error.message,
    });
    if let Some(data) = &error.data {
        obj["data"] = data.clone();
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": obj,
    })
}

/// Build a notification envelope as a JSON value.
pub fn notification_envelope(method: &str, params: Value, meta: Option<Value>) -> Value {
    let mut params = params;
    if let (Some(meta), Some(obj)) = (meta, params.as_object_mut()) {
        obj.insert("_meta".to_string(), meta);
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

/// Encode a success response.
pub fn encode_result(id: &RequestId, result: Value, meta: Option<Value>) -> String {
    serialize(&result_envelope(id, result, meta))
}

/// Encode an error response.
pub fn encode_error(id: Option<&RequestId>, error: &ProtocolError) -> String {
    serialize(&error_envelope(id, error))
}

/// Encode a notification.
pub fn encode_notification(method: &str, params: Value, meta: Option<Value>) -> String {
    serialize(&notification_envelope(method, params, meta))
}

fn serialize(envelope: &Value) -> String {
    // Envelopes are built from already-valid JSON values.
    serde_json::to_string(envelope).unwrap_or_else(|_| {
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Encoding failed"}}"#
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn parse_str(s: &str) -> Result<Message, ProtocolError> {
        parse(s.as_bytes())
    }

    #[test]
    fn parses_request_with_numeric_id() {
        let msg = parse_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#).unwrap();
        match msg {
            Message::Request(req) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "ping");
                assert!(req.params.is_empty());
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn zero_and_empty_string_ids_are_requests() {
        for frame in [
            r#"{"jsonrpc":"2.0","id":0,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","id":"","method":"ping"}"#,
        ] {
            assert!(matches!(parse_str(frame).unwrap(), Message::Request(_)));
        }
    }

    #[test]
    fn absent_id_is_notification() {
        let msg = parse_str(r#"{"jsonrpc":"2.0","method":"notifications/cancelled"}"#).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn null_id_is_rejected() {
        let err = parse_str(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse(b"not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
        assert!(err.message.starts_with("Parse error"));
    }

    #[test]
    fn wrong_version_is_invalid_request() {
        for frame in [
            r#"{"id":1,"method":"ping"}"#,
            r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#,
            r#"{"jsonrpc":2.0,"id":1,"method":"ping"}"#,
        ] {
            let err = parse_str(frame).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidRequest);
        }
    }

    #[test]
    fn missing_or_nonstring_method_is_invalid_request() {
        for frame in [
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":7}"#,
        ] {
            let err = parse_str(frame).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidRequest);
        }
    }

    #[test]
    fn non_object_params_is_invalid_request() {
        let err = parse_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":[1]}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn omitted_params_becomes_empty_object() {
        let msg = parse_str(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        match msg {
            Message::Request(req) => assert!(req.params.is_empty()),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn meta_is_lifted_from_params() {
        let msg = parse_str(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"x","_meta":{"k":1}}}"#,
        )
        .unwrap();
        match msg {
            Message::Request(req) => {
                assert_eq!(req.meta, Some(json!({"k": 1})));
                assert!(!req.params.contains_key("_meta"));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn result_roundtrip_preserves_id_and_result() {
        let id = RequestId::Number(9);
        let encoded = encode_result(&id, json!({"ok": true}), None);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], json!(9));
        assert_eq!(value["result"], json!({"ok": true}));
    }

    #[test]
    fn error_envelope_with_null_id() {
        let encoded = encode_error(None, &ProtocolError::parse_error("Parse error: bad"));
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
    }

    #[test]
    fn error_envelope_reparses_structurally() {
        let encoded = encode_error(
            Some(&RequestId::from("r")),
            &ProtocolError::not_found("Unknown tool: x").with_data(json!({"name": "x"})),
        );
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["id"], json!("r"));
        assert_eq!(value["error"]["code"], json!(-32001));
        assert_eq!(value["error"]["data"], json!({"name": "x"}));
    }

    #[test]
    fn slashes_are_not_escaped() {
        let encoded = encode_notification("notifications/progress", json!({}), None);
        assert!(encoded.contains("notifications/progress"));
    }

    #[test]
    fn notification_meta_lands_in_params() {
        let encoded = encode_notification("notifications/progress", json!({}), Some(json!({"t": 1})));
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["params"]["_meta"], json!({"t": 1}));
    }
}
