//! JSON-RPC 2.0 framing for the league protocol. Decoding validates the
//! frame and envelope in a fixed order and fails at the first violation,
//! attaching `conversation_id` and `message_type` to the error data when
//! they were readable.

use super::{
    envelope::{Envelope, MessageType, Sender, PROTOCOL_VERSION, RPC_METHOD},
    error::{ErrorCode, RpcError},
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// JSON-RPC request frame. The `id` is a caller-chosen string mirrored in
/// the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: RequestParams,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(envelope: Envelope, payload: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: RPC_METHOD.to_string(),
            params: RequestParams { envelope, payload },
            id: Uuid::new_v4().to_string(),
        }
    }
}

/// JSON-RPC response frame carrying either a result or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub envelope: Envelope,
    pub payload: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, envelope: Envelope, payload: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(ResponseBody { envelope, payload }),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A request that passed the full validation order
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    /// Request id, mirrored into the response
    pub id: Value,
    pub envelope: Envelope,
    pub payload: Option<Value>,
}

/// Request id from a raw frame, used to mirror ids into error responses
/// even when validation fails
pub fn request_id(frame: &Value) -> Value {
    frame.get("id").cloned().unwrap_or(Value::Null)
}

fn str_field<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object.get(field).and_then(Value::as_str)
}

/// Error data context readable from a partially validated envelope
fn error_context(envelope: &Value) -> (Option<&str>, Option<&str>) {
    (
        str_field(envelope, "conversation_id"),
        str_field(envelope, "message_type"),
    )
}

fn fail(
    code: ErrorCode,
    message: impl Into<String>,
    envelope: &Value,
) -> RpcError {
    let (conversation_id, message_type) = error_context(envelope);
    RpcError::new(code, message).with_context(conversation_id, message_type)
}

/// Validates a parsed JSON-RPC frame in the documented order and produces
/// the typed request. The caller is responsible for step 1 (JSON parsing),
/// since only the transport sees raw bytes.
pub fn validate_request(frame: &Value) -> Result<ValidatedRequest, RpcError> {
    // Frame shape: jsonrpc version and routing method
    let jsonrpc = str_field(frame, "jsonrpc");
    let method = str_field(frame, "method");
    if jsonrpc != Some("2.0") || method != Some(RPC_METHOD) {
        return Err(RpcError::new(
            ErrorCode::InvalidRequest,
            "expected jsonrpc 2.0 call to league.handle",
        ));
    }

    let params = frame.get("params").unwrap_or(&Value::Null);
    let envelope = match params.get("envelope") {
        Some(value) if value.is_object() => value,
        _ => {
            return Err(RpcError::new(
                ErrorCode::InvalidRequest,
                "params.envelope object is required",
            ))
        }
    };

    // Protocol version pin
    match str_field(envelope, "protocol") {
        Some(PROTOCOL_VERSION) => {}
        other => {
            return Err(fail(
                ErrorCode::ProtocolVersionMismatch,
                format!(
                    "unsupported protocol version: {}",
                    other.unwrap_or("<missing>")
                ),
                envelope,
            ))
        }
    }

    // Base field presence, in a fixed order so the first missing field is
    // always the one reported
    for field in ["message_type", "sender", "timestamp", "conversation_id"] {
        if str_field(envelope, field).is_none() {
            return Err(fail(
                ErrorCode::MissingRequiredField,
                format!("missing required field: {field}"),
                envelope,
            ));
        }
    }

    // Sender format
    let sender_raw = str_field(envelope, "sender").unwrap_or_default();
    if Sender::parse(sender_raw).is_none() {
        return Err(fail(
            ErrorCode::InvalidSender,
            format!("invalid sender: {sender_raw}"),
            envelope,
        ));
    }

    // Timestamp must parse with an explicit UTC zero offset
    let timestamp_raw = str_field(envelope, "timestamp").unwrap_or_default();
    match DateTime::parse_from_rfc3339(timestamp_raw) {
        Ok(parsed) if parsed.offset().local_minus_utc() == 0 => {}
        _ => {
            return Err(fail(
                ErrorCode::InvalidTimestamp,
                format!("invalid timestamp: {timestamp_raw}"),
                envelope,
            ))
        }
    }

    // Conversation id is a UUID v4, and so is every other id field when
    // present: the manager mints them all with v4, so anything else never
    // came from this league and fails here rather than in a handler
    let conversation_raw = str_field(envelope, "conversation_id").unwrap_or_default();
    match Uuid::parse_str(conversation_raw) {
        Ok(uuid) if uuid.get_version_num() == 4 => {}
        _ => {
            return Err(fail(
                ErrorCode::InvalidUuid,
                "conversation_id is not a valid UUID v4",
                envelope,
            ))
        }
    }
    for field in ["league_id", "round_id", "match_id"] {
        if let Some(value) = envelope.get(field) {
            let valid = value
                .as_str()
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .map(|uuid| uuid.get_version_num() == 4)
                .unwrap_or(false);
            if !valid {
                return Err(fail(
                    ErrorCode::InvalidUuid,
                    format!("field {field} is not a valid UUID v4"),
                    envelope,
                ));
            }
        }
    }

    // Message type must be part of the catalog
    let message_type_raw = str_field(envelope, "message_type").unwrap_or_default();
    let message_type = match MessageType::from_str(message_type_raw) {
        Some(value) => value,
        None => {
            return Err(fail(
                ErrorCode::UnknownMessageType,
                format!("unknown message type: {message_type_raw}"),
                envelope,
            ))
        }
    };

    // Contextual fields required by this message type
    for field in message_type.required_context() {
        let present = envelope
            .get(field.field_name())
            .map(|value| !value.is_null())
            .unwrap_or(false);
        if !present {
            return Err(fail(
                ErrorCode::MissingRequiredField,
                format!("missing required field: {}", field.field_name()),
                envelope,
            ));
        }
    }

    // Everything structural held, so the typed decode should not fail
    let envelope: Envelope = serde_json::from_value(envelope.clone()).map_err(|err| {
        RpcError::new(
            ErrorCode::InvalidRequest,
            format!("envelope decode failed: {err}"),
        )
    })?;

    Ok(ValidatedRequest {
        id: request_id(frame),
        envelope,
        payload: params.get("payload").cloned(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::envelope::Sender;
    use serde_json::json;

    fn request_value() -> Value {
        let envelope = Envelope::new(
            MessageType::AgentReadyRequest,
            Sender::player("alice"),
        )
        .with_auth_token(Uuid::new_v4().to_string())
        .with_league_id(Uuid::new_v4());
        serde_json::to_value(JsonRpcRequest::new(envelope, Some(json!({})))).unwrap()
    }

    #[test]
    fn test_valid_request_passes() {
        let frame = request_value();
        let validated = validate_request(&frame).unwrap();
        assert_eq!(
            validated.envelope.message_type,
            MessageType::AgentReadyRequest
        );
        assert_eq!(validated.payload, Some(json!({})));
    }

    #[test]
    fn test_round_trip() {
        let frame = request_value();
        let validated = validate_request(&frame).unwrap();
        let rebuilt = serde_json::to_value(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: RPC_METHOD.to_string(),
            params: RequestParams {
                envelope: validated.envelope,
                payload: validated.payload,
            },
            id: frame.get("id").unwrap().as_str().unwrap().to_string(),
        })
        .unwrap();
        assert_eq!(frame, rebuilt);
    }

    #[test]
    fn test_bad_method_rejected() {
        let mut frame = request_value();
        frame["method"] = json!("other.method");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn test_protocol_version_checked_before_fields() {
        let mut frame = request_value();
        frame["params"]["envelope"]["protocol"] = json!("league.v1");
        // Also break a later rule to prove version wins
        frame["params"]["envelope"]
            .as_object_mut()
            .unwrap()
            .remove("sender");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::ProtocolVersionMismatch.code());
    }

    #[test]
    fn test_missing_field_reported_by_name() {
        let mut frame = request_value();
        frame["params"]["envelope"]
            .as_object_mut()
            .unwrap()
            .remove("timestamp");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::MissingRequiredField.code());
        assert!(error.message.contains("timestamp"));
    }

    #[test]
    fn test_sender_checked_before_timestamp() {
        let mut frame = request_value();
        frame["params"]["envelope"]["sender"] = json!("intruder:x");
        frame["params"]["envelope"]["timestamp"] = json!("not-a-time");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidSender.code());
    }

    #[test]
    fn test_non_utc_timestamp_rejected() {
        let mut frame = request_value();
        frame["params"]["envelope"]["timestamp"] = json!("2026-01-01T10:00:00+02:00");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidTimestamp.code());
    }

    #[test]
    fn test_unknown_message_type() {
        let mut frame = request_value();
        frame["params"]["envelope"]["message_type"] = json!("TELEPORT_REQUEST");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::UnknownMessageType.code());
        // Error data carries the correlation fields
        let data = error.data.unwrap();
        assert!(data.get("conversation_id").is_some());
        assert_eq!(data["message_type"], json!("TELEPORT_REQUEST"));
    }

    #[test]
    fn test_contextual_fields_enforced() {
        let mut frame = request_value();
        frame["params"]["envelope"]
            .as_object_mut()
            .unwrap()
            .remove("league_id");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::MissingRequiredField.code());
        assert!(error.message.contains("league_id"));
    }

    #[test]
    fn test_conversation_id_must_be_v4() {
        let mut frame = request_value();
        // A valid UUID, but v1 layout
        frame["params"]["envelope"]["conversation_id"] =
            json!("c232ab00-9414-11ec-b3c8-9f68deced846");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidUuid.code());
    }

    #[test]
    fn test_other_id_fields_must_be_v4() {
        let mut frame = request_value();
        // league ids are minted as v4, so a v1 value is rejected by the
        // codec, not left for a handler to discover
        frame["params"]["envelope"]["league_id"] =
            json!("c232ab00-9414-11ec-b3c8-9f68deced846");
        let error = validate_request(&frame).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidUuid.code());
        assert!(error.message.contains("league_id"));
    }
}
