//! Kurento JSON-RPC 2.0 wire format.
//!
//! Pure functions only: building request frames and classifying inbound
//! frames.  The socket handling lives in [`super::client`].
//!
//! # Frames
//!
//! ```json
//! → {"jsonrpc":"2.0","id":1,"method":"create",
//!    "params":{"type":"MediaPipeline","constructorParams":{},"properties":{}}}
//! ← {"jsonrpc":"2.0","id":1,"result":{"value":"6ba9…_kurento.MediaPipeline","sessionId":"d8e…"}}
//!
//! → {"jsonrpc":"2.0","id":2,"method":"invoke",
//!    "params":{"object":"…WebRtcEndpoint","operation":"processOffer",
//!              "operationParams":{"offer":"v=0…"},"sessionId":"d8e…"}}
//! ← {"jsonrpc":"2.0","id":2,"error":{"code":40101,"message":"Object not found"}}
//! ```
//!
//! The server also sends `onEvent` requests with a `method` and no `id` we
//! issued; those are reported as [`Incoming::Notification`].

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::application::pipeline::PipelineError;

pub const METHOD_CREATE: &str = "create";
pub const METHOD_INVOKE: &str = "invoke";
pub const METHOD_RELEASE: &str = "release";

pub const TYPE_MEDIA_PIPELINE: &str = "MediaPipeline";
pub const TYPE_WEBRTC_ENDPOINT: &str = "WebRtcEndpoint";

/// Successful `result` object of a response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpcResult {
    pub value: Option<Value>,
    pub session_id: Option<String>,
}

impl RpcResult {
    /// The `value` field as a string, e.g. an object id or an SDP answer.
    pub fn string_value(self, method: &str) -> Result<String, PipelineError> {
        match self.value {
            Some(Value::String(s)) => Ok(s),
            other => Err(PipelineError::MalformedResponse(format!(
                "{method}: expected string value, got {}",
                other.unwrap_or(Value::Null)
            ))),
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to request `id`.
    Response {
        id: u64,
        result: Result<RpcResult, PipelineError>,
    },
    /// Server-initiated request such as `onEvent`.
    Notification { method: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<ResultBody>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultBody {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

/// `params` of a `create` request.
pub fn create_params(type_name: &str, constructor_params: Value) -> Value {
    json!({
        "type": type_name,
        "constructorParams": constructor_params,
        "properties": {},
    })
}

/// `params` of an `invoke` request.
pub fn invoke_params(object: &str, operation: &str, operation_params: Value) -> Value {
    json!({
        "object": object,
        "operation": operation,
        "operationParams": operation_params,
    })
}

/// `params` of a `release` request.
pub fn release_params(object: &str) -> Value {
    json!({ "object": object })
}

/// Serializes a request frame, adding `sessionId` to `params` when known.
pub fn encode_request(
    id: u64,
    method: &str,
    mut params: Value,
    session_id: Option<&str>,
) -> String {
    if let (Some(session), Value::Object(map)) = (session_id, &mut params) {
        map.insert("sessionId".to_string(), Value::String(session.to_string()));
    }
    let mut frame = Map::new();
    frame.insert("jsonrpc".to_string(), json!("2.0"));
    frame.insert("id".to_string(), json!(id));
    frame.insert("method".to_string(), json!(method));
    frame.insert("params".to_string(), params);
    Value::Object(frame).to_string()
}

/// Classifies one inbound text frame.
///
/// # Errors
///
/// [`PipelineError::MalformedResponse`] if the frame is not JSON, or is
/// neither a response with a numeric `id` nor a request with a `method`.
pub fn parse_incoming(text: &str) -> Result<Incoming, PipelineError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| PipelineError::MalformedResponse(format!("invalid JSON-RPC frame: {e}")))?;

    if let Some(method) = envelope.method {
        return Ok(Incoming::Notification { method });
    }

    let id = envelope
        .id
        .as_ref()
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            PipelineError::MalformedResponse("response without numeric id".to_string())
        })?;

    let result = match (envelope.error, envelope.result) {
        (Some(error), _) => Err(PipelineError::Rpc {
            code: error.code,
            message: error.message,
        }),
        (None, Some(body)) => Ok(RpcResult {
            value: body.value,
            session_id: body.session_id,
        }),
        (None, None) => Ok(RpcResult::default()),
    };

    Ok(Incoming::Response { id, result })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_frame(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_create_pipeline_request_shape() {
        let text = encode_request(
            1,
            METHOD_CREATE,
            create_params(TYPE_MEDIA_PIPELINE, json!({})),
            None,
        );
        assert_eq!(
            parse_frame(&text),
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "create",
                "params": {"type": "MediaPipeline", "constructorParams": {}, "properties": {}}
            })
        );
    }

    #[test]
    fn test_request_carries_session_id_once_known() {
        let text = encode_request(
            7,
            METHOD_RELEASE,
            release_params("ep-1"),
            Some("sess-9"),
        );
        let frame = parse_frame(&text);
        assert_eq!(frame["params"]["sessionId"], "sess-9");
        assert_eq!(frame["params"]["object"], "ep-1");
    }

    #[test]
    fn test_invoke_process_offer_shape() {
        let params = invoke_params("ep-1", "processOffer", json!({"offer": "v=0"}));
        assert_eq!(params["operationParams"]["offer"], "v=0");
        assert_eq!(params["operation"], "processOffer");
    }

    #[test]
    fn test_parse_success_response() {
        // Arrange
        let text = r#"{"jsonrpc":"2.0","id":3,"result":{"value":"p-1","sessionId":"s-1"}}"#;

        // Act
        let incoming = parse_incoming(text).unwrap();

        // Assert
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 3,
                result: Ok(RpcResult {
                    value: Some(json!("p-1")),
                    session_id: Some("s-1".to_string()),
                }),
            }
        );
    }

    #[test]
    fn test_parse_error_response() {
        let text = r#"{"jsonrpc":"2.0","id":4,"error":{"code":40101,"message":"Object not found","data":{}}}"#;
        let Incoming::Response { id, result } = parse_incoming(text).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(id, 4);
        assert_eq!(
            result,
            Err(PipelineError::Rpc {
                code: 40101,
                message: "Object not found".to_string()
            })
        );
    }

    #[test]
    fn test_parse_release_response_without_value() {
        let text = r#"{"jsonrpc":"2.0","id":5,"result":{"sessionId":"s-1"}}"#;
        let Incoming::Response { result, .. } = parse_incoming(text).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(result.unwrap().value, None);
    }

    #[test]
    fn test_parse_server_event_is_notification() {
        let text = r#"{"jsonrpc":"2.0","id":99,"method":"onEvent","params":{"value":{}}}"#;
        assert_eq!(
            parse_incoming(text).unwrap(),
            Incoming::Notification {
                method: "onEvent".to_string()
            }
        );
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        assert!(matches!(
            parse_incoming("<html>"),
            Err(PipelineError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_string_value_rejects_missing_value() {
        let err = RpcResult::default().string_value("create").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }
}
