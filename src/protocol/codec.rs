//! Wire codec.
//!
//! Encodes outgoing requests to JSON text frames and classifies incoming
//! frames as either a command response or an event. Payloads are passed
//! through as opaque [`Value`]s; no domain schema is known here.
//!
//! # Classification
//!
//! | Fields present | Frame |
//! |----------------|-------|
//! | `id` (unsigned integer), no `method` | [`DecodedFrame::Response`] |
//! | `method` (string), no `id` | [`DecodedFrame::Event`] |
//! | anything else | [`Error::ProtocolFormat`] |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::{Event, RemoteError, Request, Response};

// ============================================================================
// DecodedFrame
// ============================================================================

/// An inbound frame after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// Reply to a command, routed to the pending table.
    Response(Response),
    /// Push notification, routed to the event router.
    Event(Event),
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a request into a text frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if the params fail to serialize.
pub fn encode(request: &Request) -> Result<String> {
    Ok(serde_json::to_string(request)?)
}

/// Encodes a response into a text frame.
///
/// Used by remote-end stubs and in-memory peers.
///
/// # Errors
///
/// Returns [`Error::Json`] if the payload fails to serialize.
pub fn encode_response(response: &Response) -> Result<String> {
    let frame = match &response.outcome {
        Ok(result) => json!({ "id": response.id, "result": result }),
        Err(error) => json!({ "id": response.id, "error": error }),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Encodes an event into a text frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if the payload fails to serialize.
pub fn encode_event(event: &Event) -> Result<String> {
    let mut frame = json!({ "method": event.method, "params": event.params });
    if let Some(session_id) = &event.session_id {
        frame["sessionId"] = Value::String(session_id.clone());
    }
    Ok(serde_json::to_string(&frame)?)
}

// ============================================================================
// Decoding
// ============================================================================

/// Classifies an inbound text frame.
///
/// # Errors
///
/// Returns [`Error::ProtocolFormat`] if the frame is not a JSON object or
/// matches neither the response nor the event shape.
pub fn decode(text: &str) -> Result<DecodedFrame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::protocol_format(format!("invalid JSON: {e}")))?;

    let Value::Object(mut map) = value else {
        return Err(Error::protocol_format("frame is not a JSON object"));
    };

    match (map.remove("id"), map.remove("method")) {
        (Some(_), Some(_)) => Err(Error::protocol_format(
            "frame carries both an id and a method",
        )),
        (Some(id), None) => decode_response(id, map).map(DecodedFrame::Response),
        (None, Some(Value::String(method))) => Ok(DecodedFrame::Event(decode_event(method, map))),
        (None, Some(other)) => Err(Error::protocol_format(format!(
            "event method is not a string: {other}"
        ))),
        (None, None) => Err(Error::protocol_format(
            "frame carries neither an id nor a method",
        )),
    }
}

/// Decodes a request frame, as seen by the remote end.
///
/// # Errors
///
/// Returns [`Error::ProtocolFormat`] if the frame is not a request.
pub fn decode_request(text: &str) -> Result<Request> {
    serde_json::from_str(text).map_err(|e| Error::protocol_format(format!("invalid request: {e}")))
}

fn decode_response(id: Value, mut map: Map<String, Value>) -> Result<Response> {
    let id = id
        .as_u64()
        .map(CommandId::new)
        .ok_or_else(|| Error::protocol_format(format!("response id is not an unsigned integer: {id}")))?;

    // error wins over result
    if let Some(error) = map.remove("error") {
        let error = match serde_json::from_value::<RemoteError>(error) {
            Ok(error) => error,
            Err(e) => RemoteError::new(0, format!("malformed error object: {e}")),
        };
        return Ok(Response::failure(id, error));
    }

    match map.remove("result") {
        Some(result) => Ok(Response::success(id, result)),
        None => Err(Error::protocol_format(format!(
            "response {id} carries neither result nor error"
        ))),
    }
}

fn decode_event(method: String, mut map: Map<String, Value>) -> Event {
    let params = map.remove("params").unwrap_or(Value::Null);
    let session_id = match map.remove("sessionId") {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    Event {
        method,
        params,
        session_id,
    }
}

// ============================================================================
// Tests
// ============================================================================
