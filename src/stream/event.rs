use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chat::ToolOutcome;
use crate::error::ChatStreamError;

use super::sse::SseFrame;

/// Message used when an `error` event carries no readable message.
pub const GENERIC_STREAM_ERROR: &str = "An error occurred while processing your request";

/// Payload of the `connected` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub execution_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of the `iteration` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationPayload {
    pub iteration: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Tool name and arguments as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Payload of the `tool_calling` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallingPayload {
    #[serde(default)]
    pub iteration: Option<u32>,
    pub tool_call: ToolCallPayload,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Payload of the `tool_complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCompletePayload {
    #[serde(default)]
    pub iteration: Option<u32>,
    pub tool_call: ToolCallPayload,
    pub tool_result: ToolOutcome,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Token accounting attached to the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt: u32,
    #[serde(default)]
    pub completion: u32,
}

/// Payload of the `completed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    #[serde(default)]
    pub iteration: Option<u32>,
    pub message: String,
    #[serde(default)]
    pub tokens: Option<TokenUsage>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

/// A named event from the chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected(ConnectedPayload),
    Iteration(IterationPayload),
    ToolCalling(ToolCallingPayload),
    ToolComplete(ToolCompletePayload),
    Heartbeat,
    Completed(CompletedPayload),
    Error { message: String },
    End,
    Timeout,
}

impl StreamEvent {
    /// Decodes a frame. Unknown event names yield `Ok(None)`.
    ///
    /// `error` frames never fail to decode: an unreadable payload falls back
    /// to [`GENERIC_STREAM_ERROR`].
    pub fn decode(frame: &SseFrame) -> Result<Option<Self>, ChatStreamError> {
        let event = match frame.event.as_str() {
            "connected" => Self::Connected(payload(frame)?),
            "iteration" => Self::Iteration(payload(frame)?),
            "tool_calling" => Self::ToolCalling(payload(frame)?),
            "tool_complete" => Self::ToolComplete(payload(frame)?),
            "heartbeat" => Self::Heartbeat,
            "completed" => Self::Completed(payload(frame)?),
            "error" => Self::Error {
                message: error_message(&frame.data),
            },
            "end" => Self::End,
            "timeout" => Self::Timeout,
            other => {
                log::debug!("ignoring unknown stream event `{other}`");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    /// Name of the event on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Iteration(_) => "iteration",
            Self::ToolCalling(_) => "tool_calling",
            Self::ToolComplete(_) => "tool_complete",
            Self::Heartbeat => "heartbeat",
            Self::Completed(_) => "completed",
            Self::Error { .. } => "error",
            Self::End => "end",
            Self::Timeout => "timeout",
        }
    }

    /// Whether receiving this event closes the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::End | Self::Timeout)
    }
}

fn payload<T: DeserializeOwned>(frame: &SseFrame) -> Result<T, ChatStreamError> {
    serde_json::from_str(&frame.data).map_err(|err| ChatStreamError::ResponseFormatError {
        message: format!("invalid `{}` payload: {err}", frame.event),
        raw_response: frame.data.clone(),
    })
}

fn error_message(data: &str) -> String {
    serde_json::from_str::<ErrorPayload>(data)
        .map(|payload| payload.message)
        .ok()
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| GENERIC_STREAM_ERROR.to_string())
}

/// Frame parser used by the HTTP transport: malformed payloads are logged
/// and skipped rather than ending the stream.
pub(crate) fn decode_or_skip(frame: &SseFrame) -> Result<Option<StreamEvent>, ChatStreamError> {
    match StreamEvent::decode(frame) {
        Ok(event) => Ok(event),
        Err(err) => {
            log::warn!("skipping stream event: {err}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn decodes_tool_complete() {
        let frame = SseFrame::new(
            "tool_complete",
            r#"{"iteration":1,"tool_call":{"name":"search_cases","parameters":{"query":"theft"}},
               "tool_result":{"success":true,"data":{"cases":[1,2]},"error":null},
               "latency_ms":820,"timestamp":"2024-05-01T10:00:00Z"}"#,
        );

        let Some(StreamEvent::ToolComplete(payload)) = StreamEvent::decode(&frame).unwrap() else {
            panic!("expected tool_complete");
        };
        assert_eq!(payload.tool_call.name, "search_cases");
        assert_eq!(payload.tool_call.parameters["query"], json!("theft"));
        assert!(payload.tool_result.success);
        assert_eq!(payload.tool_result.data, json!({"cases": [1, 2]}));
        assert_eq!(payload.latency_ms, Some(820));
    }

    #[test]
    fn decodes_completed_with_tokens() {
        let frame = SseFrame::new(
            "completed",
            r#"{"iteration":2,"message":"Theft requires intent.","tokens":{"prompt":10,"completion":4},"timestamp":1}"#,
        );

        let Some(StreamEvent::Completed(payload)) = StreamEvent::decode(&frame).unwrap() else {
            panic!("expected completed");
        };
        assert_eq!(payload.message, "Theft requires intent.");
        assert_eq!(
            payload.tokens,
            Some(TokenUsage {
                prompt: 10,
                completion: 4
            })
        );
    }

    #[rstest]
    #[case(r#"{"message":"Rate limited"}"#, "Rate limited")]
    #[case("not json", GENERIC_STREAM_ERROR)]
    #[case("", GENERIC_STREAM_ERROR)]
    #[case(r#"{"message":"  "}"#, GENERIC_STREAM_ERROR)]
    fn error_event_falls_back_to_generic_message(#[case] data: &str, #[case] expected: &str) {
        let event = StreamEvent::decode(&SseFrame::new("error", data)).unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::Error {
                message: expected.to_string()
            })
        );
    }

    #[rstest]
    #[case("heartbeat", StreamEvent::Heartbeat)]
    #[case("end", StreamEvent::End)]
    #[case("timeout", StreamEvent::Timeout)]
    fn payloadless_events_ignore_data(#[case] name: &str, #[case] expected: StreamEvent) {
        let event = StreamEvent::decode(&SseFrame::new(name, "")).unwrap();
        assert_eq!(event, Some(expected));
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert_eq!(StreamEvent::decode(&SseFrame::new("progress", "{}")).unwrap(), None);
    }

    #[test]
    fn malformed_payload_is_an_error_but_skippable() {
        let frame = SseFrame::new("tool_calling", "{\"tool_call\": 5}");
        assert!(matches!(
            StreamEvent::decode(&frame),
            Err(ChatStreamError::ResponseFormatError { .. })
        ));
        assert_eq!(decode_or_skip(&frame).unwrap(), None);
    }

    #[test]
    fn terminal_events() {
        assert!(StreamEvent::End.is_terminal());
        assert!(StreamEvent::Timeout.is_terminal());
        assert!(StreamEvent::Error {
            message: "x".into()
        }
        .is_terminal());
        assert!(!StreamEvent::Heartbeat.is_terminal());
    }
}
