//! Server-sent event transport for the chat stream.

mod event;
mod sse;

use std::pin::Pin;

use futures::stream::Stream;

use crate::error::ChatStreamError;

pub use event::{
    CompletedPayload, ConnectedPayload, IterationPayload, StreamEvent, TokenUsage,
    ToolCallPayload, ToolCallingPayload, ToolCompletePayload, GENERIC_STREAM_ERROR,
};
pub use sse::SseFrame;

pub(crate) use event::decode_or_skip;
pub(crate) use sse::create_sse_stream;

/// Decoded events of one open stream. `Err` items are transport failures.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatStreamError>> + Send>>;
