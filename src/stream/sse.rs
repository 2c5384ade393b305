use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};

use crate::error::ChatStreamError;

const SSE_DELIMITER: &str = "\n\n";
const DEFAULT_EVENT_NAME: &str = "message";

/// One dispatched server-sent event: its name and joined data lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

pub(crate) fn create_sse_stream<T, F>(
    response: reqwest::Response,
    parser: F,
) -> Pin<Box<dyn Stream<Item = Result<T, ChatStreamError>> + Send>>
where
    T: Send + 'static,
    F: Fn(&SseFrame) -> Result<Option<T>, ChatStreamError> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .scan(SseState::default(), move |state, chunk| {
            let results = handle_chunk(state, chunk, &parser);
            async move { Some(results) }
        })
        .flat_map(futures::stream::iter);

    Box::pin(stream)
}

#[derive(Default)]
struct SseState {
    buffer: String,
    utf8_buffer: Vec<u8>,
}

fn handle_chunk<T, F>(
    state: &mut SseState,
    chunk: Result<Bytes, reqwest::Error>,
    parser: &F,
) -> Vec<Result<T, ChatStreamError>>
where
    F: Fn(&SseFrame) -> Result<Option<T>, ChatStreamError>,
{
    let bytes = match chunk {
        Ok(bytes) => bytes,
        Err(err) => return vec![Err(ChatStreamError::HttpError(err.to_string()))],
    };

    state.push_bytes(&bytes);
    state.drain_events(parser)
}

impl SseState {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.utf8_buffer.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.utf8_buffer) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.utf8_buffer.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    self.consume_valid_prefix(valid_up_to);
                    // `None` means a sequence cut at the chunk end: keep it
                    // for the next chunk.
                    let Some(invalid_len) = err.error_len() else {
                        break;
                    };
                    log::debug!("replacing {invalid_len} invalid UTF-8 byte(s) in event stream");
                    self.buffer.push(char::REPLACEMENT_CHARACTER);
                    self.utf8_buffer.drain(..invalid_len);
                }
            }
        }
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    fn consume_valid_prefix(&mut self, valid_up_to: usize) {
        if valid_up_to == 0 {
            return;
        }

        let valid = String::from_utf8_lossy(&self.utf8_buffer[..valid_up_to]);
        self.buffer.push_str(&valid);
        self.utf8_buffer.drain(..valid_up_to);
    }

    fn drain_events<T, F>(&mut self, parser: &F) -> Vec<Result<T, ChatStreamError>>
    where
        F: Fn(&SseFrame) -> Result<Option<T>, ChatStreamError>,
    {
        let mut results = Vec::new();
        while let Some(raw) = self.next_event() {
            let Some(frame) = parse_frame(&raw) else {
                continue;
            };
            match parser(&frame) {
                Ok(Some(item)) => results.push(Ok(item)),
                Ok(None) => {}
                Err(err) => results.push(Err(err)),
            }
        }
        results
    }

    fn next_event(&mut self) -> Option<String> {
        let pos = self.buffer.find(SSE_DELIMITER)?;
        let end = pos + SSE_DELIMITER.len();
        let event = self.buffer[..end].to_string();
        self.buffer.drain(..end);
        Some(event)
    }
}

/// Parses one raw block into a frame. Comment-only blocks yield `None`.
pub(crate) fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    if event.is_none() && data.is_none() {
        return None;
    }
    Some(SseFrame {
        event: event.unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
        data: data.unwrap_or_default(),
    })
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
