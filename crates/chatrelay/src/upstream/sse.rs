//! Incremental server-sent events decoding for streaming completions
//!
//! Upstream chunks arrive at arbitrary byte boundaries. The decoder keeps
//! raw bytes until a blank line closes an event, so multi-byte characters
//! split across chunks are never mangled.
//!
//! SSE format:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hello"}}]}
//!
//! : comment lines are ignored
//! data: [DONE]
//! ```

use serde::Deserialize;

use super::UpstreamError;
use crate::message::Fragment;

/// Represents a parsed SSE event
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Data event containing the payload
    Data(String),
    /// Terminal [DONE] marker
    Done,
}

/// Stateful decoder turning raw byte chunks into complete SSE events
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a separator
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        // A separator can straddle the previous chunk, so back up by its
        // longest length minus one
        let mut from = self.scanned.saturating_sub(3);
        while let Some((end, separator_len)) = find_event_boundary(&self.buffer, from) {
            let block: Vec<u8> = self.buffer.drain(..end + separator_len).collect();
            if let Some(event) = parse_event_block(&block[..end]) {
                events.push(event);
            }
            from = 0;
        }
        self.scanned = self.buffer.len();
        events
    }

    /// Flush a trailing event that was not closed by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        parse_event_block(&block)
    }
}

fn find_event_boundary(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

fn parse_event_block(block: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(block);
    let mut data: Option<String> = None;

    for line in text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match data {
            Some(ref mut current) => {
                current.push('\n');
                current.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    let data = data?;
    if data.trim() == "[DONE]" {
        Some(SseEvent::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseEvent::Data(data))
    }
}

/// Meaning of one OpenAI-style stream payload
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// A non-empty content delta
    Fragment(Fragment),
    /// An in-band provider error; the stream must end
    Error(UpstreamError),
    /// Role-only, finish-reason, usage or unparseable payloads
    Empty,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub(crate) code: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// Interpret the JSON payload of a `data:` event
///
/// Chunks look like:
/// ```json
/// {"id":"chatcmpl-123","choices":[{"index":0,"delta":{"content":"Hello"}}]}
/// ```
pub fn parse_stream_payload(data: &str) -> StreamPayload {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!("Skipping unparseable stream payload: {e}");
            return StreamPayload::Empty;
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .message
            .unwrap_or_else(|| "Upstream reported an error".to_string());
        return StreamPayload::Error(UpstreamError::from_api_error(error.code.as_ref(), message));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .and_then(Fragment::new)
        .map(StreamPayload::Fragment)
        .unwrap_or(StreamPayload::Empty)
}
