//! Upstream completion client abstraction
//!
//! A completion client takes the full message sequence (system instruction
//! included) and returns a lazy, single-pass stream of text fragments.

mod error;
mod openai;
mod sse;

pub use error::UpstreamError;
pub use openai::OpenAiCompatibleClient;
pub use sse::{SseDecoder, SseEvent, StreamPayload, parse_stream_payload};

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;

use crate::message::{Fragment, Message};

/// Ordered fragments of one completion; consumed once by exactly one caller
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, UpstreamError>> + Send>>;

/// Trait for chat-completion backends
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a completion for `messages`
    ///
    /// Fails before returning a stream when the request itself is rejected
    /// (rate limit, auth, malformed request, network). Failures after the
    /// response started arrive as an `Err` item that ends the stream.
    async fn complete(&self, messages: Vec<Message>) -> Result<FragmentStream, UpstreamError>;

    /// Client name for logging
    fn name(&self) -> &'static str;
}
