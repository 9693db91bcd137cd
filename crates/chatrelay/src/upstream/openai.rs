//! Upstream completion client for OpenAI-compatible APIs
//!
//! Works with any endpoint exposing `POST {base_url}/chat/completions`
//! (OpenRouter by default). The API key is read from the environment
//! variable named in the config.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::parse_retry_after;
use super::sse::{ApiErrorBody, SseDecoder, SseEvent, StreamPayload, parse_stream_payload};
use super::{CompletionClient, FragmentStream, UpstreamError};
use crate::config::UpstreamConfig;
use crate::message::{Fragment, Message};

/// Completion client speaking the OpenAI chat-completions protocol
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    model: String,
    stream: bool,
    api_key: String,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Non-streaming chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Create a client, reading the API key from `config.api_key_env`
    ///
    /// Returns an error if the environment variable is not set.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            UpstreamError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;

        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(
        config: &UpstreamConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let base = url::Url::parse(&config.base_url).map_err(|e| {
            UpstreamError::Config(format!("Invalid upstream base URL '{}': {e}", config.base_url))
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Config(format!("Failed to create HTTP client: {e}")))?;

        let endpoint = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        info!(
            "Upstream client initialized with model: {}, endpoint: {}, stream: {}",
            config.model, endpoint, config.stream
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            stream: config.stream,
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<FragmentStream, UpstreamError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: self.stream,
        };

        debug!(
            messages = messages.len(),
            stream = self.stream,
            "Calling upstream at: {}",
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Too many requests".to_string());
            warn!(?retry_after, "Upstream rate limited the request");
            return Err(UpstreamError::RateLimited {
                retry_after,
                message,
            });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if self.stream {
            return Ok(sse_fragments(response));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        if let Some(error) = completion.error {
            let message = error
                .message
                .unwrap_or_else(|| "Upstream reported an error".to_string());
            return Err(UpstreamError::from_api_error(error.code.as_ref(), message));
        }

        let fragment = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .and_then(Fragment::new);

        Ok(Box::pin(stream::iter(fragment.map(Ok::<_, UpstreamError>))))
    }

    fn name(&self) -> &'static str {
        "openai-compatible"
    }
}

/// Turn a streaming response body into fragments as events complete
fn sse_fragments(response: reqwest::Response) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        loop {
            let (events, ended) = match body.next().await {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => {
                    yield Err(UpstreamError::Network(format!("Stream error: {e}")));
                    return;
                }
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for event in events {
                let data = match event {
                    SseEvent::Done => return,
                    SseEvent::Data(data) => data,
                };

                match parse_stream_payload(&data) {
                    StreamPayload::Fragment(fragment) => yield Ok(fragment),
                    StreamPayload::Error(e) => {
                        yield Err(e);
                        return;
                    }
                    StreamPayload::Empty => {}
                }
            }

            if ended {
                return;
            }
        }
    })
}
