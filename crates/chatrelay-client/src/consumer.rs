//! Client stream consumer
//!
//! Posts the conversation to the relay, decodes the streamed reply into the
//! conversation as it arrives and retries rate-limited sends on a fixed
//! delay.
//!
//! Per send:
//! ```text
//! Idle -> Sending -> Streaming -> Done
//!            |  ^
//!            |  +-- RetryWait (relay answered 429, attempts left)
//!            +----> Failed (any other status, transport error, attempts exhausted)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use chatrelay_server::message::Message;

use crate::conversation::Conversation;
use crate::decoder::Utf8Decoder;
use crate::delay::{Delay, TokioDelay};
use crate::error::{ClientError, ClientResult};
use crate::view::ConversationView;

const RATE_LIMIT_APOLOGY: &str =
    "I'm sorry, but I've reached my daily usage limit. Please try again later.";
const GENERIC_APOLOGY: &str = "I'm sorry, but I encountered an error. Please try again later.";

/// Retry behavior for rate-limited sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per send, the first one included
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(5000),
        }
    }
}

/// Lifecycle state of one send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    /// Request posted, waiting for the relay's status
    Sending { attempt: u32 },
    /// Reply chunks are being appended
    Streaming,
    /// Rate limited, waiting before the next attempt
    RetryWait { attempt: u32 },
    Done,
    Failed,
}

/// Why a send failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rate limited on every attempt
    RateLimited,
    /// Any other relay or transport failure
    Other,
}

impl FailureKind {
    /// Assistant message shown in place of a reply
    pub fn apology(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => RATE_LIMIT_APOLOGY,
            FailureKind::Other => GENERIC_APOLOGY,
        }
    }
}

/// Result of a finished send
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The reply was streamed and committed to the conversation
    Completed(Message),
    /// The send failed and `apology` was appended to the conversation
    Failed { kind: FailureKind, apology: Message },
}

impl SendOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SendOutcome::Completed(_))
    }
}

enum AttemptOutcome {
    Completed(Message),
    RateLimited,
    Failed,
}

struct ConsumerInner {
    client: Client,
    relay_url: Url,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
    in_flight: AtomicBool,
}

/// Sends conversations to the relay and streams replies back into them
///
/// Clones share the in-flight flag, so at most one send runs at a time
/// across all clones.
#[derive(Clone)]
pub struct StreamConsumer {
    inner: Arc<ConsumerInner>,
}

/// Clears the in-flight flag when a send ends, whichever way it ends
pub(crate) struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl StreamConsumer {
    pub fn new(relay_url: Url, policy: RetryPolicy) -> Self {
        Self::with_delay(relay_url, policy, Arc::new(TokioDelay))
    }

    pub fn with_delay(relay_url: Url, policy: RetryPolicy, delay: Arc<dyn Delay>) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                client: Client::new(),
                relay_url,
                policy,
                delay,
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn relay_url(&self) -> &Url {
        &self.inner.relay_url
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Whether a send is currently running
    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Claim the in-flight slot, failing if any clone holds it
    pub(crate) fn try_begin(&self) -> ClientResult<InFlightGuard<'_>> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::SendInFlight)?;
        Ok(InFlightGuard {
            flag: &self.inner.in_flight,
        })
    }

    /// Send `conversation` to the relay and stream the reply into it
    ///
    /// Every attempt posts the same snapshot taken before the first one.
    /// Relay failures never surface as errors: the send ends `Failed` with
    /// one apology message appended. The only error is
    /// [`ClientError::SendInFlight`], returned before any request is made.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        view: &dyn ConversationView,
    ) -> ClientResult<SendOutcome> {
        let _guard = self.try_begin()?;
        self.send_claimed(conversation, view).await
    }

    /// [`send`](Self::send) for a caller already holding the slot from
    /// [`try_begin`](Self::try_begin)
    pub(crate) async fn send_claimed(
        &self,
        conversation: &mut Conversation,
        view: &dyn ConversationView,
    ) -> ClientResult<SendOutcome> {
        let snapshot = conversation.snapshot();
        let max_attempts = self.inner.policy.max_attempts.max(1);
        let mut attempt = 1;

        let kind = loop {
            view.state_changed(&SendState::Sending { attempt });

            match self.attempt(&snapshot, attempt, conversation, view).await {
                AttemptOutcome::Completed(reply) => {
                    view.state_changed(&SendState::Done);
                    return Ok(SendOutcome::Completed(reply));
                }
                AttemptOutcome::RateLimited if attempt < max_attempts => {
                    info!(
                        attempt,
                        delay_ms = self.inner.policy.delay.as_millis() as u64,
                        "Relay rate limited the send, retrying"
                    );
                    view.state_changed(&SendState::RetryWait { attempt });
                    self.inner.delay.wait(self.inner.policy.delay).await;
                    attempt += 1;
                }
                AttemptOutcome::RateLimited => {
                    warn!(attempt, "Rate limited on every attempt, giving up");
                    break FailureKind::RateLimited;
                }
                AttemptOutcome::Failed => break FailureKind::Other,
            }
        };

        let apology = Message::assistant(kind.apology());
        conversation.push(apology.clone())?;
        view.conversation_updated(conversation);
        view.state_changed(&SendState::Failed);

        Ok(SendOutcome::Failed { kind, apology })
    }

    async fn attempt(
        &self,
        snapshot: &[Message],
        attempt: u32,
        conversation: &mut Conversation,
        view: &dyn ConversationView,
    ) -> AttemptOutcome {
        debug!(attempt, messages = snapshot.len(), "Posting conversation to relay");

        let response = match self
            .inner
            .client
            .post(self.inner.relay_url.clone())
            .json(snapshot)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(attempt, "Relay request failed: {e}");
                return AttemptOutcome::Failed;
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return AttemptOutcome::RateLimited;
        }
        if !status.is_success() {
            warn!(attempt, %status, "Relay answered with an error status");
            return AttemptOutcome::Failed;
        }

        view.state_changed(&SendState::Streaming);
        conversation.begin_reply();
        view.conversation_updated(conversation);

        let mut decoder = Utf8Decoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = decoder.push(&bytes);
                    if !text.is_empty() {
                        conversation.append_reply(&text);
                        view.conversation_updated(conversation);
                    }
                }
                Err(e) => {
                    warn!(attempt, "Reply stream ended abnormally, keeping the truncated reply: {e}");
                    break;
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            conversation.append_reply(&tail);
        }

        let reply = conversation.finish_reply();
        view.conversation_updated(conversation);
        debug!(attempt, chars = reply.content.chars().count(), "Reply committed");
        AttemptOutcome::Completed(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_apologies() {
        assert_eq!(
            FailureKind::RateLimited.apology(),
            "I'm sorry, but I've reached my daily usage limit. Please try again later."
        );
        assert_eq!(
            FailureKind::Other.apology(),
            "I'm sorry, but I encountered an error. Please try again later."
        );
    }

    #[test]
    fn test_in_flight_guard_released_on_drop() {
        let consumer = StreamConsumer::new(
            Url::parse("http://127.0.0.1:3000/api/chat").unwrap(),
            RetryPolicy::default(),
        );

        let guard = consumer.try_begin().unwrap();
        assert!(consumer.is_in_flight());
        assert!(matches!(
            consumer.clone().try_begin(),
            Err(ClientError::SendInFlight)
        ));

        drop(guard);
        assert!(!consumer.is_in_flight());
        assert!(consumer.try_begin().is_ok());
    }
}
