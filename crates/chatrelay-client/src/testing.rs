//! Test doubles for the chat client
//!
//! `RecordingDelay` returns immediately and remembers every requested wait;
//! `RecordingView` remembers every state transition and streamed reply.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::consumer::SendState;
use crate::conversation::Conversation;
use crate::delay::Delay;
use crate::view::ConversationView;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Delay that records the requested durations instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn wait(&self, duration: Duration) {
        lock(&self.waits).push(duration);
    }
}

/// View that records everything it is told
#[derive(Debug, Default)]
pub struct RecordingView {
    states: Mutex<Vec<SendState>>,
    partial_replies: Mutex<Vec<String>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<SendState> {
        lock(&self.states).clone()
    }

    /// Reply text seen at each update while a reply was streaming
    pub fn partial_replies(&self) -> Vec<String> {
        lock(&self.partial_replies).clone()
    }
}

impl ConversationView for RecordingView {
    fn state_changed(&self, state: &SendState) {
        lock(&self.states).push(*state);
    }

    fn conversation_updated(&self, conversation: &Conversation) {
        if let Some(reply) = conversation.pending_reply() {
            lock(&self.partial_replies).push(reply.to_string());
        }
    }
}
