//! Test utilities for chatrelay - scripted upstream doubles
//!
//! `ScriptedCompletionClient` replays canned completions in order and
//! records every payload it receives, so relay behavior can be tested
//! without a network round trip to a real provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream;

use crate::message::{Fragment, Message};
use crate::upstream::{CompletionClient, FragmentStream, UpstreamError};

/// One canned upstream outcome
#[derive(Debug, Clone)]
pub enum Script {
    /// The upstream call itself fails
    Fail(UpstreamError),
    /// The call succeeds and yields these fragments, optionally followed by
    /// a mid-stream failure
    Stream {
        fragments: Vec<String>,
        then: Option<UpstreamError>,
    },
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: VecDeque<Script>,
    received: Vec<Vec<Message>>,
}

/// Completion client double that replays scripts in FIFO order
#[derive(Debug, Clone, Default)]
pub struct ScriptedCompletionClient {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion made of `fragments`
    pub fn with_fragments<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_script(Script::Stream {
            fragments: fragments.into_iter().map(Into::into).collect(),
            then: None,
        })
    }

    /// Queue a completion that yields `fragments` and then fails
    pub fn with_fragments_then_error<I, S>(self, fragments: I, error: UpstreamError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_script(Script::Stream {
            fragments: fragments.into_iter().map(Into::into).collect(),
            then: Some(error),
        })
    }

    /// Queue a failing upstream call
    pub fn with_failure(self, error: UpstreamError) -> Self {
        self.with_script(Script::Fail(error))
    }

    pub fn with_script(self, script: Script) -> Self {
        self.lock().scripts.push_back(script);
        self
    }

    /// Every payload received so far, in call order
    pub fn received_payloads(&self) -> Vec<Vec<Message>> {
        self.lock().received.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().received.len()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<FragmentStream, UpstreamError> {
        let script = {
            let mut state = self.lock();
            state.received.push(messages);
            state.scripts.pop_front()
        };

        match script {
            None => Err(UpstreamError::Config(
                "No scripted completion left".to_string(),
            )),
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Stream { fragments, then }) => {
                let items = fragments
                    .into_iter()
                    .filter_map(Fragment::new)
                    .map(Ok)
                    .chain(then.map(Err));
                Ok(Box::pin(stream::iter(items.collect::<Vec<_>>())))
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
