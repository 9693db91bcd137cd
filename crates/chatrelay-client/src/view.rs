//! Observer seam for rendering a send in progress

use crate::consumer::SendState;
use crate::conversation::Conversation;

/// Receives progress of a send
///
/// Every method has a no-op default so views only implement what they
/// render.
pub trait ConversationView: Send + Sync {
    /// The send moved to a new state
    fn state_changed(&self, _state: &SendState) {}

    /// The conversation changed, including every streamed chunk
    fn conversation_updated(&self, _conversation: &Conversation) {}
}

/// View that ignores all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopView;

impl ConversationView for NoopView {}
