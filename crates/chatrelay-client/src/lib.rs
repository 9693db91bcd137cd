//! Chatrelay client - consumes the relay's streamed replies
//!
//! [`StreamConsumer`] posts a conversation to the relay and appends the
//! reply as it streams in, retrying rate-limited sends. [`ChatSession`]
//! adds chat history on top of a document store.

pub mod config;
pub mod consumer;
pub mod conversation;
pub mod decoder;
pub mod delay;
pub mod error;
pub mod session;
pub mod testing;
pub mod view;

pub use consumer::{FailureKind, RetryPolicy, SendOutcome, SendState, StreamConsumer};
pub use conversation::Conversation;
pub use error::{ClientError, ClientResult};
pub use session::ChatSession;
pub use view::{ConversationView, NoopView};
