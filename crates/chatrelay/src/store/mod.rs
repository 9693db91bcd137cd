//! Per-user document store for chats and their message logs
//!
//! Per user, an ordered collection of chat records; per chat, an ordered
//! collection of message records. The store offers append and rename
//! operations only and never spans a transaction across the two
//! collections.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::identity::UserId;
use crate::message::{Message, Role};

/// Name given to freshly created chats
pub const DEFAULT_CHAT_NAME: &str = "New Chat";

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The chat does not exist for this user
    #[error("Chat not found: {0}")]
    ChatNotFound(ChatId),

    /// A chat ID could not be parsed
    #[error("Invalid chat ID '{0}'")]
    InvalidChatId(String),

    /// Backing file system errors
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored documents could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Identifier of one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(Uuid);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| StoreError::InvalidChatId(s.to_string()))
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a user's chat list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ChatId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// One stored message of a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }
}

/// Trait for chat persistence backends
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a chat for `user`
    async fn create_chat(&self, user: &UserId, name: &str) -> Result<ChatRecord, StoreError>;

    /// Rename an existing chat
    async fn rename_chat(&self, user: &UserId, chat: ChatId, name: &str) -> Result<(), StoreError>;

    /// All chats of `user`, newest first
    async fn list_chats(&self, user: &UserId) -> Result<Vec<ChatRecord>, StoreError>;

    /// Append a message to a chat's log
    async fn append_message(
        &self,
        user: &UserId,
        chat: ChatId,
        message: &Message,
    ) -> Result<MessageRecord, StoreError>;

    /// A chat's messages in the order they were appended
    async fn list_messages(
        &self,
        user: &UserId,
        chat: ChatId,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}
