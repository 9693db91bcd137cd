//! Chat session: the signed-in user's active chat and its persistence
//!
//! Ties the stream consumer to the document store. User messages and
//! completed replies are persisted to the active chat; greetings and
//! apologies are display-only.

use std::sync::Arc;

use chatrelay_server::identity::{CredentialProvider, UserId};
use chatrelay_server::message::Message;
use chatrelay_server::store::{ChatId, ChatRecord, DEFAULT_CHAT_NAME, DocumentStore};

use crate::consumer::{SendOutcome, StreamConsumer};
use crate::conversation::Conversation;
use crate::error::{ClientError, ClientResult};
use crate::view::ConversationView;

/// Greeting shown at the top of every new chat
pub const DEFAULT_GREETING: &str = "Hi! I'm a Steam support assistant. How can I help you today?";

/// Characters of the first message kept in a chat's title
const TITLE_MAX_CHARS: usize = 30;

pub struct ChatSession {
    consumer: StreamConsumer,
    store: Arc<dyn DocumentStore>,
    credentials: Arc<dyn CredentialProvider>,
    greeting: String,
    active_chat: Option<ChatId>,
    conversation: Conversation,
}

impl ChatSession {
    pub fn new(
        consumer: StreamConsumer,
        store: Arc<dyn DocumentStore>,
        credentials: Arc<dyn CredentialProvider>,
        greeting: impl Into<String>,
    ) -> Self {
        let greeting = greeting.into();
        Self {
            consumer,
            store,
            credentials,
            conversation: Conversation::with_greeting(greeting.clone()),
            greeting,
            active_chat: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn active_chat(&self) -> Option<ChatId> {
        self.active_chat
    }

    fn user(&self) -> ClientResult<UserId> {
        self.credentials
            .current_user()
            .ok_or(ClientError::NotSignedIn)
    }

    /// Create a chat, make it active and reset to the greeting
    pub async fn new_chat(&mut self) -> ClientResult<ChatRecord> {
        let user = self.user()?;
        let chat = self.store.create_chat(&user, DEFAULT_CHAT_NAME).await?;

        tracing::debug!(chat = %chat.id, "Started new chat");
        self.active_chat = Some(chat.id);
        self.conversation = Conversation::with_greeting(self.greeting.clone());
        Ok(chat)
    }

    /// The user's chats, newest first
    pub async fn list_chats(&self) -> ClientResult<Vec<ChatRecord>> {
        let user = self.user()?;
        Ok(self.store.list_chats(&user).await?)
    }

    /// Make `chat` active and replay its stored messages
    pub async fn open_chat(&mut self, chat: ChatId) -> ClientResult<()> {
        let user = self.user()?;
        let records = self.store.list_messages(&user, chat).await?;

        tracing::debug!(chat = %chat, messages = records.len(), "Opened chat");
        self.active_chat = Some(chat);
        self.conversation = Conversation::from_records(&records);
        Ok(())
    }

    /// Send a user message and stream the assistant's reply
    ///
    /// The first message after the greeting also names the chat. A send
    /// rejected with [`ClientError::SendInFlight`] or a failed store write
    /// leaves the conversation untouched.
    pub async fn send_message(
        &mut self,
        text: &str,
        view: &dyn ConversationView,
    ) -> ClientResult<SendOutcome> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let user = self.user()?;

        // Nothing changes unless this send owns the consumer
        let consumer = self.consumer.clone();
        let _guard = consumer.try_begin()?;

        let names_chat = self.conversation.len() == 1;
        let message = Message::user(text);

        if let Some(chat) = self.active_chat {
            self.store.append_message(&user, chat, &message).await?;
            if names_chat {
                self.store.rename_chat(&user, chat, &chat_title(text)).await?;
            }
        }

        self.conversation.push(message)?;
        view.conversation_updated(&self.conversation);

        let outcome = consumer
            .send_claimed(&mut self.conversation, view)
            .await?;

        if let (SendOutcome::Completed(reply), Some(chat)) = (&outcome, self.active_chat) {
            self.store.append_message(&user, chat, reply).await?;
        }

        Ok(outcome)
    }

    /// Sign out and drop the active chat
    pub fn sign_out(&mut self) {
        self.credentials.sign_out();
        self.active_chat = None;
        self.conversation = Conversation::with_greeting(self.greeting.clone());
    }
}

/// Chat name derived from its first message
pub fn chat_title(text: &str) -> String {
    let mut chars = text.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}...")
    } else {
        title
    }
}
