//! In-process document store

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ChatId, ChatRecord, DocumentStore, MessageRecord, StoreError};
use crate::identity::UserId;
use crate::message::Message;

#[derive(Debug, Default)]
struct UserDocuments {
    /// Insertion order is creation order
    chats: Vec<ChatRecord>,
    messages: HashMap<ChatId, Vec<MessageRecord>>,
}

/// Document store kept entirely in memory, one entry per user
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserDocuments>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_chat(&self, user: &UserId, name: &str) -> Result<ChatRecord, StoreError> {
        let record = ChatRecord::new(name);
        let mut docs = self.users.entry(user.clone()).or_default();
        docs.messages.insert(record.id, Vec::new());
        docs.chats.push(record.clone());
        Ok(record)
    }

    async fn rename_chat(&self, user: &UserId, chat: ChatId, name: &str) -> Result<(), StoreError> {
        let mut docs = self
            .users
            .get_mut(user)
            .ok_or(StoreError::ChatNotFound(chat))?;
        let record = docs
            .chats
            .iter_mut()
            .find(|record| record.id == chat)
            .ok_or(StoreError::ChatNotFound(chat))?;
        record.name = name.to_string();
        Ok(())
    }

    async fn list_chats(&self, user: &UserId) -> Result<Vec<ChatRecord>, StoreError> {
        Ok(self
            .users
            .get(user)
            .map(|docs| docs.chats.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_message(
        &self,
        user: &UserId,
        chat: ChatId,
        message: &Message,
    ) -> Result<MessageRecord, StoreError> {
        let mut docs = self
            .users
            .get_mut(user)
            .ok_or(StoreError::ChatNotFound(chat))?;
        let log = docs
            .messages
            .get_mut(&chat)
            .ok_or(StoreError::ChatNotFound(chat))?;
        let record = MessageRecord::from_message(message);
        log.push(record.clone());
        Ok(record)
    }

    async fn list_messages(
        &self,
        user: &UserId,
        chat: ChatId,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        self.users
            .get(user)
            .and_then(|docs| docs.messages.get(&chat).cloned())
            .ok_or(StoreError::ChatNotFound(chat))
    }
}
