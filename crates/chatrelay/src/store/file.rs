//! JSON file backed document store
//!
//! Layout under the root directory:
//! ```text
//! <root>/<user-id>/chats.json              chat list, creation order
//! <root>/<user-id>/chats/<chat-id>.json    message log, append order
//! ```
//! Writes are serialized through one lock and land via write-then-rename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::{ChatId, ChatRecord, DocumentStore, MessageRecord, StoreError};
use crate::identity::UserId;
use crate::message::Message;

const CHATS_FILE: &str = "chats.json";
const MESSAGES_DIR: &str = "chats";

/// Document store persisting each user's documents as JSON files
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!("Document store at: {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user: &UserId) -> PathBuf {
        self.root.join(user.as_str())
    }

    fn chats_path(&self, user: &UserId) -> PathBuf {
        self.user_dir(user).join(CHATS_FILE)
    }

    fn messages_path(&self, user: &UserId, chat: ChatId) -> PathBuf {
        self.user_dir(user)
            .join(MESSAGES_DIR)
            .join(format!("{chat}.json"))
    }

    async fn load_chats(&self, user: &UserId) -> Result<Vec<ChatRecord>, StoreError> {
        Ok(read_json(&self.chats_path(user)).await?.unwrap_or_default())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn create_chat(&self, user: &UserId, name: &str) -> Result<ChatRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        let record = ChatRecord::new(name);
        let mut chats = self.load_chats(user).await?;
        chats.push(record.clone());

        write_json(&self.messages_path(user, record.id), &Vec::<MessageRecord>::new()).await?;
        write_json(&self.chats_path(user), &chats).await?;

        tracing::debug!(user = %user, chat = %record.id, "Created chat");
        Ok(record)
    }

    async fn rename_chat(&self, user: &UserId, chat: ChatId, name: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut chats = self.load_chats(user).await?;
        let record = chats
            .iter_mut()
            .find(|record| record.id == chat)
            .ok_or(StoreError::ChatNotFound(chat))?;
        record.name = name.to_string();

        write_json(&self.chats_path(user), &chats).await
    }

    async fn list_chats(&self, user: &UserId) -> Result<Vec<ChatRecord>, StoreError> {
        let mut chats = self.load_chats(user).await?;
        chats.reverse();
        Ok(chats)
    }

    async fn append_message(
        &self,
        user: &UserId,
        chat: ChatId,
        message: &Message,
    ) -> Result<MessageRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        let path = self.messages_path(user, chat);
        let mut log: Vec<MessageRecord> = read_json(&path)
            .await?
            .ok_or(StoreError::ChatNotFound(chat))?;

        let record = MessageRecord::from_message(message);
        log.push(record.clone());
        write_json(&path, &log).await?;
        Ok(record)
    }

    async fn list_messages(
        &self,
        user: &UserId,
        chat: ChatId,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        read_json(&self.messages_path(user, chat))
            .await?
            .ok_or(StoreError::ChatNotFound(chat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn alice() -> UserId {
        UserId::try_from("alice").unwrap()
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let chat = {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            let chat = store.create_chat(&alice(), "New Chat").await.unwrap();
            store
                .append_message(&alice(), chat.id, &Message::user("My game won't launch"))
                .await
                .unwrap();
            store
                .append_message(&alice(), chat.id, &Message::assistant("Let's verify the files."))
                .await
                .unwrap();
            chat
        };

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let chats = store.list_chats(&alice()).await.unwrap();
        assert_eq!(chats, vec![chat.clone()]);

        let messages: Vec<Message> = store
            .list_messages(&alice(), chat.id)
            .await
            .unwrap()
            .iter()
            .map(MessageRecord::to_message)
            .collect();
        assert_eq!(
            messages,
            vec![
                Message::user("My game won't launch"),
                Message::assistant("Let's verify the files.")
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_chat() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        assert!(store.list_chats(&alice()).await.unwrap().is_empty());
        assert!(matches!(
            store.list_messages(&alice(), ChatId::new()).await,
            Err(StoreError::ChatNotFound(_))
        ));
        assert!(matches!(
            store
                .append_message(&alice(), ChatId::new(), &Message::user("hi"))
                .await,
            Err(StoreError::ChatNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_and_order() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let older = store.create_chat(&alice(), "New Chat").await.unwrap();
        let newer = store.create_chat(&alice(), "New Chat").await.unwrap();
        store.rename_chat(&alice(), older.id, "Refunds").await.unwrap();

        let chats = store.list_chats(&alice()).await.unwrap();
        assert_eq!(chats[0].id, newer.id);
        assert_eq!(chats[1].name, "Refunds");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let user_dir = dir.path().join("alice");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(user_dir.join(CHATS_FILE), "{ not json").unwrap();

        assert!(matches!(
            store.list_chats(&alice()).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
