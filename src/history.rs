//! Conversation messages and their persistence.
//!
//! [`MessageRepository`] is the seam to the history store. The orchestrator
//! treats it as best-effort: write failures are logged and swallowed so the
//! conversation flow is never blocked by store unavailability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::types::{ChatError, ChatResult};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Wire role string for the completion API.
    pub fn role_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "assistant" => Sender::Assistant,
            _ => Sender::User,
        }
    }
}

/// A single conversation turn. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Document the conversation is scoped to, if any.
    pub source_id: Option<String>,
}

impl ChatMessage {
    /// Creates a message with a fresh id and the current time.
    pub fn new(content: impl Into<String>, sender: Sender, source_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            source_id,
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>, source_id: Option<String>) -> Self {
        Self::new(content, Sender::User, source_id)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>, source_id: Option<String>) -> Self {
        Self::new(content, Sender::Assistant, source_id)
    }
}

/// Persistent store for conversation history.
///
/// `source_id = None` means "unscoped"/all: [`load`](Self::load) returns
/// every message and [`delete_for`](Self::delete_for) behaves like
/// [`delete_all`](Self::delete_all).
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persists one message.
    async fn save(&self, message: &ChatMessage) -> ChatResult<()>;

    /// Loads messages for a document, sorted by timestamp ascending.
    async fn load(&self, source_id: Option<&str>) -> ChatResult<Vec<ChatMessage>>;

    /// Deletes the messages scoped to `source_id`.
    async fn delete_for(&self, source_id: Option<&str>) -> ChatResult<()>;

    /// Deletes every stored message.
    async fn delete_all(&self) -> ChatResult<()>;
}

/// Volatile repository for tests and persistence-free runs.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages, across all documents.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageStore {
    async fn save(&self, message: &ChatMessage) -> ChatResult<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn load(&self, source_id: Option<&str>) -> ChatResult<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .lock()
            .iter()
            .filter(|m| match source_id {
                Some(id) => m.source_id.as_deref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn delete_for(&self, source_id: Option<&str>) -> ChatResult<()> {
        match source_id {
            Some(id) => self
                .messages
                .lock()
                .retain(|m| m.source_id.as_deref() != Some(id)),
            None => self.messages.lock().clear(),
        }
        Ok(())
    }

    async fn delete_all(&self) -> ChatResult<()> {
        self.messages.lock().clear();
        Ok(())
    }
}

/// SQLite-backed repository.
pub struct SqliteMessageStore {
    conn: Connection,
}

impl SqliteMessageStore {
    /// Opens (or creates) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|err| ChatError::Persistence(err.to_string()))?;
        Self::init(conn).await
    }

    /// Opens a throwaway in-memory store.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| ChatError::Persistence(err.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> ChatResult<Self> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    source_id TEXT
                )",
                [],
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| ChatError::Persistence(err.to_string()))?;
        Ok(Self { conn })
    }

    /// Rebuilds a message from its stored columns, tolerating rows written
    /// by older revisions of the schema.
    fn from_columns(
        id: String,
        content: String,
        sender: String,
        timestamp: String,
        source_id: Option<String>,
    ) -> ChatMessage {
        ChatMessage {
            id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
            content,
            sender: Sender::parse(&sender),
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            source_id,
        }
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageStore {
    async fn save(&self, message: &ChatMessage) -> ChatResult<()> {
        let message = message.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO messages (id, content, sender, timestamp, source_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    (
                        message.id.to_string(),
                        message.content,
                        message.sender.role_str(),
                        message.timestamp.to_rfc3339(),
                        message.source_id,
                    ),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| ChatError::Persistence(err.to_string()))
    }

    async fn load(&self, source_id: Option<&str>) -> ChatResult<Vec<ChatMessage>> {
        let source_id = source_id.map(str::to_string);
        self.conn
            .call(move |conn| {
                let map_row = |row: &tokio_rusqlite::Row<'_>| {
                    Ok(SqliteMessageStore::from_columns(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                };

                let mut results = Vec::new();
                match source_id {
                    Some(id) => {
                        let mut stmt = conn
                            .prepare(
                                "SELECT id, content, sender, timestamp, source_id FROM messages
                                 WHERE source_id = ?1 ORDER BY timestamp ASC",
                            )
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        let rows = stmt
                            .query_map([&id], map_row)
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        for row in rows {
                            results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                        }
                    }
                    None => {
                        let mut stmt = conn
                            .prepare(
                                "SELECT id, content, sender, timestamp, source_id FROM messages
                                 ORDER BY timestamp ASC",
                            )
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        let rows = stmt
                            .query_map([], map_row)
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        for row in rows {
                            results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                        }
                    }
                }
                Ok(results)
            })
            .await
            .map_err(|err| ChatError::Persistence(err.to_string()))
    }

    async fn delete_for(&self, source_id: Option<&str>) -> ChatResult<()> {
        let source_id = source_id.map(str::to_string);
        self.conn
            .call(move |conn| {
                match source_id {
                    Some(id) => conn
                        .execute("DELETE FROM messages WHERE source_id = ?1", [&id])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?,
                    None => conn
                        .execute("DELETE FROM messages", [])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?,
                };
                Ok(())
            })
            .await
            .map_err(|err| ChatError::Persistence(err.to_string()))
    }

    async fn delete_all(&self) -> ChatResult<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM messages", [])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| ChatError::Persistence(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_scopes_by_source_id() {
        let store = InMemoryMessageStore::new();
        store
            .save(&ChatMessage::user("hello", Some("doc-a".into())))
            .await
            .unwrap();
        store
            .save(&ChatMessage::assistant("hi", Some("doc-a".into())))
            .await
            .unwrap();
        store
            .save(&ChatMessage::user("other", Some("doc-b".into())))
            .await
            .unwrap();

        let doc_a = store.load(Some("doc-a")).await.unwrap();
        assert_eq!(doc_a.len(), 2);
        assert_eq!(doc_a[0].sender, Sender::User);

        let all = store.load(None).await.unwrap();
        assert_eq!(all.len(), 3);

        store.delete_for(Some("doc-a")).await.unwrap();
        assert_eq!(store.load(None).await.unwrap().len(), 1);

        store.delete_all().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn in_memory_load_sorts_by_timestamp() {
        let store = InMemoryMessageStore::new();
        let mut older = ChatMessage::user("first", None);
        older.timestamp = Utc::now() - chrono::Duration::seconds(60);
        let newer = ChatMessage::assistant("second", None);
        // Insert newest first; load must reorder.
        store.save(&newer).await.unwrap();
        store.save(&older).await.unwrap();

        let loaded = store.load(None).await.unwrap();
        assert_eq!(loaded[0].content, "first");
        assert_eq!(loaded[1].content, "second");
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_messages() {
        let store = SqliteMessageStore::open_in_memory().await.unwrap();
        let message = ChatMessage::user("persisted turn", Some("doc-a".into()));
        store.save(&message).await.unwrap();

        let loaded = store.load(Some("doc-a")).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, message.id);
        assert_eq!(loaded[0].content, "persisted turn");
        assert_eq!(loaded[0].sender, Sender::User);
        assert_eq!(loaded[0].source_id.as_deref(), Some("doc-a"));
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = SqliteMessageStore::open(&path).await.unwrap();
            store
                .save(&ChatMessage::assistant("kept", Some("doc".into())))
                .await
                .unwrap();
        }

        let store = SqliteMessageStore::open(&path).await.unwrap();
        let loaded = store.load(Some("doc")).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "kept");
    }

    #[tokio::test]
    async fn sqlite_delete_for_scopes_by_source_id() {
        let store = SqliteMessageStore::open_in_memory().await.unwrap();
        store
            .save(&ChatMessage::user("scoped", Some("doc".into())))
            .await
            .unwrap();
        store.save(&ChatMessage::user("unscoped", None)).await.unwrap();

        store.delete_for(Some("doc")).await.unwrap();
        let remaining = store.load(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "unscoped");

        // An unscoped delete clears everything.
        store.delete_for(None).await.unwrap();
        assert!(store.load(None).await.unwrap().is_empty());
    }
}
