//! SQLite-backed conversation persistence.
//!
//! One conversation per session id (unique constraint). Messages are
//! immutable once written and totally ordered by creation time, with
//! insertion id breaking ties; that order is the canonical chronological
//! order used for prompt assembly and pruning. Deleting a conversation
//! cascades to its messages, so no orphans can exist.

use crate::message::Role;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Failures from the conversation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid message role: {0}")]
    InvalidRole(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

type Result<T> = std::result::Result<T, StoreError>;

/// A persisted conversation row.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub id: i64,
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A persisted message row.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub tokens: Option<i64>,
    pub created_at: String,
}

/// SQLite conversation store.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// Open (or create) the store at the given database path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL UNIQUE,
                title       TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL
                                REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL
                                CHECK (role IN ('system', 'user', 'assistant')),
                content         TEXT NOT NULL,
                tokens          INTEGER,
                metadata        TEXT,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);",
        )?;
        Ok(())
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Find the conversation bound to a session id, if any.
    pub fn find_by_session(&self, session_id: &str) -> Result<Option<ConversationRecord>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let record = conn
            .query_row(
                "SELECT id, session_id, created_at, updated_at
                 FROM conversations WHERE session_id = ?1",
                params![session_id],
                Self::map_conversation,
            )
            .optional()?;
        Ok(record)
    }

    /// Get the conversation for a session, creating it if necessary.
    pub fn create_or_get(&self, session_id: &str) -> Result<ConversationRecord> {
        if let Some(record) = self.find_by_session(session_id)? {
            return Ok(record);
        }

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Self::now();
        conn.execute(
            "INSERT INTO conversations (session_id, created_at, updated_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(session_id) DO NOTHING",
            params![session_id, now],
        )?;

        let record = conn.query_row(
            "SELECT id, session_id, created_at, updated_at
             FROM conversations WHERE session_id = ?1",
            params![session_id],
            Self::map_conversation,
        )?;

        info!(
            session_id = %session_id,
            conversation_id = record.id,
            "Created conversation"
        );
        Ok(record)
    }

    /// Append one message to a conversation and bump its `updated_at`.
    pub fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        tokens: Option<usize>,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let now = Self::now();

        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, tokens, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation_id,
                role.as_str(),
                content,
                tokens.map(|t| t as i64),
                now
            ],
        )?;
        let message_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
        tx.commit()?;

        debug!(
            conversation_id,
            role = %role,
            chars = content.len(),
            "Appended message"
        );
        Ok(message_id)
    }

    /// Persist one full question -> answer turn atomically.
    ///
    /// Both messages and the `updated_at` bump commit together; if anything
    /// fails, nothing is written. Called only after the LLM call succeeded.
    pub fn append_exchange(
        &self,
        conversation_id: i64,
        question: &str,
        answer: &str,
        question_tokens: usize,
        answer_tokens: usize,
    ) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let now = Self::now();

        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, tokens, created_at)
             VALUES (?1, 'user', ?2, ?3, ?4)",
            params![conversation_id, question, question_tokens as i64, now],
        )?;
        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, tokens, created_at)
             VALUES (?1, 'assistant', ?2, ?3, ?4)",
            params![conversation_id, answer, answer_tokens as i64, now],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, now],
        )?;
        tx.commit()?;

        debug!(conversation_id, "Persisted exchange");
        Ok(())
    }

    /// All messages of a conversation in chronological order.
    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, role, content, tokens, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, role, content, tokens, created_at) = row?;
            let role = Role::parse(&role).ok_or_else(|| StoreError::InvalidRole(role.clone()))?;
            messages.push(StoredMessage {
                id,
                role,
                content,
                tokens,
                created_at,
            });
        }
        Ok(messages)
    }

    /// Number of messages in a conversation.
    pub fn message_count(&self, conversation_id: i64) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Bump a conversation's `updated_at` timestamp.
    pub fn touch(&self, conversation_id: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let affected = conn.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, Self::now()],
        )?;
        Ok(affected > 0)
    }

    /// Delete a conversation; messages go with it via the cascade.
    pub fn delete_conversation(&self, conversation_id: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let affected = conn.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![conversation_id],
        )?;
        if affected > 0 {
            info!(conversation_id, "Deleted conversation");
        }
        Ok(affected > 0)
    }

    fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
        Ok(ConversationRecord {
            id: row.get(0)?,
            session_id: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}
