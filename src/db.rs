//! Database operations for chat history

use crate::error::ChatError;
use crate::models::{ChatMessage, Role};
use crate::paths::get_db_path;
use rusqlite::{params, Connection};
use std::path::Path;

/// Initializes the SQLite database at the default location, creating tables if needed
pub fn init_database() -> Result<Connection, ChatError> {
    init_database_at(&get_db_path()?)
}

/// Initializes the SQLite database at an explicit path
pub fn init_database_at(db_path: &Path) -> Result<Connection, ChatError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ChatError::Storage(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| ChatError::Storage(format!("Failed to open database: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            thinking TEXT NOT NULL DEFAULT ''
        )",
        [],
    )
    .map_err(|e| ChatError::Storage(format!("Failed to create table: {}", e)))?;

    // Migration: Add thinking column if it doesn't exist (for existing databases)
    let _ = conn.execute(
        "ALTER TABLE chat_history ADD COLUMN thinking TEXT NOT NULL DEFAULT ''",
        [],
    ); // Ignore error if column already exists

    Ok(conn)
}

/// Stores a finished chat message in the database
pub fn store_message(conn: &Connection, message: &ChatMessage) -> Result<(), ChatError> {
    conn.execute(
        "INSERT INTO chat_history (timestamp, role, content, thinking) VALUES (?1, ?2, ?3, ?4)",
        params![
            message.timestamp,
            message.role.as_str(),
            message.content,
            message.thinking
        ],
    )
    .map_err(|e| ChatError::Storage(format!("Failed to store message: {}", e)))?;
    Ok(())
}

/// Retrieves up to `limit` most recent messages in chronological order
pub fn load_history(conn: &Connection, limit: i64) -> Result<Vec<ChatMessage>, ChatError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, timestamp, role, content, COALESCE(thinking, '') FROM chat_history
             ORDER BY id DESC LIMIT ?1",
        )
        .map_err(|e| ChatError::Storage(format!("Failed to prepare query: {}", e)))?;

    let messages = stmt
        .query_map(params![limit], |row| {
            Ok(ChatMessage {
                id: format!("db_{}", row.get::<_, i64>(0)?),
                timestamp: row.get(1)?,
                role: Role::parse(&row.get::<_, String>(2)?).unwrap_or(Role::Assistant),
                content: row.get(3)?,
                thinking: row.get(4)?,
            })
        })
        .map_err(|e| ChatError::Storage(format!("Failed to query: {}", e)))?;

    let mut result: Vec<ChatMessage> = messages.filter_map(|m| m.ok()).collect();

    // Reverse to get chronological order
    result.reverse();
    Ok(result)
}

/// Clears all chat history from the database
pub fn clear_history(conn: &Connection) -> Result<(), ChatError> {
    conn.execute("DELETE FROM chat_history", [])
        .map_err(|e| ChatError::Storage(format!("Failed to clear history: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stores_and_reloads_messages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = init_database_at(&dir.path().join("chat_history.db")).expect("init");

        let mut assistant = ChatMessage::new(Role::Assistant, "42");
        assistant.thinking = "6 * 7 = 42.".to_string();
        store_message(&conn, &ChatMessage::new(Role::User, "6*7?")).expect("store user");
        store_message(&conn, &assistant).expect("store assistant");

        let history = load_history(&conn, 100).expect("load");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "42");
        assert_eq!(history[1].thinking, "6 * 7 = 42.");
    }

    #[test]
    fn limit_returns_most_recent_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = init_database_at(&dir.path().join("chat_history.db")).expect("init");
        for i in 0..5 {
            store_message(&conn, &ChatMessage::new(Role::User, &format!("m{}", i))).expect("store");
        }
        let history = load_history(&conn, 2).expect("load");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m3");
        assert_eq!(history[1].content, "m4");
    }

    #[test]
    fn migrates_databases_without_thinking_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chat_history.db");
        {
            let old = Connection::open(&path).expect("open");
            old.execute(
                "CREATE TABLE chat_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL
                )",
                [],
            )
            .expect("create");
            old.execute(
                "INSERT INTO chat_history (timestamp, role, content) VALUES ('t', 'user', 'old')",
                [],
            )
            .expect("insert");
        }

        let conn = init_database_at(&path).expect("init migrates");
        let history = load_history(&conn, 10).expect("load");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "old");
        assert_eq!(history[0].thinking, "");
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = init_database_at(&dir.path().join("chat_history.db")).expect("init");
        store_message(&conn, &ChatMessage::new(Role::User, "hi")).expect("store");
        clear_history(&conn).expect("clear");
        assert!(load_history(&conn, 10).expect("load").is_empty());
    }
}
