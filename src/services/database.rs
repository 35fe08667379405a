use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use super::store::{RecordStore, StoreError};
use crate::models::{Action, ConnectionId, ConnectionRow, Message, Role, Tier, User};

#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection lock poisoned"))
}

impl Database {
    pub async fn new(custom_path: Option<&Path>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.to_path_buf(),
            None => Self::db_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn db_path() -> Result<PathBuf> {
        let data_dir = match std::env::var("XDG_DATA_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME").context("Neither XDG_DATA_HOME nor HOME is set")?;
                PathBuf::from(home).join(".local/share")
            }
        };
        Ok(data_dir.join("flowlink").join("flowlink.db"))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = lock(&self.conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    image TEXT NOT NULL DEFAULT '',
                    tier TEXT NOT NULL DEFAULT 'free',
                    actions_used INTEGER NOT NULL DEFAULT 0,
                    actions_limit INTEGER NOT NULL DEFAULT 10
                );

                CREATE TABLE connections (
                    user_id TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    connected INTEGER NOT NULL DEFAULT 0,
                    team_name TEXT,
                    PRIMARY KEY (user_id, platform),
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    actions TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE INDEX idx_messages_user ON messages(user_id);
                CREATE INDEX idx_messages_created ON messages(created_at);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        if version < 2 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                UPDATE schema_version SET version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Users ---

    pub async fn get_user_row(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, name, email, image, tier, actions_used, actions_limit
                 FROM users WHERE id = ?1",
            )?;
            let result = stmt
                .query_row(params![id], |row| Ok(Self::row_to_user(row)))
                .optional()?;
            result.transpose()
        })
        .await?
    }

    pub async fn insert_user_row(&self, user: &User) -> Result<()> {
        let conn = self.conn.clone();
        let user = user.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO users (id, name, email, image, tier, actions_used, actions_limit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.image,
                    user.tier.as_str(),
                    user.actions_used,
                    user.actions_limit,
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Returns the number of rows touched so callers can tell a missing user apart.
    pub async fn set_actions_used(&self, user_id: &str, actions_used: u32) -> Result<usize> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let changed = conn.execute(
                "UPDATE users SET actions_used = ?1 WHERE id = ?2",
                params![actions_used, user_id],
            )?;
            Ok(changed)
        })
        .await?
    }

    // --- Connections ---

    pub async fn list_connection_rows(&self, user_id: &str) -> Result<Vec<ConnectionRow>> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT user_id, platform, connected, team_name
                 FROM connections WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![user_id], |row| Ok(Self::row_to_connection(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    pub async fn upsert_connection_row(&self, row: &ConnectionRow) -> Result<()> {
        let conn = self.conn.clone();
        let row = row.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO connections (user_id, platform, connected, team_name)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, platform) DO UPDATE SET
                    connected = excluded.connected,
                    team_name = COALESCE(excluded.team_name, connections.team_name)",
                params![
                    row.user_id,
                    row.platform.as_str(),
                    row.connected as i32,
                    row.team_name,
                ],
            )?;
            Ok(())
        })
        .await?
    }

    // --- Messages ---

    pub async fn insert_message_row(&self, user_id: &str, message: &Message) -> Result<()> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        let msg = message.clone();
        task::spawn_blocking(move || {
            let actions = serde_json::to_string(&msg.actions)?;
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO messages (id, user_id, role, content, actions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.id,
                    user_id,
                    msg.role.as_str(),
                    msg.text,
                    actions,
                    msg.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list_message_rows(&self, user_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            // Timestamps are fixed-width, so text order is chronological.
            let mut stmt = conn.prepare(
                "SELECT id, role, content, actions, created_at
                 FROM messages WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let messages = stmt
                .query_map(params![user_id], |row| Ok(Self::row_to_message(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await?
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }

    // --- Row helpers ---

    fn row_to_user(row: &rusqlite::Row) -> Result<User> {
        let tier_str: String = row.get(4)?;

        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            image: row.get(3)?,
            tier: Tier::from_str(&tier_str)
                .ok_or_else(|| anyhow!("Unknown tier: {}", tier_str))?,
            actions_used: row.get(5)?,
            actions_limit: row.get(6)?,
        })
    }

    fn row_to_connection(row: &rusqlite::Row) -> Result<ConnectionRow> {
        let platform_str: String = row.get(1)?;
        let connected_int: i32 = row.get(2)?;

        Ok(ConnectionRow {
            user_id: row.get(0)?,
            platform: ConnectionId::from_str(&platform_str)
                .ok_or_else(|| anyhow!("Unknown platform: {}", platform_str))?,
            connected: connected_int != 0,
            team_name: row.get(3)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let role_str: String = row.get(1)?;
        let actions_str: String = row.get(3)?;
        let created_str: String = row.get(4)?;

        let actions: Vec<Action> = serde_json::from_str(&actions_str)
            .with_context(|| format!("Corrupt actions column: {}", actions_str))?;

        Ok(Message {
            id: row.get(0)?,
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow!("Unknown role: {}", role_str))?,
            text: row.get(2)?,
            actions,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn get_user(&self, id: &str) -> Result<User, StoreError> {
        self.get_user_row(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }

    async fn insert_user(&self, user: &User) -> Result<User, StoreError> {
        self.insert_user_row(user).await?;
        self.get_user(&user.id).await
    }

    async fn update_actions_used(
        &self,
        user_id: &str,
        actions_used: u32,
    ) -> Result<(), StoreError> {
        match self.set_actions_used(user_id, actions_used).await? {
            0 => Err(StoreError::NotFound(format!("user {}", user_id))),
            _ => Ok(()),
        }
    }

    async fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionRow>, StoreError> {
        Ok(self.list_connection_rows(user_id).await?)
    }

    async fn upsert_connection(&self, row: &ConnectionRow) -> Result<ConnectionRow, StoreError> {
        self.upsert_connection_row(row).await?;
        self.list_connection_rows(&row.user_id)
            .await?
            .into_iter()
            .find(|r| r.platform == row.platform)
            .ok_or_else(|| {
                StoreError::NotFound(format!("connection {}/{}", row.user_id, row.platform.as_str()))
            })
    }

    async fn list_messages(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self.list_message_rows(user_id).await?)
    }

    async fn insert_message(&self, user_id: &str, message: &Message) -> Result<(), StoreError> {
        Ok(self.insert_message_row(user_id, message).await?)
    }
}
