//! SQLite-backed item store
//!
//! Plain keyed CRUD over a single `items` table.

use crate::config::DatabaseLocation;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest accepted item name
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Item not found")]
    NotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Item {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

#[derive(Clone)]
pub struct ItemStore {
    conn: Arc<Mutex<Connection>>,
}

impl ItemStore {
    /// Open (and migrate) the database at `location`
    pub fn open(location: &DatabaseLocation) -> Result<Self, StoreError> {
        let conn = match location {
            DatabaseLocation::Memory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
        };

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_name ON items(name);
        "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(&DatabaseLocation::Memory)
    }

    pub fn create(&self, item: NewItem) -> Result<Item, StoreError> {
        if item.name.trim().is_empty() {
            return Err(StoreError::Invalid("name must not be empty".to_string()));
        }
        if item.name.chars().count() > MAX_NAME_LEN {
            return Err(StoreError::Invalid(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }

        let now = Utc::now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO items (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![item.name, item.description, now, now],
        )?;

        let created = Item {
            id: conn.last_insert_rowid(),
            name: item.name,
            description: item.description,
            created_at: now,
            updated_at: now,
        };
        tracing::debug!(item_id = created.id, "Created item");
        Ok(created)
    }

    /// Items ordered by id, paginated
    pub fn list(&self, skip: u32, limit: u32) -> Result<Vec<Item>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at FROM items \
             ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let items = stmt
            .query_map(params![limit, skip], Item::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn get(&self, id: i64) -> Result<Item, StoreError> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, name, description, created_at, updated_at FROM items WHERE id = ?1",
                params![id],
                Item::from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::debug!(item_id = id, "Deleted item");
        Ok(())
    }

    /// Liveness check used by `/health`
    pub fn ping(&self) -> bool {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}
