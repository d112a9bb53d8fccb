//! SQLite-backed read-state store.
//!
//! # Invariants
//! - Rows are scoped per user; one scope never observes another's flags.
//! - `set_many` is atomic: all keys are written or none are.

use crate::db::{open_db, open_db_in_memory};
use crate::model::notification::NotificationKey;
use crate::store::{ReadStateResult, ReadStateStore};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Durable read-state store for one user scope.
pub struct SqliteReadStateStore {
    conn: Mutex<Connection>,
    scope: String,
}

impl SqliteReadStateStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection, scope: impl Into<String>) -> Self {
        Self {
            conn: Mutex::new(conn),
            scope: scope.into(),
        }
    }

    /// Opens (and migrates) a database file for `scope`.
    pub fn open(path: impl AsRef<Path>, scope: impl Into<String>) -> ReadStateResult<Self> {
        Ok(Self::new(open_db(path)?, scope))
    }

    pub fn open_in_memory(scope: impl Into<String>) -> ReadStateResult<Self> {
        Ok(Self::new(open_db_in_memory()?, scope))
    }

    pub fn scope(&self) -> &str {
        self.scope.as_str()
    }
}

impl ReadStateStore for SqliteReadStateStore {
    fn get(&self, key: &NotificationKey) -> ReadStateResult<Option<bool>> {
        let conn = self.conn.lock();
        let flag = conn
            .query_row(
                "SELECT is_read FROM read_state
                 WHERE scope = ?1 AND notification_key = ?2;",
                params![self.scope.as_str(), key.storage_key()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(flag.map(|value| value != 0))
    }

    fn set_many(&self, keys: &[NotificationKey], read: bool) -> ReadStateResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO read_state (scope, notification_key, is_read)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (scope, notification_key) DO UPDATE SET
                    is_read = excluded.is_read,
                    updated_at = (strftime('%s', 'now') * 1000);",
            )?;
            for key in keys {
                stmt.execute(params![self.scope.as_str(), key.storage_key(), i64::from(read)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
