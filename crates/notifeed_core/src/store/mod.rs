//! Read-state store contract and implementations.
//!
//! # Responsibility
//! - Define the injected key -> read flag storage interface.
//! - Provide in-memory and SQLite-backed implementations.
//! - Load and persist read flags off the reconciliation path, with retry.
//!
//! # Invariants
//! - Store calls never happen while the reconciled map is locked.
//! - A persistence failure never rolls back in-memory read state.

use crate::db::DbError;
use crate::model::notification::NotificationKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;
pub mod worker;

pub type ReadStateResult<T> = Result<T, ReadStateError>;

/// Read-state storage failure.
#[derive(Debug)]
pub enum ReadStateError {
    Db(DbError),
    Backend(String),
}

impl Display for ReadStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Backend(message) => write!(f, "read-state backend error: {message}"),
        }
    }
}

impl Error for ReadStateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Backend(_) => None,
        }
    }
}

impl From<DbError> for ReadStateError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ReadStateError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable read flags for one user scope, owned by the host.
pub trait ReadStateStore: Send + Sync {
    /// Returns the stored flag, or `None` when the key was never written.
    fn get(&self, key: &NotificationKey) -> ReadStateResult<Option<bool>>;

    /// Writes the same flag for every key as one logical batch.
    fn set_many(&self, keys: &[NotificationKey], read: bool) -> ReadStateResult<()>;
}

/// Process-local read-state store.
#[derive(Debug, Default)]
pub struct MemoryReadStateStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl MemoryReadStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flags.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.lock().is_empty()
    }
}

impl ReadStateStore for MemoryReadStateStore {
    fn get(&self, key: &NotificationKey) -> ReadStateResult<Option<bool>> {
        Ok(self.flags.lock().get(&key.storage_key()).copied())
    }

    fn set_many(&self, keys: &[NotificationKey], read: bool) -> ReadStateResult<()> {
        let mut flags = self.flags.lock();
        for key in keys {
            flags.insert(key.storage_key(), read);
        }
        Ok(())
    }
}
