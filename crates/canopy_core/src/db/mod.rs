//! Shared SQLite handle for the store.
//!
//! All repositories go through one [`Db`], which wraps a single connection
//! in a `Mutex`. Every read-compute-write sequence therefore runs under an
//! exclusive lock, and multi-statement mutations additionally run inside a
//! rusqlite transaction. Concurrent callers targeting the same scope
//! serialize instead of racing on sibling indices.

mod schema;

pub use schema::init_database;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Cloneable handle to the canopy database.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open or create the database at the given path and initialize the
    /// schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        init_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

/// Current time as the unix-second INTEGER the schema stores.
pub(crate) fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert a stored unix timestamp back to a `DateTime<Utc>`.
pub(crate) fn timestamp_to_datetime(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now)
}
