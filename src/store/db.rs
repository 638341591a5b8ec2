//! Connection handle shared by every store submodule.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::error::Result;
use crate::store::schema::SCHEMA;

/// A handle to the relational store backing the whole crate.
///
/// Mirrors the teacher's `GraphDB::open(path)` shape: a single connection
/// guarded by a mutex, with `PRAGMA journal_mode = WAL` for readers to make
/// progress concurrently with a single in-flight writer. Blocking SQLite
/// calls are always dispatched through `tokio::task::spawn_blocking` by
/// callers in the `http` and `orchestrator` modules.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Opens (creating if needed) the database at `database_url`, applying
    /// the schema in [`schema::SCHEMA`](crate::store::schema::SCHEMA).
    pub fn open(database_url: &str) -> Result<Self> {
        let conn = if database_url == "sqlite::memory:" || database_url == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(database_url)?
        };

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        info!(database_url, "store opened");
        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with exclusive access to the underlying connection.
    ///
    /// Intended to be called from inside `spawn_blocking`; the lock is held
    /// only for the duration of `f`, never across an `.await`.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let db = Db::open("sqlite::memory:").unwrap();
        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='site'",
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }
}
