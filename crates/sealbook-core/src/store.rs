//! The single transactional handle onto the local SQLite database.
//!
//! `Store` owns one `Connection` behind a `Mutex`.  Every write runs in an
//! `IMMEDIATE` transaction while the mutex is held, so a closure passed to
//! `write()` can read the ledger head and append after it without any other
//! writer getting in between.  Dropping the transaction on an error path
//! rolls it back.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use sealbook_contracts::error::{SealError, SealResult};

use crate::schema::{self, APPEND_ONLY_MARKER};

/// Translate a raw engine error into the domain taxonomy.
///
/// Trigger aborts carrying the append-only marker become
/// `SealError::AppendOnly`; everything else becomes `SealError::Storage`.
pub fn translate(e: rusqlite::Error) -> SealError {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = &e {
        if let Some(reason) = message.strip_prefix(APPEND_ONLY_MARKER) {
            return SealError::AppendOnly {
                reason: reason.trim().to_string(),
            };
        }
    }
    SealError::Storage {
        reason: e.to_string(),
    }
}

/// `.storage()` on any `rusqlite` result applies `translate`.
pub trait StorageResultExt<T> {
    fn storage(self) -> SealResult<T>;
}

impl<T> StorageResultExt<T> for Result<T, rusqlite::Error> {
    fn storage(self) -> SealResult<T> {
        self.map_err(translate)
    }
}

pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> SealResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).storage()?;
        info!(path = %path.display(), "opened ledger database");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private in-memory database, used by tests and previews.
    pub fn in_memory() -> SealResult<Self> {
        let conn = Connection::open_in_memory().storage()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> SealResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").storage()?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> SealResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| SealError::Storage {
            reason: format!("connection lock poisoned: {e}"),
        })
    }

    /// Run `f` against the connection outside any explicit transaction.
    pub fn read<T, F>(&self, f: F) -> SealResult<T>
    where
        F: FnOnce(&Connection) -> SealResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one `IMMEDIATE` transaction and commit if it succeeds.
    ///
    /// If `f` returns an error the transaction is rolled back and nothing it
    /// wrote is visible afterwards.
    pub fn write<T, F>(&self, f: F) -> SealResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> SealResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .storage()?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().storage()?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "write transaction failed, rolling back");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed; connection drop will discard the transaction");
                }
                Err(e)
            }
        }
    }
}
