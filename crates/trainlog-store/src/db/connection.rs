//! Database connection management
//!
//! `Database` is the single source of truth for the embedded store's
//! lifecycle. It owns the one libSQL handle in the process; entity stores
//! borrow a connection per operation and never hold their own.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use libsql::{Builder, Connection};

use crate::error::{Error, Result};

use super::migrations;

tokio::task_local! {
    // Address of the Database whose transaction is open on this task
    static OPEN_TX: usize;
}

enum Location {
    Disk(PathBuf),
    Memory,
}

struct Handle {
    // Kept alive for the lifetime of the connection
    _db: libsql::Database,
    conn: Connection,
}

/// Owner of the embedded store handle.
///
/// Construction is cheap and does not touch the filesystem; `initialize()`
/// opens the store. `close()` releases the handle so a later `initialize()`
/// is a clean cold start.
pub struct Database {
    location: Location,
    state: Mutex<Option<Handle>>,
    init_lock: tokio::sync::Mutex<()>,
    tx_lock: tokio::sync::Mutex<()>,
}

impl Database {
    /// Create a manager for a database file at the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            location: Location::Disk(path.as_ref().to_path_buf()),
            state: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            tx_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a manager for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            state: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            tx_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the store, apply pragmas and run pending migrations.
    ///
    /// Idempotent: a second call on an initialized manager is a no-op. Any
    /// failure here is fatal and maps to [`Error::StoreUnavailable`]; no
    /// entity store may be used afterwards.
    pub async fn initialize(&self) -> Result<()> {
        // Serialize first-time opens; concurrent callers must not each build
        // a handle and silently replace one another's
        let _guard = self.init_lock.lock().await;

        if self.is_initialized() {
            return Ok(());
        }

        let path = match &self.location {
            Location::Disk(path) => path.to_string_lossy().to_string(),
            Location::Memory => ":memory:".to_string(),
        };

        let db = Builder::new_local(&path)
            .build()
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        let conn = db.connect().map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        Self::configure(&conn).await?;

        {
            let mut state = self.state.lock().expect("database state lock poisoned");
            *state = Some(Handle { _db: db, conn });
        }

        if let Err(e) = self.run_migrations().await {
            // Leave the manager uninitialized rather than half-migrated
            self.close();
            return Err(Error::StoreUnavailable(e.to_string()));
        }

        tracing::debug!("database initialized at {path}");
        Ok(())
    }

    /// Whether `initialize()` has completed on this manager
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .expect("database state lock poisoned")
            .is_some()
    }

    /// Clone out the shared connection handle
    pub fn connection(&self) -> Result<Connection> {
        let state = self.state.lock().expect("database state lock poisoned");
        state
            .as_ref()
            .map(|handle| handle.conn.clone())
            .ok_or_else(|| Error::NotInitialized("database".to_string()))
    }

    /// Release the handle and reset lifecycle flags.
    ///
    /// A subsequent `initialize()` starts cold; for in-memory databases that
    /// means a fresh empty store.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("database state lock poisoned");
        *state = None;
    }

    /// Configure the connection for WAL read/write concurrency and
    /// referential integrity
    async fn configure(conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok(); // no-op for in-memory databases
        conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();
        conn.execute("PRAGMA foreign_keys = ON;", ())
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Apply pending schema migrations.
    ///
    /// All steps for this boot run inside one transaction together with the
    /// version bump; any failure rolls back the entire migration and the
    /// store stays at its pre-migration version.
    pub async fn run_migrations(&self) -> Result<()> {
        self.with_transaction(|conn| async move { migrations::run(&conn).await })
            .await
    }

    /// Execute `op` inside `BEGIN`/`COMMIT`, rolling back on any error.
    ///
    /// Transactions from different tasks are serialized: a caller that
    /// arrives while another task's transaction is open waits its turn, so
    /// its writes commit (or roll back) on their own and never share the
    /// fate of an unrelated transaction.
    ///
    /// Reentrancy rule: a nested call from inside `op` on the same task runs
    /// inline without opening a second transaction (the embedded store
    /// forbids nesting). Nested calls therefore do not get their own
    /// isolation; this is a documented simplification.
    pub async fn with_transaction<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.connection()?;
        let token = std::ptr::from_ref(self) as usize;

        // Same task, same manager: already inside this transaction
        if OPEN_TX.try_with(|&open| open == token).unwrap_or(false) {
            return op(conn).await;
        }

        let _guard = self.tx_lock.lock().await;

        conn.execute("BEGIN", ()).await?;

        match OPEN_TX.scope(token, op(conn.clone())).await {
            Ok(value) => match conn.execute("COMMIT", ()).await {
                Ok(_) => Ok(value),
                Err(e) => {
                    conn.execute("ROLLBACK", ()).await.ok();
                    Err(e.into())
                }
            },
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }
}
