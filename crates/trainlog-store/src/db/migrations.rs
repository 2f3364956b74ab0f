//! Versioned schema migrations
//!
//! Entity tables are owned by their entity stores and created during store
//! initialization; migrations cover the shared tables (schema version
//! tracking, the sync queue) and later shape changes to them.

use libsql::Connection;

use crate::error::{Error, Result};

/// Schema version this build targets
pub const SCHEMA_VERSION: i32 = 2;

/// Apply every migration between the persisted version and
/// [`SCHEMA_VERSION`], recording each step.
///
/// The caller wraps this in a transaction; individual migrations must not
/// open their own.
pub(crate) async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        (),
    )
    .await?;

    let current = get_version(conn).await?;

    for version in (current + 1)..=SCHEMA_VERSION {
        apply(conn, version).await?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [i64::from(version)],
        )
        .await?;
        tracing::info!("Migrated database to version {version}");
    }

    Ok(())
}

/// Get the current schema version (0 when nothing has been recorded)
pub(crate) async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn).await,
        2 => migrate_v2(conn).await,
        other => Err(Error::StoreUnavailable(format!(
            "no migration registered for schema version {other}"
        ))),
    }
}

/// Version 1: durable sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_table TEXT NOT NULL,
            operation TEXT NOT NULL,
            record_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            last_attempt_at INTEGER,
            error_message TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at ASC)",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_table ON sync_queue(entity_table)",
    ];

    for stmt in statements {
        conn.execute(stmt, ()).await?;
    }

    Ok(())
}

/// Version 2: composite drain index (priority tier first, FIFO within a tier)
async fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_drain
         ON sync_queue(priority DESC, created_at ASC)",
        (),
    )
    .await?;

    Ok(())
}
