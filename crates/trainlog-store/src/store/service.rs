//! Generic entity store implementation

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libsql::Connection;

use crate::db::row::{nullable, opt_text};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::queue::{Operation, SyncQueue};
use crate::record::{
    LocalRecord, RecordId, RecordQuery, ServerRecord, SyncStats, SyncStatus, SyncStatusUpdate,
};

use super::entity::{OfflineEntity, QueuePayload};
use super::op_queue::OpQueue;

const COLUMNS: &str = "local_id, user_id, natural_key, payload, server_id, server_timestamp, \
                       sync_status, retry_count, error_message, created_at, updated_at";

/// Offline-first store for one entity.
///
/// Writes are optimistic: `create`/`update`/`delete` return once the local
/// row and its sync-queue entry are durable, without waiting for the server.
/// All mutators are serialized through a per-store operation queue; reads go
/// straight to the connection.
pub struct EntityStore<E: OfflineEntity> {
    db: Arc<Database>,
    ops: OpQueue,
    initialized: AtomicBool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: OfflineEntity> EntityStore<E> {
    /// Create a store borrowing the shared connection manager.
    ///
    /// Spawns the operation-queue worker, so this must run inside a tokio
    /// runtime.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            ops: OpQueue::new(E::TABLE),
            initialized: AtomicBool::new(false),
            _entity: PhantomData,
        }
    }

    /// Ensure the connection manager is initialized, then create this
    /// entity's table and indexes. Must be called before any other method.
    pub async fn initialize(&self) -> Result<()> {
        self.db.initialize().await?;

        let conn = self.db.connection()?;
        for stmt in E::ddl() {
            conn.execute(stmt.as_str(), ())
                .await
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        }

        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotInitialized(E::TABLE.to_string()))
        }
    }

    /// Insert a `local_only` row and its CREATE queue entry in one
    /// transaction, returning the fresh local identifier.
    ///
    /// Once this returns the record is durable locally, even if the process
    /// dies before any sync happens.
    pub async fn create(&self, user_id: &str, input: E::CreateInput) -> Result<RecordId> {
        self.ensure_ready()?;
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_owned();
        self.ops
            .run(move || Box::pin(async move { create_in::<E>(&db, &user_id, input).await }))
            .await
    }

    /// Read matching rows as immutable snapshots. Never mutates sync state.
    pub async fn get_records(
        &self,
        user_id: &str,
        query: &RecordQuery,
    ) -> Result<Vec<LocalRecord<E::Payload>>> {
        self.ensure_ready()?;
        let conn = self.db.connection()?;

        let mut sql = format!("SELECT {COLUMNS} FROM {} WHERE user_id = ?", E::TABLE);
        if query.exclude_local_only {
            sql.push_str(" AND sync_status != 'local_only'");
        }
        sql.push_str(if query.newest_first {
            " ORDER BY created_at DESC"
        } else {
            " ORDER BY created_at ASC"
        });
        sql.push_str(" LIMIT ? OFFSET ?");

        let limit = query.limit.map_or(-1_i64, i64::from);
        let offset = i64::from(query.offset.unwrap_or(0));

        let mut rows = conn
            .query(&sql, libsql::params![user_id, limit, offset])
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record::<E>(&row)?);
        }
        Ok(records)
    }

    /// Single-record lookup; absent records are `None`, not an error
    pub async fn get_by_id(&self, local_id: RecordId) -> Result<Option<LocalRecord<E::Payload>>> {
        self.ensure_ready()?;
        let conn = self.db.connection()?;
        find_by_id_on::<E>(&conn, local_id).await
    }

    /// Apply a partial update and enqueue an UPDATE entry.
    ///
    /// A local edit invalidates a prior confirmation: `synced` rows drop back
    /// to `local_only`. `failed`/`conflict` rows keep their status, they were
    /// never confirmed anyway.
    pub async fn update(
        &self,
        local_id: RecordId,
        updates: E::UpdateInput,
    ) -> Result<LocalRecord<E::Payload>> {
        self.ensure_ready()?;
        let db = Arc::clone(&self.db);
        self.ops
            .run(move || Box::pin(async move { update_in::<E>(&db, local_id, updates).await }))
            .await
    }

    /// Remove a local row.
    ///
    /// If the server knows the row, a DELETE queue entry is written first
    /// (same transaction) so the deletion propagates; rows that never reached
    /// the server are removed with no queue entry.
    pub async fn delete(&self, local_id: RecordId) -> Result<()> {
        self.ensure_ready()?;
        let db = Arc::clone(&self.db);
        self.ops
            .run(move || Box::pin(async move { delete_in::<E>(&db, local_id).await }))
            .await
    }

    /// Rows still awaiting a confirmed round trip (`local_only` or `failed`),
    /// oldest first: the retry surface for background reconciliation
    pub async fn get_pending_records(&self, user_id: &str) -> Result<Vec<LocalRecord<E::Payload>>> {
        self.ensure_ready()?;
        let conn = self.db.connection()?;

        let sql = format!(
            "SELECT {COLUMNS} FROM {} \
             WHERE user_id = ? AND sync_status IN ('local_only', 'failed') \
             ORDER BY created_at ASC",
            E::TABLE
        );

        let mut rows = conn.query(&sql, [user_id]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record::<E>(&row)?);
        }
        Ok(records)
    }

    /// Record the outcome of a remote attempt. The only mutation path sync
    /// handlers are allowed to use.
    pub async fn update_sync_status(
        &self,
        local_id: RecordId,
        status: SyncStatus,
        options: SyncStatusUpdate,
    ) -> Result<()> {
        self.ensure_ready()?;
        let db = Arc::clone(&self.db);
        self.ops
            .run(move || {
                Box::pin(async move { update_sync_status_in::<E>(&db, local_id, status, options).await })
            })
            .await
    }

    /// Merge a batch of server-origin records, server fields winning.
    ///
    /// Existing rows (matched by natural key) are overwritten in place and
    /// marked `synced`; unknown records are inserted as `synced` rows. The
    /// whole batch runs in one transaction; a partial failure rolls back
    /// entirely. Applying the same batch twice is a no-op.
    pub async fn merge_server_data(
        &self,
        user_id: &str,
        server_records: Vec<ServerRecord<E::Payload>>,
    ) -> Result<usize> {
        self.ensure_ready()?;
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_owned();
        self.ops
            .run(move || Box::pin(async move { merge_in::<E>(&db, &user_id, server_records).await }))
            .await
    }

    /// Entity-specific retention: deletes `synced` rows older than the
    /// retention window. Unconfirmed rows (`local_only`, `failed`,
    /// `conflict`) are never dropped regardless of age.
    pub async fn cleanup_expired_data(&self) -> Result<u64> {
        self.ensure_ready()?;
        let db = Arc::clone(&self.db);
        self.ops
            .run(move || Box::pin(async move { cleanup_in::<E>(&db).await }))
            .await
    }

    /// Per-status record counts for diagnostics. Read-only.
    pub async fn count_by_status(&self, user_id: &str) -> Result<SyncStats> {
        self.ensure_ready()?;
        let conn = self.db.connection()?;

        let sql = format!(
            "SELECT sync_status, COUNT(*) FROM {} WHERE user_id = ? GROUP BY sync_status",
            E::TABLE
        );

        let mut rows = conn.query(&sql, [user_id]).await?;
        let mut stats = SyncStats::default();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.total += count;
            match status.parse::<SyncStatus>()? {
                SyncStatus::LocalOnly => stats.local_only = count,
                SyncStatus::Synced => stats.synced = count,
                SyncStatus::Failed => stats.failed = count,
                SyncStatus::Conflict => stats.conflict = count,
            }
        }
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Row-level helpers, shared by the queued operations

fn queue_snapshot<E: OfflineEntity>(record: &LocalRecord<E::Payload>) -> Result<serde_json::Value> {
    let snapshot = QueuePayload {
        user_id: record.user_id.clone(),
        natural_key: record.natural_key.clone(),
        server_id: record.server_id.clone(),
        payload: record.payload.clone(),
    };
    Ok(serde_json::to_value(&snapshot)?)
}

fn parse_record<E: OfflineEntity>(row: &libsql::Row) -> Result<LocalRecord<E::Payload>> {
    let local_id: String = row.get(0)?;
    let payload_json: String = row.get(3)?;
    let status: String = row.get(6)?;

    Ok(LocalRecord {
        local_id: local_id
            .parse()
            .map_err(|_| Error::Database(format!("invalid record id '{local_id}'")))?,
        user_id: row.get(1)?,
        natural_key: row.get(2)?,
        payload: serde_json::from_str(&payload_json)?,
        server_id: opt_text(row, 4)?,
        server_timestamp: opt_text(row, 5)?,
        sync_status: status.parse()?,
        retry_count: row.get(7)?,
        error_message: opt_text(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

async fn find_by_id_on<E: OfflineEntity>(
    conn: &Connection,
    local_id: RecordId,
) -> Result<Option<LocalRecord<E::Payload>>> {
    let sql = format!("SELECT {COLUMNS} FROM {} WHERE local_id = ?", E::TABLE);
    let mut rows = conn.query(&sql, [local_id.as_str()]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_record::<E>(&row)?)),
        None => Ok(None),
    }
}

async fn find_by_key_on<E: OfflineEntity>(
    conn: &Connection,
    user_id: &str,
    natural_key: &str,
) -> Result<Option<LocalRecord<E::Payload>>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE user_id = ? AND natural_key = ?",
        E::TABLE
    );
    let mut rows = conn.query(&sql, [user_id, natural_key]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_record::<E>(&row)?)),
        None => Ok(None),
    }
}

fn map_constraint<E: OfflineEntity>(e: libsql::Error, natural_key: &str) -> Error {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        Error::Duplicate(format!("{}: natural key '{natural_key}'", E::TABLE))
    } else {
        Error::LibSql(e)
    }
}

async fn insert_record_on<E: OfflineEntity>(
    conn: &Connection,
    record: &LocalRecord<E::Payload>,
) -> Result<()> {
    let payload_json = serde_json::to_string(&record.payload)?;
    let sql = format!(
        "INSERT INTO {} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        E::TABLE
    );
    conn.execute(
        &sql,
        libsql::params![
            record.local_id.as_str(),
            record.user_id.clone(),
            record.natural_key.clone(),
            payload_json,
            nullable(record.server_id.clone()),
            nullable(record.server_timestamp.clone()),
            record.sync_status.as_str(),
            record.retry_count,
            nullable(record.error_message.clone()),
            record.created_at,
            record.updated_at
        ],
    )
    .await
    .map_err(|e| map_constraint::<E>(e, &record.natural_key))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Queued operations

async fn create_in<E: OfflineEntity>(
    db: &Database,
    user_id: &str,
    input: E::CreateInput,
) -> Result<RecordId> {
    let payload = E::payload_from_create(input);
    let natural_key = E::natural_key(&payload);

    let conn = db.connection()?;
    if find_by_key_on::<E>(&conn, user_id, &natural_key).await?.is_some() {
        return Err(Error::Duplicate(format!(
            "{}: natural key '{natural_key}'",
            E::TABLE
        )));
    }

    let now = chrono::Utc::now().timestamp_millis();
    let record = LocalRecord {
        local_id: RecordId::new(),
        user_id: user_id.to_string(),
        natural_key,
        payload,
        server_id: None,
        server_timestamp: None,
        sync_status: SyncStatus::LocalOnly,
        retry_count: 0,
        error_message: None,
        created_at: now,
        updated_at: now,
    };
    let snapshot = queue_snapshot::<E>(&record)?;

    // Row and queue entry must land together; a crash between the two would
    // leave a local_only record nothing ever syncs
    db.with_transaction(|conn| {
        let record = &record;
        let snapshot = &snapshot;
        async move {
            insert_record_on::<E>(&conn, record).await?;
            SyncQueue::enqueue_on(
                &conn,
                E::TABLE,
                Operation::Create,
                record.local_id,
                snapshot,
                E::PRIORITY,
            )
            .await?;
            Ok(())
        }
    })
    .await?;

    tracing::debug!(table = E::TABLE, id = %record.local_id, "created local record");
    Ok(record.local_id)
}

async fn update_in<E: OfflineEntity>(
    db: &Database,
    local_id: RecordId,
    updates: E::UpdateInput,
) -> Result<LocalRecord<E::Payload>> {
    let conn = db.connection()?;
    let existing = find_by_id_on::<E>(&conn, local_id)
        .await?
        .ok_or_else(|| Error::NotFound(local_id.to_string()))?;

    let mut payload = existing.payload.clone();
    E::apply_update(&mut payload, updates);
    let natural_key = E::natural_key(&payload);

    let sync_status = match existing.sync_status {
        SyncStatus::Synced => SyncStatus::LocalOnly,
        other => other,
    };

    let record = LocalRecord {
        payload,
        natural_key,
        sync_status,
        updated_at: chrono::Utc::now().timestamp_millis(),
        ..existing
    };
    let snapshot = queue_snapshot::<E>(&record)?;

    db.with_transaction(|conn| {
        let record = &record;
        let snapshot = &snapshot;
        async move {
            let payload_json = serde_json::to_string(&record.payload)?;
            let sql = format!(
                "UPDATE {} SET payload = ?, natural_key = ?, sync_status = ?, updated_at = ? \
                 WHERE local_id = ?",
                E::TABLE
            );
            conn.execute(
                &sql,
                libsql::params![
                    payload_json,
                    record.natural_key.clone(),
                    record.sync_status.as_str(),
                    record.updated_at,
                    record.local_id.as_str()
                ],
            )
            .await
            .map_err(|e| map_constraint::<E>(e, &record.natural_key))?;

            SyncQueue::enqueue_on(
                &conn,
                E::TABLE,
                Operation::Update,
                record.local_id,
                snapshot,
                E::PRIORITY,
            )
            .await?;
            Ok(())
        }
    })
    .await?;

    Ok(record)
}

async fn delete_in<E: OfflineEntity>(db: &Database, local_id: RecordId) -> Result<()> {
    let conn = db.connection()?;
    let existing = find_by_id_on::<E>(&conn, local_id)
        .await?
        .ok_or_else(|| Error::NotFound(local_id.to_string()))?;

    // Only rows the server knows about need a remote delete; the snapshot
    // keeps the identifying fields alive after the row is gone
    let needs_remote =
        existing.sync_status == SyncStatus::Synced || existing.server_id.is_some();
    let snapshot = queue_snapshot::<E>(&existing)?;

    db.with_transaction(|conn| {
        let snapshot = &snapshot;
        async move {
            if needs_remote {
                SyncQueue::enqueue_on(
                    &conn,
                    E::TABLE,
                    Operation::Delete,
                    local_id,
                    snapshot,
                    E::PRIORITY,
                )
                .await?;
            }
            let sql = format!("DELETE FROM {} WHERE local_id = ?", E::TABLE);
            conn.execute(&sql, [local_id.as_str()]).await?;
            Ok(())
        }
    })
    .await?;

    Ok(())
}

async fn update_sync_status_in<E: OfflineEntity>(
    db: &Database,
    local_id: RecordId,
    status: SyncStatus,
    options: SyncStatusUpdate,
) -> Result<()> {
    let conn = db.connection()?;
    let existing = find_by_id_on::<E>(&conn, local_id)
        .await?
        .ok_or_else(|| Error::NotFound(local_id.to_string()))?;

    let (retry_count, error_message) = if status == SyncStatus::Synced {
        (0, None)
    } else {
        let retries = if options.increment_retry {
            existing.retry_count + 1
        } else {
            existing.retry_count
        };
        (retries, options.error_message)
    };

    let server_id = options.server_id.or(existing.server_id);
    let server_timestamp = options.server_timestamp.or(existing.server_timestamp);
    let now = chrono::Utc::now().timestamp_millis();

    let sql = format!(
        "UPDATE {} SET sync_status = ?, retry_count = ?, error_message = ?, \
         server_id = ?, server_timestamp = ?, updated_at = ? WHERE local_id = ?",
        E::TABLE
    );
    conn.execute(
        &sql,
        libsql::params![
            status.as_str(),
            retry_count,
            nullable(error_message),
            nullable(server_id),
            nullable(server_timestamp),
            now,
            local_id.as_str()
        ],
    )
    .await?;

    Ok(())
}

async fn merge_in<E: OfflineEntity>(
    db: &Database,
    user_id: &str,
    server_records: Vec<ServerRecord<E::Payload>>,
) -> Result<usize> {
    let merged = server_records.len();

    db.with_transaction(|conn| {
        let server_records = &server_records;
        async move {
            let now = chrono::Utc::now().timestamp_millis();
            for server_record in server_records {
                let natural_key = E::natural_key(&server_record.payload);
                match find_by_key_on::<E>(&conn, user_id, &natural_key).await? {
                    Some(existing) => {
                        // Server authority: local edits made since the last
                        // attempt are discarded here
                        let payload_json = serde_json::to_string(&server_record.payload)?;
                        let sql = format!(
                            "UPDATE {} SET payload = ?, server_id = ?, server_timestamp = ?, \
                             sync_status = 'synced', retry_count = 0, error_message = NULL, \
                             updated_at = ? WHERE local_id = ?",
                            E::TABLE
                        );
                        conn.execute(
                            &sql,
                            libsql::params![
                                payload_json,
                                server_record.server_id.clone(),
                                server_record.server_timestamp.clone(),
                                now,
                                existing.local_id.as_str()
                            ],
                        )
                        .await?;
                    }
                    None => {
                        let record = LocalRecord {
                            local_id: RecordId::new(),
                            user_id: user_id.to_string(),
                            natural_key,
                            payload: server_record.payload.clone(),
                            server_id: Some(server_record.server_id.clone()),
                            server_timestamp: Some(server_record.server_timestamp.clone()),
                            sync_status: SyncStatus::Synced,
                            retry_count: 0,
                            error_message: None,
                            created_at: now,
                            updated_at: now,
                        };
                        insert_record_on::<E>(&conn, &record).await?;
                    }
                }
            }
            Ok(())
        }
    })
    .await?;

    Ok(merged)
}

async fn cleanup_in<E: OfflineEntity>(db: &Database) -> Result<u64> {
    let Some(days) = E::RETENTION_DAYS else {
        return Ok(0);
    };

    let cutoff = chrono::Utc::now().timestamp_millis() - days * 24 * 60 * 60 * 1000;
    let conn = db.connection()?;
    let sql = format!(
        "DELETE FROM {} WHERE sync_status = 'synced' AND updated_at < ?",
        E::TABLE
    );
    let removed = conn.execute(&sql, [cutoff]).await?;

    if removed > 0 {
        tracing::debug!(table = E::TABLE, removed, "expired synced rows removed");
    }
    Ok(removed)
}
