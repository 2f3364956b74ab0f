//! Durable sync queue
//!
//! One entry per local write that has not been confirmed by the server.
//! Entries are created atomically alongside the entity row (same
//! transaction) and consumed only by the dispatcher; UI-facing code never
//! mutates them. Drain order is priority tier first, FIFO within a tier.

mod backoff;
mod dispatcher;

pub use backoff::BackoffPolicy;
pub use dispatcher::{DrainReport, QueueHandler, SyncDispatcher};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use libsql::Connection;

use crate::db::row::{opt_int, opt_text};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::record::RecordId;

/// Mutation kind carried by a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::Database(format!("unknown queue operation '{other}'"))),
        }
    }
}

/// One pending mutation awaiting a server round trip
#[derive(Debug, Clone)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub entity_table: String,
    pub operation: Operation,
    pub record_id: RecordId,
    /// Payload snapshot captured at enqueue time
    pub payload: serde_json::Value,
    /// Higher drains first
    pub priority: i64,
    pub retry_count: i64,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    pub error_message: Option<String>,
}

/// Repository over the `sync_queue` table
pub struct SyncQueue {
    db: Arc<Database>,
}

impl SyncQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry on an already-open connection.
    ///
    /// Entity stores call this from inside their write transaction so the
    /// row and its queue entry commit or roll back together.
    pub(crate) async fn enqueue_on(
        conn: &Connection,
        entity_table: &str,
        operation: Operation,
        record_id: RecordId,
        payload: &serde_json::Value,
        priority: i64,
    ) -> Result<i64> {
        let created_at = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO sync_queue (entity_table, operation, record_id, payload, priority, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                entity_table,
                operation.as_str(),
                record_id.as_str(),
                serde_json::to_string(payload)?,
                priority,
                created_at
            ],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    /// Append an entry outside any entity transaction
    pub async fn enqueue(
        &self,
        entity_table: &str,
        operation: Operation,
        record_id: RecordId,
        payload: &serde_json::Value,
        priority: i64,
    ) -> Result<i64> {
        let conn = self.db.connection()?;
        Self::enqueue_on(&conn, entity_table, operation, record_id, payload, priority).await
    }

    /// Read up to `limit` entries in drain order: priority descending, then
    /// FIFO by creation time
    pub async fn drain(&self, limit: u32) -> Result<Vec<SyncQueueEntry>> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, entity_table, operation, record_id, payload, priority,
                        retry_count, created_at, last_attempt_at, error_message
                 FROM sync_queue
                 ORDER BY priority DESC, created_at ASC, id ASC
                 LIMIT ?",
                [i64::from(limit)],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Look up a single entry
    pub async fn get(&self, id: i64) -> Result<Option<SyncQueueEntry>> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, entity_table, operation, record_id, payload, priority,
                        retry_count, created_at, last_attempt_at, error_message
                 FROM sync_queue WHERE id = ?",
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// Remove a confirmed entry
    pub async fn remove(&self, id: i64) -> Result<()> {
        let conn = self.db.connection()?;
        conn.execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(())
    }

    /// Record a failed attempt: bump the retry count and remember when and
    /// why, leaving the entry queued for a later drain
    pub async fn record_failure(&self, id: i64, error: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.db.connection()?;
        conn.execute(
            "UPDATE sync_queue
             SET retry_count = retry_count + 1, last_attempt_at = ?, error_message = ?
             WHERE id = ?",
            libsql::params![now, error, id],
        )
        .await?;
        Ok(())
    }

    /// Number of entries still waiting
    pub async fn pending_len(&self) -> Result<i64> {
        let conn = self.db.connection()?;
        let mut rows = conn.query("SELECT COUNT(*) FROM sync_queue", ()).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::Database("COUNT returned no rows".to_string()))?;
        Ok(row.get(0)?)
    }

    fn parse_entry(row: &libsql::Row) -> Result<SyncQueueEntry> {
        let operation: String = row.get(2)?;
        let record_id: String = row.get(3)?;
        let payload: String = row.get(4)?;

        Ok(SyncQueueEntry {
            id: row.get(0)?,
            entity_table: row.get(1)?,
            operation: operation.parse()?,
            record_id: record_id
                .parse()
                .map_err(|_| Error::Database(format!("invalid record id '{record_id}'")))?,
            payload: serde_json::from_str(&payload)?,
            priority: row.get(5)?,
            retry_count: row.get(6)?,
            created_at: row.get(7)?,
            last_attempt_at: opt_int(row, 8)?,
            error_message: opt_text(row, 9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn setup() -> SyncQueue {
        let db = Arc::new(Database::in_memory());
        db.initialize().await.unwrap();
        SyncQueue::new(db)
    }

    fn payload(marker: &str) -> serde_json::Value {
        serde_json::json!({ "marker": marker })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_and_drain_fifo() {
        let queue = setup().await;

        for marker in ["a", "b", "c"] {
            queue
                .enqueue("weight_measurements", Operation::Create, RecordId::new(), &payload(marker), 0)
                .await
                .unwrap();
        }

        let entries = queue.drain(10).await.unwrap();
        let markers: Vec<_> = entries
            .iter()
            .map(|e| e.payload["marker"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(markers, vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_priority_before_fifo() {
        let queue = setup().await;

        queue
            .enqueue("nutrition_logs", Operation::Create, RecordId::new(), &payload("low"), 0)
            .await
            .unwrap();
        queue
            .enqueue("app_settings", Operation::Update, RecordId::new(), &payload("high"), 10)
            .await
            .unwrap();

        let entries = queue.drain(10).await.unwrap();
        assert_eq!(entries[0].payload["marker"], "high");
        assert_eq!(entries[1].payload["marker"], "low");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_and_pending_len() {
        let queue = setup().await;

        let id = queue
            .enqueue("weight_measurements", Operation::Create, RecordId::new(), &payload("x"), 0)
            .await
            .unwrap();
        assert_eq!(queue.pending_len().await.unwrap(), 1);

        queue.remove(id).await.unwrap();
        assert_eq!(queue.pending_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_failure_bumps_retry() {
        let queue = setup().await;

        let id = queue
            .enqueue("weight_measurements", Operation::Update, RecordId::new(), &payload("x"), 0)
            .await
            .unwrap();

        queue.record_failure(id, "network down").await.unwrap();
        queue.record_failure(id, "still down").await.unwrap();

        let entry = queue.get(id).await.unwrap().unwrap();
        assert_eq!(entry.retry_count, 2);
        assert_eq!(entry.error_message.as_deref(), Some("still down"));
        assert!(entry.last_attempt_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_operation_round_trip() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("UPSERT".parse::<Operation>().is_err());
    }
}
