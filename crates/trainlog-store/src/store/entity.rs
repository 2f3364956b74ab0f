//! Entity contract for the generic offline store

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// What a concrete entity contributes to its [`super::EntityStore`].
///
/// Payloads are typed structs, serialized to a JSON column at the storage
/// boundary; sparse measurement shapes use explicit optional fields rather
/// than opaque maps.
pub trait OfflineEntity: Send + Sync + 'static {
    /// Table name; one table per entity
    const TABLE: &'static str;

    /// Retention window for `cleanup_expired_data`. `None` disables cleanup
    /// for this entity entirely.
    const RETENTION_DAYS: Option<i64> = None;

    /// Sync-queue priority for this entity's mutations (higher drains first)
    const PRIORITY: i64 = 0;

    /// Entity-specific fields stored in the payload column
    type Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Input accepted by `create`
    type CreateInput: Send + 'static;

    /// Partial update accepted by `update`
    type UpdateInput: Send + 'static;

    /// Build the initial payload for a fresh local record
    fn payload_from_create(input: Self::CreateInput) -> Self::Payload;

    /// Apply a partial update in place
    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput);

    /// The domain-meaningful uniqueness key, scoped per user (e.g. a
    /// measurement timestamp or a calendar date)
    fn natural_key(payload: &Self::Payload) -> String;

    /// DDL executed by `initialize()`; entities may append extra statements
    fn ddl() -> Vec<String> {
        record_table_ddl(Self::TABLE)
    }
}

/// Standard record table layout shared by every entity.
///
/// The UNIQUE constraint on `(user_id, natural_key)` is the storage-level
/// enforcement of the one-row-per-natural-key invariant; the `(sync_status)`
/// index keeps pending-record scans cheap as data grows.
pub fn record_table_ddl(table: &str) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                local_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                server_id TEXT,
                server_timestamp TEXT,
                sync_status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id, natural_key)
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_user_key ON {table}(user_id, natural_key)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_status ON {table}(sync_status)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_user_created ON {table}(user_id, created_at)"),
    ]
}

/// Snapshot carried by a sync-queue entry.
///
/// Captured at enqueue time so DELETE operations keep their identifying
/// fields after the local row is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload<P> {
    pub user_id: String,
    pub natural_key: String,
    pub server_id: Option<String>,
    pub payload: P,
}
