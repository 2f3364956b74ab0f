//! Shared record model: identifiers, sync lifecycle and row snapshots

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a local record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-record reconciliation state with the server.
///
/// A record created by a local write starts `LocalOnly` and may only reach
/// `Synced` through a confirmed server round trip or an accepted
/// server-origin merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    LocalOnly,
    Synced,
    Conflict,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Whether the record still needs a server round trip
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::LocalOnly | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_only" => Ok(Self::LocalOnly),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            "failed" => Ok(Self::Failed),
            other => Err(crate::error::Error::Database(format!(
                "unknown sync status '{other}'"
            ))),
        }
    }
}

/// An immutable snapshot of one locally stored row.
///
/// `P` is the entity-specific payload, serialized as a JSON column at the
/// storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord<P> {
    /// Process-generated identifier, stable for the record's local lifetime
    pub local_id: RecordId,
    /// Owning user; all queries are scoped by it
    pub user_id: String,
    /// Entity-specific uniqueness key, at most one row per `(user_id, natural_key)`
    pub natural_key: String,
    /// Entity-specific fields
    pub payload: P,
    /// Identity assigned by the remote system once accepted
    pub server_id: Option<String>,
    /// Version timestamp assigned by the remote system once accepted
    pub server_timestamp: Option<String>,
    pub sync_status: SyncStatus,
    /// Incremented on failed sync attempts, reset to 0 on success
    pub retry_count: i64,
    /// Last failure reason, cleared on success
    pub error_message: Option<String>,
    /// Local wall-clock creation time (unix ms)
    pub created_at: i64,
    /// Changes on every local mutation (unix ms)
    pub updated_at: i64,
}

/// A server-origin record, as returned by the remote API and consumed by
/// `merge_server_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord<P> {
    pub server_id: String,
    pub server_timestamp: String,
    pub payload: P,
}

/// Options for `update_sync_status`, the only way sync handlers record the
/// outcome of a remote attempt.
#[derive(Debug, Clone, Default)]
pub struct SyncStatusUpdate {
    pub server_id: Option<String>,
    pub server_timestamp: Option<String>,
    pub error_message: Option<String>,
    pub increment_retry: bool,
}

impl SyncStatusUpdate {
    /// Outcome of a confirmed round trip: server identity recorded, retry
    /// count and error cleared by the store.
    #[must_use]
    pub fn confirmed(server_id: impl Into<String>, server_timestamp: impl Into<String>) -> Self {
        Self {
            server_id: Some(server_id.into()),
            server_timestamp: Some(server_timestamp.into()),
            ..Self::default()
        }
    }

    /// Outcome of a failed attempt
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error_message: Some(error.into()),
            increment_retry: true,
            ..Self::default()
        }
    }
}

/// Read options for `get_records`
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Skip rows that have not been confirmed by the server yet
    pub exclude_local_only: bool,
    /// Newest first when set; oldest first otherwise
    pub newest_first: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Per-status record counts for diagnostics, returned by `get_sync_stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total: i64,
    pub local_only: i64,
    pub synced: i64,
    pub failed: i64,
    pub conflict: i64,
}
