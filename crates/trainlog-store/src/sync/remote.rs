//! Per-entity remote API contract

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Error as StoreError;
use crate::record::ServerRecord;

/// Failures a remote call can produce.
///
/// Handlers treat every variant the same way (record as `failed`, rethrow)
/// except [`RemoteError::Conflict`], which carries the server's canonical
/// copy and triggers server-authority resolution instead.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected request: {0} ({1})")]
    Rejected(String, u16),

    /// The server holds a differing copy of this record; the payload is the
    /// server's version as raw JSON
    #[error("Server holds a conflicting copy")]
    Conflict(serde_json::Value),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<RemoteError> for StoreError {
    fn from(e: RemoteError) -> Self {
        Self::Sync(e.to_string())
    }
}

/// Natural-key fields needed to delete a record remotely.
///
/// Snapshotted at enqueue time, because by the time the delete runs the
/// local row no longer exists.
#[derive(Debug, Clone)]
pub struct DeleteKey {
    pub user_id: String,
    pub natural_key: String,
    pub server_id: Option<String>,
}

/// Async client for one entity's server endpoints.
///
/// Returns the server's canonical record (with server-assigned identity and
/// timestamp) on success, or a [`RemoteError`] on failure.
#[async_trait]
pub trait EntityRemote<P>: Send + Sync {
    async fn create(&self, user_id: &str, payload: &P)
        -> Result<ServerRecord<P>, RemoteError>;

    async fn update(
        &self,
        user_id: &str,
        server_id: Option<&str>,
        payload: &P,
    ) -> Result<ServerRecord<P>, RemoteError>;

    async fn delete(&self, key: &DeleteKey) -> Result<(), RemoteError>;
}
