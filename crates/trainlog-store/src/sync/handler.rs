//! Per-entity sync handler

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::queue::{Operation, QueueHandler, SyncQueueEntry};
use crate::record::{LocalRecord, RecordId, ServerRecord, SyncStats, SyncStatus, SyncStatusUpdate};
use crate::store::{EntityStore, OfflineEntity, QueuePayload};

use super::remote::{DeleteKey, EntityRemote, RemoteError};

/// Result of syncing one record in a batch pass
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub local_id: RecordId,
    /// `None` on success, the failure message otherwise
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Pushes one entity's local mutations to the server and records the result
/// on the local row.
///
/// Conflicts are resolved with strict server authority: the server's copy
/// overwrites local state via the store's merge path, no field-level merging
/// and no user prompt.
pub struct SyncHandler<E: OfflineEntity> {
    store: Arc<EntityStore<E>>,
    remote: Arc<dyn EntityRemote<E::Payload>>,
    batch_delay: Duration,
}

impl<E: OfflineEntity> SyncHandler<E> {
    pub fn new(store: Arc<EntityStore<E>>, remote: Arc<dyn EntityRemote<E::Payload>>) -> Self {
        Self {
            store,
            remote,
            batch_delay: Duration::from_millis(100),
        }
    }

    /// Pause inserted between records in a batch pass, to avoid hammering
    /// the server after a long offline stretch
    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Perform one queued mutation against the server.
    ///
    /// `snapshot` is the payload captured at enqueue time; CREATE and UPDATE
    /// re-read the live row (later edits supersede the snapshot), DELETE uses
    /// the snapshot because the row is already gone.
    pub async fn sync_to_server(
        &self,
        operation: Operation,
        record_id: RecordId,
        snapshot: &QueuePayload<E::Payload>,
    ) -> Result<()> {
        match operation {
            Operation::Create => self.create_on_server(record_id).await,
            Operation::Update => self.update_on_server(record_id).await,
            Operation::Delete => self.delete_from_server(snapshot).await,
        }
    }

    async fn create_on_server(&self, record_id: RecordId) -> Result<()> {
        let Some(record) = self.store.get_by_id(record_id).await? else {
            // Deleted locally before the queue drained; nothing to push
            tracing::debug!(table = E::TABLE, id = %record_id, "record gone before create sync");
            return Ok(());
        };

        match self.remote.create(&record.user_id, &record.payload).await {
            Ok(server) => self.confirm(record_id, server).await,
            Err(RemoteError::Conflict(server_json)) => {
                self.handle_conflict(record_id, &record.user_id, server_json)
                    .await
            }
            Err(e) => self.record_failure(record_id, e).await,
        }
    }

    async fn update_on_server(&self, record_id: RecordId) -> Result<()> {
        let Some(record) = self.store.get_by_id(record_id).await? else {
            tracing::debug!(table = E::TABLE, id = %record_id, "record gone before update sync");
            return Ok(());
        };

        let result = self
            .remote
            .update(&record.user_id, record.server_id.as_deref(), &record.payload)
            .await;

        match result {
            Ok(server) => self.confirm(record_id, server).await,
            Err(RemoteError::Conflict(server_json)) => {
                self.handle_conflict(record_id, &record.user_id, server_json)
                    .await
            }
            Err(e) => self.record_failure(record_id, e).await,
        }
    }

    async fn delete_from_server(&self, snapshot: &QueuePayload<E::Payload>) -> Result<()> {
        let key = DeleteKey {
            user_id: snapshot.user_id.clone(),
            natural_key: snapshot.natural_key.clone(),
            server_id: snapshot.server_id.clone(),
        };
        self.remote.delete(&key).await?;
        Ok(())
    }

    async fn confirm(&self, record_id: RecordId, server: ServerRecord<E::Payload>) -> Result<()> {
        self.store
            .update_sync_status(
                record_id,
                SyncStatus::Synced,
                SyncStatusUpdate::confirmed(server.server_id, server.server_timestamp),
            )
            .await
    }

    /// Mark the row `failed` and propagate the error so the queue keeps the
    /// entry for a later attempt
    async fn record_failure(&self, record_id: RecordId, error: RemoteError) -> Result<()> {
        let message = error.to_string();
        self.store
            .update_sync_status(
                record_id,
                SyncStatus::Failed,
                SyncStatusUpdate::failed(message.clone()),
            )
            .await?;
        Err(Error::Sync(message))
    }

    /// Server-authority conflict resolution: overwrite the local row with the
    /// server's copy and mark it `synced`. If the server's copy cannot be
    /// applied the row is parked as `conflict` and left out of future drains.
    async fn handle_conflict(
        &self,
        record_id: RecordId,
        user_id: &str,
        server_json: serde_json::Value,
    ) -> Result<()> {
        let applied = match serde_json::from_value::<ServerRecord<E::Payload>>(server_json) {
            Ok(server) => self
                .store
                .merge_server_data(user_id, vec![server])
                .await
                .map(|_| ()),
            Err(e) => Err(Error::Serialization(e)),
        };

        if let Err(e) = applied {
            tracing::warn!(
                table = E::TABLE,
                id = %record_id,
                error = %e,
                "conflict resolution failed, parking record"
            );
            self.store
                .update_sync_status(
                    record_id,
                    SyncStatus::Conflict,
                    SyncStatusUpdate {
                        error_message: Some(e.to_string()),
                        ..SyncStatusUpdate::default()
                    },
                )
                .await?;
            return Err(e);
        }

        tracing::debug!(table = E::TABLE, id = %record_id, "conflict resolved from server copy");
        Ok(())
    }

    /// Push a batch of records sequentially, pausing between calls.
    ///
    /// Per-record failures are captured in the outcomes; the pass always runs
    /// to the end.
    pub async fn batch_sync_to_server(
        &self,
        records: &[LocalRecord<E::Payload>],
    ) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let result = if record.server_id.is_some() {
                self.update_on_server(record.local_id).await
            } else {
                self.create_on_server(record.local_id).await
            };

            outcomes.push(SyncOutcome {
                local_id: record.local_id,
                error: result.err().map(|e| e.to_string()),
            });
        }

        outcomes
    }

    /// Push everything still pending for `user_id` (`local_only` and
    /// `failed` rows, oldest first)
    pub async fn force_sync_all_pending(&self, user_id: &str) -> Result<Vec<SyncOutcome>> {
        let pending = self.store.get_pending_records(user_id).await?;
        Ok(self.batch_sync_to_server(&pending).await)
    }

    /// Per-status counts for this entity
    pub async fn get_sync_stats(&self, user_id: &str) -> Result<SyncStats> {
        self.store.count_by_status(user_id).await
    }
}

#[async_trait]
impl<E: OfflineEntity> QueueHandler for SyncHandler<E> {
    async fn handle(&self, entry: &SyncQueueEntry) -> Result<()> {
        let snapshot: QueuePayload<E::Payload> = serde_json::from_value(entry.payload.clone())?;
        self.sync_to_server(entry.operation, entry.record_id, &snapshot)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::entities::{WeightEntity, WeightMeasurement, WeightUpdate};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // `super::*` pulls in the crate's one-parameter `Result` alias; remote
    // calls need the two-parameter form
    type RemoteResult<T> = std::result::Result<T, RemoteError>;

    enum Mode {
        Succeed,
        Fail,
        Conflict(serde_json::Value),
    }

    struct MockRemote {
        mode: Mutex<Mode>,
        calls: AtomicUsize,
        deletes: Mutex<Vec<DeleteKey>>,
    }

    impl MockRemote {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: Mutex::new(mode),
                calls: AtomicUsize::new(0),
                deletes: Mutex::new(Vec::new()),
            })
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn respond(&self, payload: &WeightMeasurement) -> RemoteResult<ServerRecord<WeightMeasurement>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match &*self.mode.lock().unwrap() {
                Mode::Succeed => Ok(ServerRecord {
                    server_id: format!("srv-{n}"),
                    server_timestamp: format!("2024-03-15T10:00:0{}Z", n % 10),
                    payload: payload.clone(),
                }),
                Mode::Fail => Err(RemoteError::Network("connection reset".to_string())),
                Mode::Conflict(body) => Err(RemoteError::Conflict(body.clone())),
            }
        }
    }

    #[async_trait]
    impl EntityRemote<WeightMeasurement> for MockRemote {
        async fn create(
            &self,
            _user_id: &str,
            payload: &WeightMeasurement,
        ) -> RemoteResult<ServerRecord<WeightMeasurement>> {
            self.respond(payload)
        }

        async fn update(
            &self,
            _user_id: &str,
            _server_id: Option<&str>,
            payload: &WeightMeasurement,
        ) -> RemoteResult<ServerRecord<WeightMeasurement>> {
            self.respond(payload)
        }

        async fn delete(&self, key: &DeleteKey) -> RemoteResult<()> {
            self.deletes.lock().unwrap().push(key.clone());
            match &*self.mode.lock().unwrap() {
                Mode::Fail => Err(RemoteError::Network("connection reset".to_string())),
                _ => Ok(()),
            }
        }
    }

    async fn setup(mode: Mode) -> (Arc<EntityStore<WeightEntity>>, Arc<MockRemote>, SyncHandler<WeightEntity>) {
        let db = Arc::new(Database::in_memory());
        let store = Arc::new(EntityStore::<WeightEntity>::new(db));
        store.initialize().await.unwrap();

        let remote = MockRemote::new(mode);
        let handler = SyncHandler::new(Arc::clone(&store), Arc::clone(&remote) as Arc<dyn EntityRemote<_>>)
            .with_batch_delay(Duration::ZERO);
        (store, remote, handler)
    }

    fn weight(measured_at: i64, kg: f64) -> WeightMeasurement {
        WeightMeasurement {
            measured_at,
            weight_kg: kg,
            note: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_confirmed_create_marks_record_synced() {
        let (store, _, handler) = setup(Mode::Succeed).await;

        let id = store.create("user-1", weight(1_700_000_000_000, 82.0)).await.unwrap();
        handler.create_on_server(id).await.unwrap();

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.server_id.as_deref(), Some("srv-1"));
        assert!(record.server_timestamp.is_some());
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.error_message, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_attempt_marks_record_and_rethrows() {
        let (store, _, handler) = setup(Mode::Fail).await;

        let id = store.create("user-1", weight(1_700_000_000_000, 82.0)).await.unwrap();
        let err = handler.create_on_server(id).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Failed);
        assert_eq!(record.retry_count, 1);
        assert!(record.error_message.unwrap().contains("connection reset"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_applies_server_copy() {
        let (store, remote, handler) = setup(Mode::Succeed).await;

        let id = store.create("user-1", weight(1_700_000_000_000, 82.0)).await.unwrap();

        // Server already holds 81.5 for the same instant
        let server_copy = serde_json::to_value(ServerRecord {
            server_id: "srv-existing".to_string(),
            server_timestamp: "2024-03-15T09:00:00Z".to_string(),
            payload: weight(1_700_000_000_000, 81.5),
        })
        .unwrap();
        remote.set_mode(Mode::Conflict(server_copy));

        handler.create_on_server(id).await.unwrap();

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.payload.weight_kg, 81.5);
        assert_eq!(record.server_id.as_deref(), Some("srv-existing"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_conflict_body_parks_record() {
        let (store, remote, handler) = setup(Mode::Succeed).await;

        let id = store.create("user-1", weight(1_700_000_000_000, 82.0)).await.unwrap();
        remote.set_mode(Mode::Conflict(serde_json::json!({ "not": "a record" })));

        assert!(handler.create_on_server(id).await.is_err());

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Conflict);
        assert!(record.error_message.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_uses_enqueue_snapshot() {
        let (_, remote, handler) = setup(Mode::Succeed).await;

        let snapshot = QueuePayload {
            user_id: "user-1".to_string(),
            natural_key: "1700000000000".to_string(),
            server_id: Some("srv-9".to_string()),
            payload: weight(1_700_000_000_000, 82.0),
        };
        handler.delete_from_server(&snapshot).await.unwrap();

        let deletes = remote.deletes.lock().unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].natural_key, "1700000000000");
        assert_eq!(deletes[0].server_id.as_deref(), Some("srv-9"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_deleted_before_drain_is_a_noop() {
        let (store, remote, handler) = setup(Mode::Succeed).await;

        let id = store.create("user-1", weight(1_700_000_000_000, 82.0)).await.unwrap();
        // Simulate the row vanishing before the queue drains
        store.delete(id).await.unwrap();

        handler.create_on_server(id).await.unwrap();
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_sync_all_pending_runs_to_completion() {
        let (store, remote, handler) = setup(Mode::Succeed).await;

        store.create("user-1", weight(1, 80.0)).await.unwrap();
        store.create("user-1", weight(2, 80.5)).await.unwrap();
        store.create("user-1", weight(3, 81.0)).await.unwrap();

        let outcomes = handler.force_sync_all_pending("user-1").await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(SyncOutcome::is_success));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);

        let stats = handler.get_sync_stats("user-1").await.unwrap();
        assert_eq!(stats.synced, 3);
        assert_eq!(stats.local_only, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_failures_do_not_stop_the_pass() {
        let (store, remote, handler) = setup(Mode::Succeed).await;

        store.create("user-1", weight(1, 80.0)).await.unwrap();
        store.create("user-1", weight(2, 80.5)).await.unwrap();
        remote.set_mode(Mode::Fail);

        let outcomes = handler.force_sync_all_pending("user-1").await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.is_success()));

        let stats = handler.get_sync_stats("user-1").await.unwrap();
        assert_eq!(stats.failed, 2);
    }

    // End-to-end lifecycle: optimistic create, confirmation, local edit
    // invalidating it, a failed retry, then the server's copy winning.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_weight_entry_lifecycle() {
        let (store, remote, handler) = setup(Mode::Succeed).await;
        let measured_at = 1_700_000_000_000;

        // Offline create is immediately visible
        let id = store.create("user-1", weight(measured_at, 82.0)).await.unwrap();
        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::LocalOnly);
        assert_eq!(record.payload.weight_kg, 82.0);

        // Confirmed round trip
        handler.create_on_server(id).await.unwrap();
        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);

        // A local edit invalidates the confirmation
        store
            .update(id, WeightUpdate { weight_kg: Some(83.0), note: None })
            .await
            .unwrap();
        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::LocalOnly);
        assert_eq!(record.payload.weight_kg, 83.0);

        // Retry fails while offline-ish
        remote.set_mode(Mode::Fail);
        assert!(handler.update_on_server(id).await.is_err());
        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Failed);
        assert_eq!(record.retry_count, 1);

        // Server-origin refresh wins over the unconfirmed local edit
        let merged = store
            .merge_server_data(
                "user-1",
                vec![ServerRecord {
                    server_id: "srv-1".to_string(),
                    server_timestamp: "2024-03-15T11:00:00Z".to_string(),
                    payload: weight(measured_at, 82.5),
                }],
            )
            .await
            .unwrap();
        assert_eq!(merged, 1);

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.payload.weight_kg, 82.5);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.error_message, None);
    }
}
