//! Background dispatcher draining the sync queue

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::sync::Connectivity;

use super::{BackoffPolicy, SyncQueue, SyncQueueEntry};

/// Turns one queue entry into a confirmed or failed remote outcome.
///
/// Implemented by the per-entity sync handlers; the dispatcher routes
/// entries to them by table name.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, entry: &SyncQueueEntry) -> Result<()>;
}

/// Outcome of one `drain_once` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// True when the pass was skipped because the device is offline
    pub offline: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entries not yet due under the backoff policy
    pub deferred: usize,
}

/// Drains the durable queue when the network allows it.
///
/// Runs one pass at a time on explicit triggers (app resume, manual sync,
/// a timer owned by the caller); there is no retry loop inside.
pub struct SyncDispatcher {
    queue: Arc<SyncQueue>,
    connectivity: Arc<dyn Connectivity>,
    backoff: BackoffPolicy,
    handlers: HashMap<String, Arc<dyn QueueHandler>>,
    batch_limit: u32,
}

impl SyncDispatcher {
    pub fn new(queue: Arc<SyncQueue>, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            queue,
            connectivity,
            backoff: BackoffPolicy::default(),
            handlers: HashMap::new(),
            batch_limit: 50,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Route entries for `entity_table` to `handler`
    pub fn register(&mut self, entity_table: impl Into<String>, handler: Arc<dyn QueueHandler>) {
        self.handlers.insert(entity_table.into(), handler);
    }

    /// Drain due entries once, sequentially.
    ///
    /// Per-entry failures are recorded on the entry and do not stop the
    /// pass; a completely offline device skips the pass without touching
    /// the queue. Local reads and writes are never blocked by this.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        if !self.connectivity.is_online() {
            report.offline = true;
            return Ok(report);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let entries = self.queue.drain(self.batch_limit).await?;

        for entry in entries {
            if !self.backoff.is_due(&entry, now) {
                report.deferred += 1;
                continue;
            }

            let Some(handler) = self.handlers.get(&entry.entity_table) else {
                tracing::warn!(
                    table = entry.entity_table,
                    id = entry.id,
                    "no handler registered for queue entry"
                );
                report.deferred += 1;
                continue;
            };

            report.attempted += 1;
            match handler.handle(&entry).await {
                Ok(()) => {
                    self.queue.remove(entry.id).await?;
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        table = entry.entity_table,
                        id = entry.id,
                        error = %e,
                        "queue entry failed to sync"
                    );
                    self.queue.record_failure(entry.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::Error;
    use crate::queue::Operation;
    use crate::record::RecordId;
    use crate::sync::AlwaysOnline;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Offline;
    impl Connectivity for Offline {
        fn is_online(&self) -> bool {
            false
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl QueueHandler for CountingHandler {
        async fn handle(&self, _entry: &SyncQueueEntry) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Sync("remote says no".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn setup() -> Arc<SyncQueue> {
        let db = Arc::new(Database::in_memory());
        db.initialize().await.unwrap();
        Arc::new(SyncQueue::new(db))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_skips_pass() {
        let queue = setup().await;
        queue
            .enqueue("weight_measurements", Operation::Create, RecordId::new(), &serde_json::json!({}), 0)
            .await
            .unwrap();

        let dispatcher = SyncDispatcher::new(Arc::clone(&queue), Arc::new(Offline));
        let report = dispatcher.drain_once().await.unwrap();

        assert!(report.offline);
        assert_eq!(report.attempted, 0);
        assert_eq!(queue.pending_len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_success_removes_entry() {
        let queue = setup().await;
        queue
            .enqueue("weight_measurements", Operation::Create, RecordId::new(), &serde_json::json!({}), 0)
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler { calls: AtomicUsize::new(0), fail: false });
        let mut dispatcher = SyncDispatcher::new(Arc::clone(&queue), Arc::new(AlwaysOnline));
        dispatcher.register("weight_measurements", Arc::clone(&handler) as Arc<dyn QueueHandler>);

        let report = dispatcher.drain_once().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_keeps_entry_and_records_attempt() {
        let queue = setup().await;
        let id = queue
            .enqueue("weight_measurements", Operation::Update, RecordId::new(), &serde_json::json!({}), 0)
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler { calls: AtomicUsize::new(0), fail: true });
        let mut dispatcher = SyncDispatcher::new(Arc::clone(&queue), Arc::new(AlwaysOnline));
        dispatcher.register("weight_measurements", handler as Arc<dyn QueueHandler>);

        let report = dispatcher.drain_once().await.unwrap();
        assert_eq!(report.failed, 1);

        let entry = queue.get(id).await.unwrap().unwrap();
        assert_eq!(entry.retry_count, 1);
        assert!(entry.error_message.unwrap().contains("remote says no"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backoff_defers_recently_failed_entries() {
        let queue = setup().await;
        let id = queue
            .enqueue("weight_measurements", Operation::Update, RecordId::new(), &serde_json::json!({}), 0)
            .await
            .unwrap();
        queue.record_failure(id, "first failure").await.unwrap();

        let handler = Arc::new(CountingHandler { calls: AtomicUsize::new(0), fail: false });
        let mut dispatcher = SyncDispatcher::new(Arc::clone(&queue), Arc::new(AlwaysOnline))
            .with_backoff(BackoffPolicy::new(
                Duration::from_secs(3600),
                Duration::from_secs(7200),
                0.0,
            ));
        dispatcher.register("weight_measurements", Arc::clone(&handler) as Arc<dyn QueueHandler>);

        let report = dispatcher.drain_once().await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(report.attempted, 0);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unregistered_table_is_left_alone() {
        let queue = setup().await;
        queue
            .enqueue("nutrition_logs", Operation::Create, RecordId::new(), &serde_json::json!({}), 0)
            .await
            .unwrap();

        let dispatcher = SyncDispatcher::new(Arc::clone(&queue), Arc::new(AlwaysOnline));
        let report = dispatcher.drain_once().await.unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(queue.pending_len().await.unwrap(), 1);
    }
}
