//! Per-service operation queue
//!
//! Every mutating store method is funneled through one of these: an explicit
//! FIFO task queue with a single worker loop, so operations against the same
//! entity table execute strictly one at a time in submission order even when
//! invoked concurrently. Store and remote calls all suspend, so without this
//! two callers could interleave statements inside what should be one logical
//! operation.

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub(crate) struct OpQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl OpQueue {
    /// Spawn the worker loop. Must be called from within a tokio runtime.
    pub fn new(label: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job().await;
            }
            tracing::debug!(queue = label, "operation queue closed");
        });

        Self { tx }
    }

    /// Append an operation and wait for its result.
    ///
    /// Submission order is execution order; the worker never runs two jobs
    /// concurrently.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            Box::pin(async move {
                let _ = done_tx.send(op().await);
            })
        });

        self.tx
            .send(job)
            .map_err(|_| Error::Database("operation queue worker is gone".to_string()))?;

        match done_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Database(
                "operation queue dropped a pending operation".to_string(),
            )),
        }
    }
}
