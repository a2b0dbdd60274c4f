//! Bounded hand-off between request handlers and the report store.
//!
//! Every handler owns a [`ReportSender`]; a single consumer task drains the
//! queue into the [`ReportStore`] so the store only ever has one writer.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::debug;

use crate::error::MockSatelliteError;
use crate::proto::ReportRequest;
use crate::store::ReportStore;

/// Default number of reports that may wait for the consumer before senders block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

pub struct IngestionPipeline;

impl IngestionPipeline {
    /// Starts the consumer task and returns the producer side plus a handle
    /// that resolves once the queue has been closed and drained.
    ///
    /// The queue closes when every [`ReportSender`] clone has been dropped.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn spawn(
        store: Arc<RwLock<ReportStore>>,
        capacity: usize,
    ) -> (ReportSender, DrainHandle) {
        let (tx, mut rx) = mpsc::channel::<ReportRequest>(capacity);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut stored = 0usize;
            while let Some(report) = rx.recv().await {
                store.write().await.append(report);
                stored += 1;
                debug!(stored, "report stored");
            }
            debug!(stored, "ingestion pipeline drained");
            let _ = done_tx.send(stored);
        });

        (ReportSender { tx }, DrainHandle { done: done_rx })
    }
}

/// Producer side of the pipeline.
#[derive(Debug, Clone)]
pub struct ReportSender {
    tx: mpsc::Sender<ReportRequest>,
}

impl ReportSender {
    /// Queues a report, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`MockSatelliteError::PipelineClosed`] if the consumer has stopped.
    pub async fn send(&self, report: ReportRequest) -> Result<(), MockSatelliteError> {
        self.tx
            .send(report)
            .await
            .map_err(|_| MockSatelliteError::PipelineClosed)
    }
}

/// Resolves when the consumer has stored every queued report.
#[derive(Debug)]
pub struct DrainHandle {
    done: oneshot::Receiver<usize>,
}

impl DrainHandle {
    /// Waits for the drain signal and returns how many reports the consumer stored.
    ///
    /// # Errors
    ///
    /// Returns [`MockSatelliteError::DrainLost`] if the consumer task died
    /// before signalling.
    pub async fn wait_drained(self) -> Result<usize, MockSatelliteError> {
        self.done.await.map_err(|_| MockSatelliteError::DrainLost)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::proto::{Auth, Span};
    use std::time::Duration;

    fn report(token: &str, ops: &[&str]) -> ReportRequest {
        ReportRequest {
            auth: Some(Auth {
                access_token: token.to_string(),
            }),
            spans: ops
                .iter()
                .map(|op| Span {
                    operation_name: op.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reports_are_stored_in_send_order() {
        let store = Arc::new(RwLock::new(ReportStore::new()));
        let (sender, drain) = IngestionPipeline::spawn(store.clone(), DEFAULT_QUEUE_CAPACITY);

        for op in ["a", "b", "c", "d", "e", "f", "g"] {
            sender.send(report("t", &[op])).await.unwrap();
        }
        drop(sender);

        assert_eq!(drain.wait_drained().await.unwrap(), 7);
        let names: Vec<_> = store
            .read()
            .await
            .spans()
            .map(|s| s.operation_name.clone())
            .collect();
        assert_eq!(names, ["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[tokio::test]
    async fn test_drain_waits_for_every_clone() {
        let store = Arc::new(RwLock::new(ReportStore::new()));
        let (sender, drain) = IngestionPipeline::spawn(store.clone(), 2);
        let second = sender.clone();

        sender.send(report("one", &[])).await.unwrap();
        drop(sender);
        second.send(report("two", &[])).await.unwrap();

        let pending = tokio::spawn(drain.wait_drained());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        drop(second);
        assert_eq!(pending.await.unwrap().unwrap(), 2);
        assert_eq!(store.read().await.report_count(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_sender() {
        let store = Arc::new(RwLock::new(ReportStore::new()));
        let (sender, drain) = IngestionPipeline::spawn(store.clone(), 1);

        // Holding the write lock stalls the consumer after it takes one report.
        let guard = store.write().await;
        sender.send(report("t", &["held"])).await.unwrap();
        sender.send(report("t", &["queued"])).await.unwrap();

        let blocked = {
            let sender = sender.clone();
            tokio::spawn(async move { sender.send(report("t", &["blocked"])).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        drop(guard);
        blocked.await.unwrap().unwrap();
        drop(sender);

        assert_eq!(drain.wait_drained().await.unwrap(), 3);
        assert_eq!(store.read().await.span_count(), 3);
    }
}
