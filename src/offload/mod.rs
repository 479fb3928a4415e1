//! Offload worker: forwards processed points to a remote receiver in batches.
//!
//! Every configured category gets a bounded queue (capacity = number of
//! producers) and one consumer task. A consumer cuts incoming points into
//! batches of [`BATCH_CAPACITY`], flushes a partial batch every
//! [`FLUSH_INTERVAL`], and flushes once more when stopped. The queue is the
//! only back-pressure: `send` waits while it is full.
//!
//! ```text
//! send(category, points) ──► [bounded queue] ──► consumer
//!                                                  ├─ full batch  ──► flush
//!                                                  ├─ 15 s tick   ──► flush residual
//!                                                  └─ stop        ──► flush residual, exit
//! ```

pub mod batch;
pub mod receiver;

pub use batch::{BatchBuffer, BATCH_CAPACITY};
pub use receiver::{HttpReceiver, Receiver, ReceiverError, ReceiverKind};

use crate::error::{EngineError, Result};
use crate::point::Point;
use crate::types::Category;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Period of the residual flush
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// Delivery attempts per batch
pub const SEND_ATTEMPTS: usize = 4;

/// Pause between delivery attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Queue capacity per category, at least 1
    pub producers: usize,
    pub batch_capacity: usize,
    pub flush_interval: Duration,
    pub attempts: usize,
    pub retry_delay: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            producers: 1,
            batch_capacity: BATCH_CAPACITY,
            flush_interval: FLUSH_INTERVAL,
            attempts: SEND_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }
}

pub struct OffloadWorker {
    senders: HashMap<Category, mpsc::Sender<Vec<Point>>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OffloadWorker {
    /// Spawn one consumer per category on the current tokio runtime.
    pub fn spawn(
        categories: &[Category],
        receiver: Arc<dyn Receiver>,
        opts: WorkerOptions,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut senders = HashMap::new();
        let mut tasks = Vec::new();

        for &category in categories {
            let category = category.resolve();
            if senders.contains_key(&category) {
                continue;
            }
            let (tx, rx) = mpsc::channel(opts.producers.max(1));
            senders.insert(category, tx);
            tasks.push(tokio::spawn(consume(
                category,
                rx,
                receiver.clone(),
                cancel.child_token(),
                opts.clone(),
            )));
        }
        tracing::info!(categories = senders.len(), "offload worker started");

        Self {
            senders,
            cancel,
            tasks,
        }
    }

    /// Queue points for `category`, waiting while the queue is full.
    pub async fn send(&self, category: Category, points: Vec<Point>) -> Result<()> {
        let tx = self
            .senders
            .get(&category.resolve())
            .ok_or(EngineError::UnsupportedCategory(category))?;
        tx.send(points)
            .await
            .map_err(|_| EngineError::Channel(format!("offload queue for {} closed", category)))
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.senders.keys().copied()
    }

    /// Token that stops every consumer when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all consumers after their final flush.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.senders);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("offload consumer panicked: {}", e);
            }
        }
        tracing::info!("offload worker stopped");
    }
}

async fn consume(
    category: Category,
    mut rx: mpsc::Receiver<Vec<Point>>,
    receiver: Arc<dyn Receiver>,
    cancel: CancellationToken,
    opts: WorkerOptions,
) {
    let mut buf = BatchBuffer::new(opts.batch_capacity);
    let mut route_index = 0usize;
    let period = opts.flush_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;

            msg = rx.recv() => match msg {
                Some(points) => {
                    for batch in buf.push(points) {
                        flush(receiver.as_ref(), route_index, category, batch, &opts).await;
                        route_index = route_index.wrapping_add(1);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(batch) = buf.take() {
                    flush(receiver.as_ref(), route_index, category, batch, &opts).await;
                    route_index = route_index.wrapping_add(1);
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    if let Some(batch) = buf.take() {
        flush(receiver.as_ref(), route_index, category, batch, &opts).await;
    }
    tracing::debug!(category = %category, "offload consumer exited");
}

/// Deliver one batch, retrying retryable failures. Returns whether it was
/// delivered; an undelivered batch is dropped.
pub async fn flush(
    receiver: &dyn Receiver,
    route_index: usize,
    category: Category,
    batch: Vec<Point>,
    opts: &WorkerOptions,
) -> bool {
    let attempts = opts.attempts.max(1);
    for attempt in 1..=attempts {
        match receiver.send(route_index, category, &batch).await {
            Ok(()) => return true,
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    category = %category,
                    attempt,
                    error = %e,
                    "offload send failed, retrying"
                );
                tokio::time::sleep(opts.retry_delay).await;
            }
            Err(e) => {
                tracing::error!(
                    category = %category,
                    attempts = attempt,
                    points = batch.len(),
                    error = %e,
                    "offload send failed, dropping batch"
                );
                return false;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use receiver::MockReceiver;

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(format!("p{}", i), Category::Logging))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let mut mock = MockReceiver::new();
        mock.expect_send().times(4).returning(|_, _, _| {
            Err(ReceiverError::Status {
                status: 502,
                body: "bad gateway".into(),
            })
        });

        let start = tokio::time::Instant::now();
        let delivered = flush(&mock, 0, Category::Logging, points(3), &WorkerOptions::default()).await;
        assert!(!delivered);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let mut mock = MockReceiver::new();
        mock.expect_send().times(1).returning(|_, _, _| {
            Err(ReceiverError::Status {
                status: 400,
                body: String::new(),
            })
        });
        assert!(!flush(&mock, 0, Category::Logging, points(1), &WorkerOptions::default()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let mut mock = MockReceiver::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(ReceiverError::Transport("reset".into())));
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        assert!(flush(&mock, 7, Category::Metric, points(2), &WorkerOptions::default()).await);
    }

    #[tokio::test]
    async fn test_send_unknown_category() {
        let mock = MockReceiver::new();
        let worker = OffloadWorker::spawn(&[Category::Logging], Arc::new(mock), WorkerOptions::default());
        let err = worker.send(Category::Tracing, points(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedCategory(Category::Tracing)));
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_batch_boundary_and_final_flush() {
        let mut mock = MockReceiver::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_send()
            .withf(|idx, cat, pts| *idx == 0 && *cat == Category::Logging && pts.len() == 128)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_send()
            .withf(|idx, _, pts| *idx == 1 && pts.len() == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        // the test keeps a handle so unmet expectations fail here, not in the task
        let mock = Arc::new(mock);
        let worker = OffloadWorker::spawn(&[Category::Logging], mock.clone(), WorkerOptions::default());
        worker.send(Category::Logging, points(129)).await.unwrap();
        worker.shutdown().await;
        drop(mock);
    }
}
