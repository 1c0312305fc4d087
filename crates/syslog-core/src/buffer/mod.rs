//! Per-handler record buffering
//!
//! Parsed records wait here until a flush hands them to the handler's
//! storer as one ordered batch.
//!
//! ## Flush Flow
//!
//! ```text
//!  receive loop                          flush timer
//!       │                                     │
//!       │ enqueue(handler, record)            │ flush_pending()
//!       ▼                                     ▼
//! ┌─────────────┐   lock, push      ┌──────────────────┐
//! │ BufferQueue │◄──────────────────│ lock, take, drop │
//! └─────────────┘                   └──────────────────┘
//!                                             │ batch (unlocked)
//!                                             ▼
//!                                     ┌─────────────┐
//!                                     │   Storer    │ one task per handler
//!                                     └─────────────┘
//! ```
//!
//! Each queue has at most one batch in flight. The timer never waits for a
//! store: a queue whose previous batch is still being stored keeps its
//! records until a later tick, while the other queues flush on schedule.
//!
//! Delivery is at-most-once: a batch the storer does not accept is dropped
//! with a warning, never requeued.

use crate::traits::{ParsedRecord, Storer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Records pending for one handler, plus the storer that receives them
pub struct BufferQueue {
    storer: Arc<dyn Storer>,
    records: Mutex<Vec<ParsedRecord>>,

    /// Held while a batch from this queue is being stored
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl BufferQueue {
    fn new(storer: Arc<dyn Storer>) -> Self {
        Self {
            storer,
            records: Mutex::new(Vec::new()),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn push(&self, record: ParsedRecord) {
        self.lock().push(record);
    }

    /// Swap the contents out for an empty vector
    fn take(&self) -> Vec<ParsedRecord> {
        std::mem::take(&mut *self.lock())
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ParsedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Batches the storer accepted
    pub batches_stored: usize,
    /// Batches dropped after a refusal, error or panic
    pub batches_dropped: usize,
    /// Records in stored batches
    pub records_stored: usize,
    /// Records in dropped batches
    pub records_dropped: usize,
}

impl FlushReport {
    /// True if no queue had anything to flush
    pub fn is_empty(&self) -> bool {
        self.batches_stored == 0 && self.batches_dropped == 0
    }

    fn add(&mut self, stored: bool, count: usize) {
        if stored {
            self.batches_stored += 1;
            self.records_stored += count;
        } else {
            self.batches_dropped += 1;
            self.records_dropped += count;
        }
    }
}

/// Buffer of parsed records, one queue per handler
///
/// ## Locking
///
/// The queue map is behind an `RwLock` that is only written when a handler
/// enqueues for the first time. Each queue has its own `Mutex`, held only for
/// a push or a take. Storage I/O never runs under either lock.
#[derive(Default)]
pub struct FlushBuffer {
    queues: RwLock<HashMap<String, Arc<BufferQueue>>>,
}

impl FlushBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a handler's queue
    ///
    /// The queue is created on first use and bound to `storer`. Later calls
    /// for the same handler reuse the queue and its original storer.
    pub fn enqueue(&self, handler_id: &str, storer: &Arc<dyn Storer>, record: ParsedRecord) {
        let existing = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handler_id)
            .cloned();

        let queue = match existing {
            Some(queue) => queue,
            None => {
                let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(queues.entry(handler_id.to_string()).or_insert_with(|| {
                    debug!("Creating buffer queue for handler {}", handler_id);
                    Arc::new(BufferQueue::new(Arc::clone(storer)))
                }))
            }
        };

        queue.push(record);
    }

    /// Number of records waiting for a handler
    pub fn pending(&self, handler_id: &str) -> usize {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handler_id)
            .map_or(0, |queue| queue.len())
    }

    fn snapshot(&self) -> Vec<(String, Arc<BufferQueue>)> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, queue)| (id.clone(), Arc::clone(queue)))
            .collect()
    }

    /// Start a store for every queue that has records and no batch in flight
    ///
    /// Returns the number of stores started without waiting for any of them.
    /// Must be called from within a tokio runtime.
    pub fn flush_pending(&self) -> usize {
        let mut started = 0;

        for (handler_id, queue) in self.snapshot() {
            let Ok(in_flight) = Arc::clone(&queue.in_flight).try_lock_owned() else {
                if queue.len() > 0 {
                    debug!(
                        "Handler {} is still storing its previous batch, deferring flush",
                        handler_id
                    );
                }
                continue;
            };

            let batch = queue.take();
            if batch.is_empty() {
                continue;
            }

            started += 1;
            tokio::spawn(async move {
                let _in_flight = in_flight;
                store_batch(&handler_id, &queue.storer, batch).await;
            });
        }

        started
    }

    /// Flush every non-empty queue and wait for the stores to finish
    ///
    /// A queue with a batch already in flight is flushed once that store
    /// completes, so batches for one handler never overlap. Queues are
    /// flushed concurrently.
    pub async fn flush_all(&self) -> FlushReport {
        let mut tasks = Vec::new();
        for (handler_id, queue) in self.snapshot() {
            tasks.push(tokio::spawn(async move {
                let _in_flight = queue.in_flight.lock().await;

                let batch = queue.take();
                if batch.is_empty() {
                    return None;
                }

                let count = batch.len();
                let stored = store_batch(&handler_id, &queue.storer, batch).await;
                Some((stored, count))
            }));
        }

        let mut report = FlushReport::default();
        for task in tasks {
            match task.await {
                Ok(Some((stored, count))) => report.add(stored, count),
                Ok(None) => {}
                Err(e) => warn!("Flush task aborted: {}", e),
            }
        }

        report
    }

    /// Spawn the periodic flush task
    ///
    /// The first flush happens one `period` after spawning. Ticks never wait
    /// for a store to finish. The task exits when `shutdown` changes or its
    /// sender is dropped; it does not flush on exit.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let buffer = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let started = buffer.flush_pending();
                        if started > 0 {
                            debug!("Flush tick started {} stores", started);
                        }
                    }

                    _ = shutdown.changed() => {
                        debug!("Flush timer stopped");
                        break;
                    }
                }
            }
        })
    }
}

/// Store one batch on its own task and log the outcome
///
/// Returns true only if the storer accepted the batch. A panicking storer
/// counts as a refusal.
async fn store_batch(handler_id: &str, storer: &Arc<dyn Storer>, batch: Vec<ParsedRecord>) -> bool {
    let count = batch.len();
    let storer = Arc::clone(storer);

    match tokio::spawn(async move { storer.store_messages(&batch).await }).await {
        Ok(Ok(true)) => {
            debug!("Stored {} records for handler {}", count, handler_id);
            return true;
        }
        Ok(Ok(false)) => {
            warn!(
                "Storer for handler {} did not store the batch, dropping {} records",
                handler_id, count
            );
        }
        Ok(Err(e)) => {
            warn!(
                "Storer for handler {} failed: {}, dropping {} records",
                handler_id, e, count
            );
        }
        Err(e) => {
            warn!(
                "Storer task for handler {} aborted: {}, dropping {} records",
                handler_id, e, count
            );
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct CollectingStorer {
        batches: Mutex<Vec<Vec<ParsedRecord>>>,
    }

    #[async_trait]
    impl Storer for CollectingStorer {
        async fn store_messages(&self, batch: &[ParsedRecord]) -> crate::Result<bool> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(true)
        }

        fn module_name(&self) -> &'static str {
            "collecting"
        }
    }

    struct PanickingStorer;

    #[async_trait]
    impl Storer for PanickingStorer {
        async fn store_messages(&self, _batch: &[ParsedRecord]) -> crate::Result<bool> {
            panic!("storer bug");
        }

        fn module_name(&self) -> &'static str {
            "panicking"
        }
    }

    /// Collects batches after sleeping for `delay`
    struct SleepingStorer {
        delay: Duration,
        inner: CollectingStorer,
    }

    impl SleepingStorer {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                inner: CollectingStorer::default(),
            }
        }

        fn stored(&self) -> usize {
            self.inner.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Storer for SleepingStorer {
        async fn store_messages(&self, batch: &[ParsedRecord]) -> crate::Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.store_messages(batch).await
        }

        fn module_name(&self) -> &'static str {
            "sleeping"
        }
    }

    fn record(field: &str) -> ParsedRecord {
        vec![field.to_string()]
    }

    #[tokio::test]
    async fn queues_are_created_lazily() {
        let buffer = FlushBuffer::new();
        assert_eq!(buffer.pending("fw"), 0);
        assert!(buffer.flush_all().await.is_empty());

        let storer: Arc<dyn Storer> = Arc::new(CollectingStorer::default());
        buffer.enqueue("fw", &storer, record("a"));
        assert_eq!(buffer.pending("fw"), 1);
    }

    #[tokio::test]
    async fn handlers_flush_independently() {
        let buffer = FlushBuffer::new();
        let fw = Arc::new(CollectingStorer::default());
        let web = Arc::new(CollectingStorer::default());
        let fw_dyn: Arc<dyn Storer> = fw.clone();
        let web_dyn: Arc<dyn Storer> = web.clone();

        buffer.enqueue("fw", &fw_dyn, record("1"));
        buffer.enqueue("web", &web_dyn, record("2"));
        buffer.enqueue("fw", &fw_dyn, record("3"));

        let report = buffer.flush_all().await;
        assert_eq!(report.batches_stored, 2);
        assert_eq!(report.records_stored, 3);

        assert_eq!(
            fw.batches.lock().unwrap().as_slice(),
            &[vec![record("1"), record("3")]]
        );
        assert_eq!(web.batches.lock().unwrap().as_slice(), &[vec![record("2")]]);
    }

    #[tokio::test]
    async fn panicking_storer_drops_its_batch_only() {
        let buffer = FlushBuffer::new();
        let good = Arc::new(CollectingStorer::default());
        let good_dyn: Arc<dyn Storer> = good.clone();
        let bad: Arc<dyn Storer> = Arc::new(PanickingStorer);

        buffer.enqueue("good", &good_dyn, record("ok"));
        buffer.enqueue("bad", &bad, record("lost"));

        let report = buffer.flush_all().await;
        assert_eq!(report.batches_stored, 1);
        assert_eq!(report.batches_dropped, 1);
        assert_eq!(report.records_dropped, 1);
        assert_eq!(buffer.pending("bad"), 0);
        assert_eq!(good.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_flushes_each_period_and_stops() {
        let buffer = Arc::new(FlushBuffer::new());
        let storer = Arc::new(CollectingStorer::default());
        let storer_dyn: Arc<dyn Storer> = storer.clone();
        let (tx, rx) = watch::channel(false);

        let task = buffer.spawn_periodic(Duration::from_secs(30), rx);
        buffer.enqueue("fw", &storer_dyn, record("a"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(buffer.pending("fw"), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(buffer.pending("fw"), 0);
        assert_eq!(storer.batches.lock().unwrap().len(), 1);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_storer_does_not_delay_other_handlers() {
        let buffer = Arc::new(FlushBuffer::new());
        let slow = Arc::new(SleepingStorer::new(Duration::from_secs(300)));
        let fast = Arc::new(SleepingStorer::new(Duration::from_millis(1)));
        let slow_dyn: Arc<dyn Storer> = slow.clone();
        let fast_dyn: Arc<dyn Storer> = fast.clone();
        let (tx, rx) = watch::channel(false);

        let task = buffer.spawn_periodic(Duration::from_secs(30), rx);
        buffer.enqueue("slow", &slow_dyn, record("s1"));
        buffer.enqueue("fast", &fast_dyn, record("f1"));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fast.stored(), 1);
        assert_eq!(slow.stored(), 0);

        buffer.enqueue("fast", &fast_dyn, record("f2"));
        buffer.enqueue("slow", &slow_dyn, record("s2"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fast.stored(), 2);
        assert_eq!(buffer.pending("fast"), 0);

        // The slow queue holds its record until the batch in flight is stored
        assert_eq!(buffer.pending("slow"), 1);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn flush_all_waits_for_the_batch_in_flight() {
        let buffer = Arc::new(FlushBuffer::new());
        let slow = Arc::new(SleepingStorer::new(Duration::from_secs(10)));
        let slow_dyn: Arc<dyn Storer> = slow.clone();

        buffer.enqueue("slow", &slow_dyn, record("first"));
        assert_eq!(buffer.flush_pending(), 1);
        buffer.enqueue("slow", &slow_dyn, record("second"));
        assert_eq!(buffer.flush_pending(), 0);

        let report = buffer.flush_all().await;
        assert_eq!(report.records_stored, 1);
        assert_eq!(
            slow.inner.batches.lock().unwrap().as_slice(),
            &[vec![record("first")], vec![record("second")]]
        );
    }
}
