//! Contract Test: Flush Semantics
//!
//! This test verifies the at-most-once delivery contract of the buffer.
//!
//! Constraints verified:
//! - One flush hands a queue's records to its storer as one ordered batch
//! - A queue is empty immediately after its flush
//! - A refused or failed batch is dropped and never redelivered
//! - A slow storer does not hold up enqueues for its own handler
//! - A slow storer does not hold up periodic flushes for other handlers

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use syslog_core::traits::{ParsedRecord, Storer};
use syslog_core::FlushBuffer;
use tokio::sync::watch;

fn record(text: &str) -> ParsedRecord {
    vec!["host".to_string(), text.to_string()]
}

#[tokio::test]
async fn flush_delivers_one_ordered_batch_and_empties_the_queue() {
    let buffer = FlushBuffer::new();
    let storer = RecordingStorer::new(StoreOutcome::Accept);
    let handle = storer.as_storer();

    buffer.enqueue("fw", &handle, record("first"));
    buffer.enqueue("fw", &handle, record("second"));

    let report = buffer.flush_all().await;

    assert_eq!(storer.call_count(), 1);
    assert_eq!(storer.batches(), vec![vec![record("first"), record("second")]]);
    assert_eq!(buffer.pending("fw"), 0);
    assert_eq!(report.batches_stored, 1);
    assert_eq!(report.records_stored, 2);
}

#[tokio::test]
async fn refused_batch_is_dropped_and_not_redelivered() {
    let buffer = FlushBuffer::new();
    let storer = RecordingStorer::new(StoreOutcome::Refuse);
    let handle = storer.as_storer();

    buffer.enqueue("fw", &handle, record("lost"));

    let report = buffer.flush_all().await;
    assert_eq!(buffer.pending("fw"), 0);
    assert_eq!(report.batches_dropped, 1);
    assert_eq!(report.records_dropped, 1);

    storer.set_outcome(StoreOutcome::Accept);
    let report = buffer.flush_all().await;
    assert!(report.is_empty());
    assert_eq!(storer.call_count(), 1);
}

#[tokio::test]
async fn failing_storer_is_treated_like_a_refusal() {
    let buffer = FlushBuffer::new();
    let storer = RecordingStorer::new(StoreOutcome::Fail);
    let handle = storer.as_storer();

    buffer.enqueue("fw", &handle, record("a"));
    buffer.enqueue("fw", &handle, record("b"));

    let report = buffer.flush_all().await;
    assert_eq!(report.batches_dropped, 1);
    assert_eq!(report.records_dropped, 2);
    assert_eq!(buffer.pending("fw"), 0);

    buffer.enqueue("fw", &handle, record("c"));
    storer.set_outcome(StoreOutcome::Accept);
    buffer.flush_all().await;

    let batches = storer.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1], vec![record("c")]);
}

struct SlowStorer {
    delay: Duration,
    inner: RecordingStorer,
}

#[async_trait::async_trait]
impl Storer for SlowStorer {
    async fn store_messages(&self, batch: &[ParsedRecord]) -> syslog_core::Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.store_messages(batch).await
    }

    fn module_name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test]
async fn enqueue_proceeds_while_a_batch_is_being_stored() {
    let buffer = Arc::new(FlushBuffer::new());
    let inner = RecordingStorer::new(StoreOutcome::Accept);
    let handle: Arc<dyn Storer> = Arc::new(SlowStorer {
        delay: Duration::from_millis(200),
        inner: inner.clone(),
    });

    buffer.enqueue("fw", &handle, record("in-flight"));

    let flushing = {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move { buffer.flush_all().await })
    };

    assert!(eventually(|| buffer.pending("fw") == 0).await);
    buffer.enqueue("fw", &handle, record("next"));
    assert_eq!(buffer.pending("fw"), 1);

    let report = flushing.await.unwrap();
    assert_eq!(report.records_stored, 1);
    assert_eq!(inner.batches(), vec![vec![record("in-flight")]]);

    buffer.flush_all().await;
    assert_eq!(inner.batches()[1], vec![record("next")]);
}

#[tokio::test(start_paused = true)]
async fn periodic_flush_of_one_handler_ignores_a_hung_storer_of_another() {
    let buffer = Arc::new(FlushBuffer::new());
    let hung = RecordingStorer::new(StoreOutcome::Accept);
    let hung_handle: Arc<dyn Storer> = Arc::new(SlowStorer {
        delay: Duration::from_secs(3600),
        inner: hung.clone(),
    });
    let healthy = RecordingStorer::new(StoreOutcome::Accept);
    let healthy_handle = healthy.as_storer();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let timer = buffer.spawn_periodic(Duration::from_secs(30), shutdown_rx);
    buffer.enqueue("db", &hung_handle, record("stuck"));

    for (tick, text) in ["one", "two", "three"].into_iter().enumerate() {
        buffer.enqueue("fw", &healthy_handle, record(text));
        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(healthy.call_count(), tick + 1);
        assert_eq!(buffer.pending("fw"), 0);
    }

    assert_eq!(
        healthy.batches(),
        vec![vec![record("one")], vec![record("two")], vec![record("three")]]
    );
    assert_eq!(hung.call_count(), 0);

    shutdown_tx.send(true).unwrap();
    timer.await.unwrap();
}
