//! Live message notification bus
//!
//! Every decoded message is published here, whether or not a handler matches
//! its sender. Monitors subscribe and receive messages over a bounded channel.
//!
//! Publishing never waits: a monitor whose channel is full misses the message
//! (logged), and a monitor whose receiver is gone is removed. Neither affects
//! delivery to other monitors or the receive loop.

use crate::codec::DecodedMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A monitor's end of the bus
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<DecodedMessage>>,
}

impl Subscription {
    /// Id to pass to [`NotificationBus::unsubscribe`]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the subscription has been removed from the bus.
    pub async fn recv(&mut self) -> Option<Arc<DecodedMessage>> {
        self.rx.recv().await
    }

    /// Take the next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Arc<DecodedMessage>> {
        self.rx.try_recv().ok()
    }

    /// Consume the subscription as a stream of messages
    pub fn into_stream(self) -> ReceiverStream<Arc<DecodedMessage>> {
        ReceiverStream::new(self.rx)
    }
}

/// Publish/subscribe fan-out for decoded messages
#[derive(Debug)]
pub struct NotificationBus {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::Sender<Arc<DecodedMessage>>>>,
}

impl NotificationBus {
    /// Create a bus whose subscriptions each queue up to `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new monitor
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!("Monitor {:?} subscribed", id);

        Subscription { id, rx }
    }

    /// Remove a monitor
    ///
    /// Returns `false` if the id was not subscribed. Removing a subscription
    /// ends its stream once queued messages are drained.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!("Monitor {:?} unsubscribed", id);
        }
        removed
    }

    /// Deliver a message to every monitor
    pub fn publish(&self, message: Arc<DecodedMessage>) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&message)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Monitor {:?} is not keeping up, skipping message", id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Monitor {:?} disconnected, removing", id);
                false
            }
        });
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn message(text: &str) -> Arc<DecodedMessage> {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Arc::new(DecodedMessage::new(14, ts, "host", text))
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_message() {
        let bus = NotificationBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(message("one"));

        assert_eq!(a.recv().await.unwrap().text(), "one");
        assert_eq!(b.recv().await.unwrap().text(), "one");
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block_others() {
        let bus = NotificationBus::new(1);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        bus.publish(message("one"));
        assert_eq!(fast.recv().await.unwrap().text(), "one");
        bus.publish(message("two"));

        assert_eq!(fast.recv().await.unwrap().text(), "two");
        assert_eq!(slow.recv().await.unwrap().text(), "one");
        assert!(slow.try_recv().is_none());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_removed_on_publish() {
        let bus = NotificationBus::new(8);
        let gone = bus.subscribe();
        let mut kept = bus.subscribe();
        drop(gone);

        bus.publish(message("one"));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.recv().await.unwrap().text(), "one");
    }

    #[tokio::test]
    async fn unsubscribe_ends_the_stream() {
        let bus = NotificationBus::new(8);
        let mut sub = bus.subscribe();

        assert!(bus.unsubscribe(sub.id()));
        assert!(!bus.unsubscribe(sub.id()));
        bus.publish(message("one"));
        assert!(sub.recv().await.is_none());
    }
}
