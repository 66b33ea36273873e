//! Event bus for decoupling packet capture from analysis
//!
//! A bounded FIFO channel of [`ParkRangerEvent`]s lets the capture thread hand
//! off work to analysis tasks and the external presentation layer without
//! ever blocking on a slow consumer. Publishing never waits: a full channel
//! drops the event and bumps a counter instead of back-pressuring the
//! producer (§4.7, §5).
//!
//! # Examples
//!
//! ```
//! use parkranger_core::event_bus::EventBus;
//! use parkranger_core::events::ParkRangerEvent;
//!
//! let bus = EventBus::new(1024);
//! let mut rx = bus.subscribe();
//!
//! bus.publish(ParkRangerEvent::FingerprintUpdated {
//!     peer_ip: "203.0.113.5".parse().unwrap(),
//!     timestamp: 0.0,
//! });
//!
//! assert!(rx.try_recv().is_ok());
//! ```

use crate::events::ParkRangerEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event bus for real-time distribution of capture/analysis events.
///
/// Cloning an `EventBus` is cheap; all clones share the same subscriber list
/// and drop counter.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ParkRangerEvent>>>>,
    dropped_events: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new bus; `capacity` bounds each subscriber's mailbox.
    pub fn new(capacity: usize) -> Self {
        EventBus {
            capacity,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to all events published from this point forward.
    pub fn subscribe(&self) -> mpsc::Receiver<ParkRangerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish an event to every subscriber. Never blocks: a subscriber whose
    /// mailbox is full has the event dropped for it and the global drop
    /// counter incremented.
    pub fn publish(&self, event: ParkRangerEvent) {
        let subscribers = self.subscribers.lock();
        for tx in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Total events dropped across all subscribers due to a full mailbox.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> ParkRangerEvent {
        ParkRangerEvent::FingerprintUpdated {
            peer_ip: "198.51.100.10".parse().unwrap(),
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(sample_event());
        let received = rx.recv().await.expect("event should be delivered");
        assert_eq!(received.peer_ip().to_string(), "198.51.100.10");
    }

    #[tokio::test]
    async fn full_mailbox_drops_and_counts_without_blocking() {
        let bus = EventBus::new(1);
        let _rx = bus.subscribe();
        bus.publish(sample_event());
        bus.publish(sample_event()); // mailbox already full, should drop
        assert_eq!(bus.dropped_events(), 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(sample_event());
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
