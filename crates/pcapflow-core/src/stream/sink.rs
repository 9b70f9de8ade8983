use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::PacketRecord;
use crate::source::DEFAULT_BURST_COUNT;

use super::StreamError;

pub type SubscriberId = u64;

/// Why a subscriber was removed during delivery.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber fell behind by more than one burst")]
    Lagging,
    #[error("subscriber disconnected")]
    Disconnected,
}

/// Fan-out of serialized records to the current subscribers.
///
/// Each subscriber owns a bounded handoff holding at most one burst of
/// records. Publishing never waits: a subscriber whose handoff is still full
/// is dropped instead of stalling the producer.
///
/// # Examples
/// ```
/// use pcapflow_core::{PacketRecord, Protocol, StreamSink};
///
/// let sink = StreamSink::new();
/// let mut subscription = sink.subscribe();
/// let delivered = sink.publish(&PacketRecord::new(1.0, 60, Protocol::Udp, None))?;
/// assert_eq!(delivered, 1);
/// assert!(subscription.try_recv().is_some());
/// # Ok::<(), pcapflow_core::StreamError>(())
/// ```
#[derive(Clone)]
pub struct StreamSink {
    inner: Arc<Shared>,
}

struct Shared {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<str>>>>,
}

/// Receiving end of one subscriber. Dropping it disconnects the subscriber
/// at the next publish.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next serialized record; `None` once the sink dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

impl Default for StreamSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSink {
    /// Sink whose subscribers may hold one default-sized burst.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BURST_COUNT)
    }

    /// Sink whose subscribers may hold `capacity` undelivered records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a subscriber. It sees records published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.subscribers().insert(id, tx);
        debug!(subscriber = id, "subscriber added");
        Subscription { id, rx }
    }

    /// Remove a subscriber; returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Serialize `record` once and hand it to every current subscriber.
    ///
    /// Returns the number of subscribers that received it. Subscribers that
    /// are gone or still full are removed; their failures never surface here.
    ///
    /// # Errors
    /// `StreamError::Serialize` when the record cannot be encoded.
    pub fn publish(&self, record: &PacketRecord) -> Result<usize, StreamError> {
        let payload: Arc<str> = serde_json::to_string(record)?.into();
        Ok(self.broadcast(payload))
    }

    fn broadcast(&self, payload: Arc<str>) -> usize {
        let mut delivered = 0;
        self.subscribers()
            .retain(|id, tx| match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = *id, error = %DeliveryError::Lagging, "subscriber dropped");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    info!(subscriber = *id, error = %DeliveryError::Disconnected, "subscriber dropped");
                    false
                }
            });
        delivered
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Arc<str>>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::StreamSink;
    use crate::{PacketRecord, Protocol};

    fn record(ts: f64) -> PacketRecord {
        let a: IpAddr = "192.168.1.10".parse().unwrap();
        let b: IpAddr = "192.168.1.20".parse().unwrap();
        PacketRecord::new(ts, 64, Protocol::Tcp, Some((a, b)))
    }

    #[test]
    fn both_subscribers_receive_identical_payload() {
        let sink = StreamSink::new();
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        assert_eq!(sink.publish(&record(1.0)).unwrap(), 2);

        let a = first.try_recv().expect("first payload");
        let b = second.try_recv().expect("second payload");
        assert_eq!(a, b);
        let parsed: PacketRecord = serde_json::from_str(&a).unwrap();
        assert_eq!(parsed, record(1.0));
    }

    #[test]
    fn removing_one_subscriber_keeps_the_other() {
        let sink = StreamSink::new();
        let first = sink.subscribe();
        let mut second = sink.subscribe();

        assert!(sink.unsubscribe(first.id()));
        assert!(!sink.unsubscribe(first.id()));

        assert_eq!(sink.publish(&record(2.0)).unwrap(), 1);
        assert!(second.try_recv().is_some());
    }

    #[test]
    fn dropped_subscription_is_pruned_on_publish() {
        let sink = StreamSink::new();
        let first = sink.subscribe();
        let mut second = sink.subscribe();
        drop(first);

        assert_eq!(sink.publish(&record(3.0)).unwrap(), 1);
        assert_eq!(sink.subscriber_count(), 1);
        assert!(second.try_recv().is_some());
    }

    #[test]
    fn lagging_subscriber_is_dropped_without_affecting_others() {
        let sink = StreamSink::with_capacity(2);
        let mut slow = sink.subscribe();
        let mut fast = sink.subscribe();

        for idx in 0..3 {
            sink.publish(&record(idx as f64)).unwrap();
            assert!(fast.try_recv().is_some());
        }

        assert_eq!(sink.subscriber_count(), 1);
        assert!(slow.try_recv().is_some());
        assert!(slow.try_recv().is_some());
        assert!(slow.try_recv().is_none());
    }

    #[test]
    fn late_subscriber_sees_only_new_records() {
        let sink = StreamSink::new();
        sink.publish(&record(1.0)).unwrap();

        let mut late = sink.subscribe();
        assert!(late.try_recv().is_none());

        sink.publish(&record(2.0)).unwrap();
        let payload = late.try_recv().unwrap();
        let parsed: PacketRecord = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed.timestamp(), 2.0);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let sink = StreamSink::new();
        assert_eq!(sink.publish(&record(1.0)).unwrap(), 0);
    }
}
