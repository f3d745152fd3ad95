use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;
use vigil_core::Alert;

/// How many alerts a subscriber's push queue holds before the oldest
/// undelivered one is dropped to make room for the newest (spec 4.9 — one
/// slow subscriber must never stall dispatch to the others).
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// How many of the most recent alerts a new subscriber is replayed before
/// live delivery begins.
const BACKLOG_REPLAY: usize = 20;

pub type SubscriberId = Uuid;

struct SubscriberQueue {
    buffer: Mutex<VecDeque<Alert>>,
    notify: Notify,
    dropped: AtomicU64,
}

/// A live subscription handle returned by `AlertDispatcher::subscribe`.
/// Holds its own queue; `recv` waits for the next alert, draining any
/// backlog that was replayed in at subscribe time first.
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&self) -> Alert {
        loop {
            if let Some(alert) = self.queue.buffer.lock().pop_front() {
                return alert;
            }
            self.queue.notify.notified().await;
        }
    }
}

/// Bounded ring-buffer store of recent alerts, fanned out to subscribers
/// over per-subscriber bounded queues. The ring buffer backs the query API
/// (`GET /alerts`); the queues back the live WebSocket push.
///
/// Both overflow policies are drop-oldest rather than block-producer: a
/// `CameraWorker`'s tick must never stall because a dispatcher queue is
/// full (spec "Concurrency & resource model").
pub struct AlertDispatcher {
    ring: RwLock<VecDeque<Alert>>,
    ring_capacity: usize,
    subscribers: RwLock<HashMap<SubscriberId, Arc<SubscriberQueue>>>,
}

impl AlertDispatcher {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            ring: RwLock::new(VecDeque::with_capacity(ring_capacity.max(1))),
            ring_capacity: ring_capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Records an alert in the ring buffer and fans it out to every live
    /// subscriber, dropping each subscriber's oldest undelivered alert if
    /// its queue is already at capacity. Each such drop increments that
    /// subscriber's counter (spec 4.9 — surfaced in diagnostics, never
    /// silent).
    pub fn dispatch(&self, alert: Alert) {
        {
            let mut ring = self.ring.write();
            if ring.len() >= self.ring_capacity {
                ring.pop_front();
            }
            ring.push_back(alert.clone());
        }

        let subscribers = self.subscribers.read();
        for queue in subscribers.values() {
            {
                let mut buffer = queue.buffer.lock();
                if buffer.len() >= SUBSCRIBER_QUEUE_CAPACITY {
                    buffer.pop_front();
                    queue.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("vigil_dispatch_subscriber_drops_total").increment(1);
                }
                buffer.push_back(alert.clone());
            }
            queue.notify.notify_one();
        }
    }

    /// Registers a new subscriber whose queue is pre-loaded with up to
    /// `BACKLOG_REPLAY` of the most recent alerts.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let backlog: VecDeque<Alert> = {
            let ring = self.ring.read();
            ring.iter().rev().take(BACKLOG_REPLAY).rev().cloned().collect()
        };
        let queue = Arc::new(SubscriberQueue {
            buffer: Mutex::new(backlog),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });

        self.subscribers.write().insert(id, queue.clone());
        Subscription { id, queue }
    }

    /// Idempotent: unsubscribing an unknown id is not an error.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().remove(&id);
    }

    /// Diagnostics snapshot: how many alerts have been dropped for each
    /// currently-subscribed consumer because it fell behind. Backs the
    /// `system` push channel's dispatcher drop counters (spec 6).
    pub fn drop_counts(&self) -> Vec<(SubscriberId, u64)> {
        self.subscribers
            .read()
            .iter()
            .map(|(id, queue)| (*id, queue.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    /// Dropped-alert count for a single subscriber, or 0 if it is unknown
    /// (already unsubscribed, or never existed).
    pub fn dropped_count(&self, id: SubscriberId) -> u64 {
        self.subscribers
            .read()
            .get(&id)
            .map(|queue| queue.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Marks an alert acknowledged and reports whether the id was known.
    /// Idempotent: acknowledging an unknown or already-acknowledged id is
    /// not an error (spec 4.9), but the caller still learns which happened.
    pub fn acknowledge(&self, id: Uuid) -> bool {
        let mut ring = self.ring.write();
        match ring.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Query API backing `GET /alerts?since=&severity=&limit=`. `limit` is
    /// clamped to 200 regardless of what the caller requests.
    pub fn query(
        &self,
        since: Option<chrono::DateTime<chrono::Utc>>,
        severity: Option<vigil_core::AlertSeverity>,
        limit: usize,
    ) -> Vec<Alert> {
        let limit = limit.min(200);
        let ring = self.ring.read();
        ring.iter()
            .rev()
            .filter(|a| since.map(|s| a.timestamp > s).unwrap_or(true))
            .filter(|a| severity.map(|s| a.severity == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
