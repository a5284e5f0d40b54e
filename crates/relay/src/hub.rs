//! Local fan-out of relay messages to topic-filtered subscriptions.
//!
//! Every transport owns one [`Hub`]. Each subscription gets its own bounded
//! queue of `capacity` messages. Delivery waits for room in every matching
//! queue, so a slow subscriber holds back the publisher (or the relay pump)
//! instead of losing messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::message::Message;

#[derive(Debug)]
struct Route {
    id: u64,
    prefix: String,
    tx: mpsc::Sender<Arc<Message>>,
}

#[derive(Debug)]
struct HubInner {
    routes: Mutex<Vec<Route>>,
    capacity: usize,
    next_id: AtomicU64,
    delivered: AtomicU64,
}

impl HubInner {
    fn routes(&self) -> MutexGuard<'_, Vec<Route>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: u64) {
        self.routes().retain(|r| r.id != id);
    }
}

#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                routes: Mutex::new(Vec::new()),
                capacity: capacity.max(1),
                next_id: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Hand a message to every subscription whose prefix matches its topic.
    ///
    /// Waits while a matching subscription's queue is full. Returns how many
    /// subscriptions received it.
    pub async fn deliver(&self, message: Message) -> usize {
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        let targets: Vec<mpsc::Sender<Arc<Message>>> = self
            .inner
            .routes()
            .iter()
            .filter(|r| message.topic.starts_with(&r.prefix))
            .map(|r| r.tx.clone())
            .collect();

        if targets.is_empty() {
            debug!(topic = %message.topic, "no subscribers for message");
            return 0;
        }

        let message = Arc::new(message);
        let mut reached = 0;
        for tx in targets {
            if tx.capacity() == 0 {
                trace!(topic = %message.topic, "subscription full, waiting");
            }
            // A send error means the subscription was dropped mid-delivery.
            if tx.send(message.clone()).await.is_ok() {
                reached += 1;
            }
        }
        reached
    }

    pub fn subscribe(&self, topic_prefix: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.routes().push(Route {
            id,
            prefix: topic_prefix.to_string(),
            tx,
        });
        Subscription {
            id,
            prefix: topic_prefix.to_string(),
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.routes().len()
    }

    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }
}

/// A live, prefix-filtered view of a [`Hub`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    prefix: String,
    rx: mpsc::Receiver<Arc<Message>>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Next message whose topic matches the prefix, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await.map(|msg| Message::clone(&msg))
    }

    pub fn topic_prefix(&self) -> &str {
        &self.prefix
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}
