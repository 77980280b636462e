//! Deliver committed changes to listeners registered on subtrees.
//!
//! # Overview
//!
//! A [Listener] is registered against a [Path]. After every commit, the shard's sequencer hands
//! the commit's changes to the [Notifier], which restricts them to each registration's subtree
//! and enqueues a [Notification] for every registration the commit touched. Enqueueing never
//! blocks: each registration has its own bounded queue and a dedicated dispatcher task that
//! drains it and invokes the listener. A slow listener only ever delays itself.
//!
//! # Overflow
//!
//! If a registration's queue is full, the notification is dropped and counted. The dispatcher
//! reports the number of dropped notifications to [Listener::on_overflow] before it delivers
//! anything else. Drops never fail the commit that produced them.
//!
//! # Ordering
//!
//! For a fixed registration, notifications from one shard are delivered in commit order. There
//! is no ordering guarantee across shards.
//!
//! # Lifetime
//!
//! The notifier only holds a weak reference to each listener. Once the listener is dropped, its
//! dispatcher exits and the registration is pruned on the next publish.

use crate::{
    shard::ShardId,
    tree::{Change, Path},
};
use commonware_runtime::{Metrics, Spawner};
use futures::{
    channel::{mpsc, oneshot},
    future::join_all,
    SinkExt,
};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::debug;

mod dispatcher;
mod metrics;

/// Receives notifications for a registered subtree.
pub trait Listener: Send + Sync + 'static {
    /// Called with the changes of one commit, restricted to the registered subtree.
    fn on_changes(&self, notification: &Notification);

    /// Called when `dropped` notifications were discarded because the queue was full.
    fn on_overflow(&self, dropped: u64) {
        let _ = dropped;
    }
}

/// The changes a single commit made below a registered path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub shard: ShardId,
    pub version: u64,
    pub changes: Vec<Change>,
}

/// Handle returned by [Notifier::register].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    id: u64,
    path: Path,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Item placed on a subscriber queue.
enum Delivery {
    Notification(Notification),
    /// Acknowledged once everything queued ahead of it has been delivered.
    Flush(oneshot::Sender<()>),
}

struct Subscriber {
    path: Path,
    sender: Mutex<mpsc::Sender<Delivery>>,
    /// Notifications dropped since the dispatcher last reported an overflow.
    dropped: Arc<AtomicU64>,
}

/// Registry of listeners and fan-out of committed changes.
pub struct Notifier<E: Spawner + Metrics> {
    context: E,
    queue_size: usize,
    next: AtomicU64,
    subscribers: RwLock<BTreeMap<u64, Subscriber>>,
    metrics: metrics::Metrics,
}

impl<E: Spawner + Metrics> Notifier<E> {
    /// Create a notifier whose registrations each buffer up to `queue_size` notifications.
    pub fn new(context: E, queue_size: usize) -> Self {
        let metrics = metrics::Metrics::init(context.clone());
        Self {
            context,
            queue_size: queue_size.max(1),
            next: AtomicU64::new(0),
            subscribers: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    /// Register `listener` for changes at or below `path`.
    pub fn register<L: Listener>(&self, path: Path, listener: &Arc<L>) -> Registration {
        let id = self.next.fetch_add(1, Ordering::Relaxed);

        // A channel's capacity is its buffer plus one slot per sender
        let (sender, receiver) = mpsc::channel(self.queue_size - 1);
        let dropped = Arc::new(AtomicU64::new(0));
        let dispatcher = dispatcher::Dispatcher::new(
            id,
            Arc::downgrade(listener),
            receiver,
            dropped.clone(),
            self.metrics.delivered.clone(),
        );
        self.context
            .with_label("dispatcher")
            .spawn(|_| dispatcher.run());

        let mut subscribers = self.subscribers.write();
        subscribers.insert(
            id,
            Subscriber {
                path: path.clone(),
                sender: Mutex::new(sender),
                dropped,
            },
        );
        self.metrics.registered.set(subscribers.len() as i64);
        debug!(id, %path, "registered listener");
        Registration { id, path }
    }

    /// Remove a registration. Notifications already queued are still delivered.
    ///
    /// Returns false if the registration was not found.
    pub fn unregister(&self, registration: &Registration) -> bool {
        let mut subscribers = self.subscribers.write();
        let removed = subscribers.remove(&registration.id).is_some();
        self.metrics.registered.set(subscribers.len() as i64);
        if removed {
            debug!(id = registration.id, path = %registration.path, "unregistered listener");
        }
        removed
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue the changes of one commit for every registration they touch.
    ///
    /// Never blocks. A full queue drops the notification and records the overflow.
    pub fn publish(&self, shard: ShardId, version: u64, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        let mut disconnected = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (id, subscriber) in subscribers.iter() {
                let restricted: Vec<Change> = changes
                    .iter()
                    .filter_map(|change| change.restrict(&subscriber.path))
                    .collect();
                if restricted.is_empty() {
                    continue;
                }
                let notification = Notification {
                    shard,
                    version,
                    changes: restricted,
                };
                let result = subscriber
                    .sender
                    .lock()
                    .try_send(Delivery::Notification(notification));
                match result {
                    Ok(()) => {
                        self.metrics.published.inc();
                    }
                    Err(err) if err.is_full() => {
                        subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                        self.metrics.dropped.inc();
                        debug!(id, %shard, version, "listener queue full, dropping notification");
                    }
                    Err(_) => disconnected.push(*id),
                }
            }
        }

        // The dispatcher exits once its listener is dropped
        if !disconnected.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in disconnected {
                subscribers.remove(&id);
                debug!(id, "pruned dropped listener");
            }
            self.metrics.registered.set(subscribers.len() as i64);
        }
    }

    /// Wait until every notification enqueued before this call has been delivered (or dropped).
    pub async fn flush(&self) {
        let senders: Vec<mpsc::Sender<Delivery>> = self
            .subscribers
            .read()
            .values()
            .map(|subscriber| subscriber.sender.lock().clone())
            .collect();
        let mut waiters = Vec::with_capacity(senders.len());
        for mut sender in senders {
            let (responder, receiver) = oneshot::channel();
            if sender.send(Delivery::Flush(responder)).await.is_ok() {
                waiters.push(receiver);
            }
        }

        // A canceled waiter belongs to a dispatcher that already exited
        join_all(waiters).await;
    }
}
