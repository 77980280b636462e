use super::{Delivery, Listener};
use futures::{channel::mpsc, StreamExt};
use prometheus_client::metrics::counter::Counter;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tracing::{debug, trace};

/// Drains the queue of a single registration into its listener.
pub(super) struct Dispatcher<L: Listener> {
    id: u64,
    listener: Weak<L>,
    receiver: mpsc::Receiver<Delivery>,
    dropped: Arc<AtomicU64>,
    delivered: Counter,
}

impl<L: Listener> Dispatcher<L> {
    pub(super) fn new(
        id: u64,
        listener: Weak<L>,
        receiver: mpsc::Receiver<Delivery>,
        dropped: Arc<AtomicU64>,
        delivered: Counter,
    ) -> Self {
        Self {
            id,
            listener,
            receiver,
            dropped,
            delivered,
        }
    }

    /// Deliver until the registration is removed or the listener is dropped.
    pub(super) async fn run(mut self) {
        while let Some(delivery) = self.receiver.next().await {
            let Some(listener) = self.listener.upgrade() else {
                debug!(id = self.id, "listener dropped");
                return;
            };

            // Report drops before anything queued after them
            let dropped = self.dropped.swap(0, Ordering::Relaxed);
            if dropped > 0 {
                listener.on_overflow(dropped);
            }
            match delivery {
                Delivery::Notification(notification) => {
                    trace!(
                        id = self.id,
                        shard = %notification.shard,
                        version = notification.version,
                        "delivering"
                    );
                    listener.on_changes(&notification);
                    self.delivered.inc();
                }
                Delivery::Flush(responder) => {
                    let _ = responder.send(());
                }
            }
        }
        debug!(id = self.id, "registration closed");
    }
}
