use crate::notify::{Listener, Notification};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts the notifications and changes it receives.
#[derive(Default)]
pub struct Counter {
    notifications: AtomicU64,
    changes: AtomicU64,
    dropped: AtomicU64,
}

impl Counter {
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn changes(&self) -> u64 {
        self.changes.load(Ordering::Relaxed)
    }

    /// Notifications dropped before reaching this listener.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Listener for Counter {
    fn on_changes(&self, notification: &Notification) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        self.changes
            .fetch_add(notification.changes.len() as u64, Ordering::Relaxed);
    }

    fn on_overflow(&self, dropped: u64) {
        self.dropped.fetch_add(dropped, Ordering::Relaxed);
    }
}
