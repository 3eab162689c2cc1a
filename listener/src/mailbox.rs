//! Bounded drop-oldest queue between the log source and ingestion.
//!
//! The producer never blocks: when the queue is full the oldest entry is
//! evicted and handed back so the caller can record the loss. The log source
//! redelivers, so a dropped notification delays a request rather than
//! losing it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

pub struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> Mailbox<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    /// Enqueue an item, returning the evicted oldest item if the mailbox
    /// was full.
    pub fn deliver(&self, item: T) -> Option<T> {
        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Take everything currently queued, oldest first.
    pub fn retrieve_all(&self) -> Vec<T> {
        self.queue.lock().drain(..).collect()
    }

    /// Resolves after the next delivery, or immediately if a delivery
    /// happened since the last wait.
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
