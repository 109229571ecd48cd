//! Bounded FIFO queues between stages.
//!
//! A thin wrapper over a bounded crossbeam channel that keeps both ends, so
//! the producer can evict the oldest entry when the consumer falls behind.
//! Each queue has exactly one producer: the ingress (serialized by its lock)
//! or the single worker of the upstream stage.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do once a full output queue stays full past the retry window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room
    #[default]
    DropOldest,
    /// Discard the item being pushed
    DropNewest,
}

/// Result of a policy-governed push.
#[derive(Debug)]
pub enum PushOutcome<T> {
    Enqueued,
    /// Enqueued after evicting the oldest queued item, returned here
    DroppedOldest(T),
    /// Not enqueued; the item is handed back
    Rejected(T),
}

/// Bounded FIFO of capacity K.
pub struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capacity: self.capacity,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// A capacity of zero is raised to one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            name: name.into(),
            capacity,
            tx,
            rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rx.len() >= self.capacity
    }

    /// Non-blocking push; the item comes back when the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
        })
    }

    /// Push, waiting up to `timeout` for room.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        if timeout.is_zero() {
            return self.try_push(item);
        }
        self.tx.send_timeout(item, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(item) | SendTimeoutError::Disconnected(item) => item,
        })
    }

    /// Push, retrying for `retry` before applying the overflow policy.
    pub fn push_with_policy(&self, item: T, retry: Duration, policy: OverflowPolicy) -> PushOutcome<T> {
        let item = match self.push_timeout(item, retry) {
            Ok(()) => return PushOutcome::Enqueued,
            Err(item) => item,
        };

        match policy {
            OverflowPolicy::DropNewest => PushOutcome::Rejected(item),
            OverflowPolicy::DropOldest => {
                let evicted = self.rx.try_recv().ok();
                match self.try_push(item) {
                    Ok(()) => evicted.map_or(PushOutcome::Enqueued, PushOutcome::DroppedOldest),
                    // Only reachable with a second producer refilling the slot
                    Err(item) => PushOutcome::Rejected(item),
                }
            }
        }
    }

    /// Wait up to `timeout` for the next item.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Snapshot of one queue's fill level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub name: String,
    pub len: usize,
    pub capacity: usize,
}

impl<T> From<&BoundedQueue<T>> for QueueDepth {
    fn from(queue: &BoundedQueue<T>) -> Self {
        Self {
            name: queue.name.clone(),
            len: queue.len(),
            capacity: queue.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new("q", 3);
        for i in 0..3 {
            queue.try_push(i).unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.try_push(3), Err(3));
        assert_eq!(queue.drain(), vec![0, 1, 2]);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let queue = BoundedQueue::new("q", 2);
        queue.try_push(0).unwrap();
        queue.try_push(1).unwrap();

        let outcome = queue.push_with_policy(2, Duration::from_millis(1), OverflowPolicy::DropOldest);
        assert!(matches!(outcome, PushOutcome::DroppedOldest(0)));
        assert_eq!(queue.drain(), vec![1, 2]);
    }

    #[test]
    fn test_drop_newest_rejects() {
        let queue = BoundedQueue::new("q", 1);
        queue.try_push(0).unwrap();

        let outcome = queue.push_with_policy(1, Duration::ZERO, OverflowPolicy::DropNewest);
        assert!(matches!(outcome, PushOutcome::Rejected(1)));
        assert_eq!(queue.drain(), vec![0]);
    }

    #[test]
    fn test_pop_timeout() {
        let queue: BoundedQueue<u8> = BoundedQueue::new("q", 0);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.pop(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_push_waits_for_consumer() {
        let queue = BoundedQueue::new("q", 1);
        queue.try_push(0).unwrap();

        let consumer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            consumer.pop(Duration::from_secs(1))
        });

        assert!(queue.push_timeout(1, Duration::from_secs(2)).is_ok());
        assert_eq!(handle.join().unwrap(), Some(0));
        assert_eq!(QueueDepth::from(&queue).len, 1);
    }
}
