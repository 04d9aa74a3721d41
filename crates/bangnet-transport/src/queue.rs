//! Thread-safe FIFO queues shared between the I/O task and the application.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a holder panicked.
///
/// Queue operations never leave the deque half-updated, so the data behind a
/// poisoned lock is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mutex-protected FIFO.
///
/// Every operation takes the lock for O(1) work and never blocks on I/O,
/// so the application thread can poll it once per frame.
#[derive(Debug)]
pub struct MessageQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
}

impl<T> MessageQueue<T> {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: None,
        }
    }

    /// A queue holding at most `capacity` items. Pushing into a full queue
    /// drops the oldest item.
    ///
    /// A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    /// Appends `item`. Returns the item dropped to make room, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut items = lock(&self.items);
        let evicted = match self.capacity {
            Some(cap) if items.len() >= cap => items.pop_front(),
            _ => None,
        };
        items.push_back(item);
        evicted
    }

    /// Removes and returns the oldest item.
    pub fn pop(&self) -> Option<T> {
        lock(&self.items).pop_front()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// The number of queued items.
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    /// The configured bound, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Drops every queued item.
    pub fn clear(&self) {
        lock(&self.items).clear();
    }

    /// Removes every item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        lock(&self.items).drain(..).collect()
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_and_drain() {
        let queue = MessageQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.drain(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());

        queue.push(9);
        queue.clear();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_bounded_drops_oldest() {
        let queue = MessageQueue::bounded(2);
        assert_eq!(queue.push("a"), None);
        assert_eq!(queue.push("b"), None);
        assert_eq!(queue.push("c"), Some("a"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let queue = MessageQueue::bounded(0);
        assert_eq!(queue.capacity(), Some(1));
        queue.push(1);
        assert_eq!(queue.push(2), Some(1));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let queue = MessageQueue::new();
        for i in 0..1000 {
            assert_eq!(queue.push(i), None);
        }
        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.capacity(), None);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(MessageQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut items = queue.drain();
        assert_eq!(items.len(), 1000);

        // Each producer's own items stay in push order.
        for t in 0..4 {
            let mine: Vec<_> = items.iter().filter(|v| **v / 1000 == t).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
        items.sort_unstable();
        items.dedup();
        assert_eq!(items.len(), 1000);
    }
}
