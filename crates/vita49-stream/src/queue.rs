use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use tracing::warn;

/// Default item limit.
pub const DEFAULT_MAX_ITEMS: usize = 16_384;

/// Default byte limit: 256 MiB.
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

/// The queue was emptied because a push exceeded both limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull {
    /// Datagrams dropped from the queue, not counting the rejected one.
    pub discarded: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Bytes>,
    bytes: usize,
}

/// Bounded FIFO of raw datagrams between the socket and worker threads.
///
/// A push that would exceed both the item and byte limits drops the whole
/// queue along with the incoming datagram. Exceeding only one limit is
/// allowed.
#[derive(Debug)]
pub struct IngestQueue {
    state: Mutex<QueueState>,
    max_items: usize,
    max_bytes: usize,
}

impl IngestQueue {
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_items,
            max_bytes,
        }
    }

    pub fn push(&self, datagram: Bytes) -> Result<(), QueueFull> {
        let mut state = self.lock();
        let over_items = state.items.len() + 1 > self.max_items;
        let over_bytes = state.bytes + datagram.len() > self.max_bytes;
        if over_items && over_bytes {
            let discarded = state.items.len();
            state.items.clear();
            state.bytes = 0;
            drop(state);
            warn!(discarded, "ingest queue full, dropped queued datagrams");
            return Err(QueueFull { discarded });
        }
        state.bytes += datagram.len();
        state.items.push_back(datagram);
        Ok(())
    }

    pub fn pop(&self) -> Option<Bytes> {
        let mut state = self.lock();
        let item = state.items.pop_front()?;
        state.bytes -= item.len();
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Total queued payload bytes.
    pub fn bytes(&self) -> usize {
        self.lock().bytes
    }

    /// Drop everything queued; returns the number of datagrams dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        state.bytes = 0;
        dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS, DEFAULT_MAX_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn datagram(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[test]
    fn fifo_order() {
        let queue = IngestQueue::new(8, 1024);
        for i in 0..3u8 {
            queue.push(Bytes::from(vec![i])).unwrap();
        }
        assert_eq!(queue.bytes(), 3);
        for i in 0..3u8 {
            assert_eq!(queue.pop().unwrap().as_ref(), &[i]);
        }
        assert!(queue.pop().is_none());
        assert_eq!(queue.bytes(), 0);
    }

    #[test]
    fn drops_everything_when_both_limits_exceeded() {
        let queue = IngestQueue::new(3, 30);
        for _ in 0..3 {
            queue.push(datagram(10)).unwrap();
        }
        assert_eq!(queue.push(datagram(10)), Err(QueueFull { discarded: 3 }));
        assert!(queue.is_empty());
        assert_eq!(queue.bytes(), 0);

        queue.push(datagram(10)).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn one_limit_alone_does_not_drop() {
        // Item limit exceeded, bytes fine.
        let queue = IngestQueue::new(2, 1000);
        for _ in 0..5 {
            queue.push(datagram(1)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        // Byte limit exceeded, items fine.
        let queue = IngestQueue::new(100, 10);
        for _ in 0..5 {
            queue.push(datagram(8)).unwrap();
        }
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn concurrent_push_pop() {
        let queue = Arc::new(IngestQueue::new(10_000, 1 << 20));
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    queue.push(Bytes::from(i.to_be_bytes().to_vec())).unwrap();
                }
            })
        };

        let mut next = 0u32;
        while next < 1000 {
            if let Some(item) = queue.pop() {
                assert_eq!(item.as_ref(), &next.to_be_bytes());
                next += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
