// ABOUTME: Fixed-capacity single-producer/many-consumer ring keyed by a monotonic sequence number
// ABOUTME: Readers that fall more than capacity behind jump forward to the newest packet

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::sleep;

/// How long a caught-up reader sleeps before re-checking the writer's sequence.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bounded single-writer / many-reader buffer.
///
/// `seq` starts at -1 (empty). `push` is the only writer operation and never
/// blocks on readers; slots are simply overwritten on wraparound.
pub struct Ring<T> {
    capacity: usize,
    seq: AtomicI64,
    slots: Vec<RwLock<Option<T>>>,
    terminated: AtomicBool,
}

impl<T: Clone> Ring<T> {
    pub fn new(capacity: usize) -> Ring<T> {
        assert!(capacity > 0, "ring capacity must be at least 1");
        Ring {
            capacity,
            seq: AtomicI64::new(-1),
            slots: (0..capacity).map(|_| RwLock::new(None)).collect(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The most recently written sequence number, or -1 if nothing has been pushed yet.
    pub fn latest_seq(&self) -> i64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Writes `item` as the next sequence. Single-writer only; never blocks.
    pub fn push(&self, item: T) -> i64 {
        let new_seq = self.seq.load(Ordering::Relaxed) + 1;
        let slot = &self.slots[(new_seq as usize) % self.capacity];
        *slot.write().unwrap() = Some(item);
        self.seq.store(new_seq, Ordering::Release);
        new_seq
    }

    /// Marks the ring as finished: blocked readers stop waiting and return `None`.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// A fresh reader cursor positioned to receive the *next* packet pushed.
    pub fn reader(&self) -> Reader {
        Reader {
            next: self.latest_seq() + 1,
        }
    }

    /// Returns the packet at `reader.next`, applying the jump-forward policy
    /// if the reader has fallen `>= capacity` sequences behind. Blocks
    /// (polling every 10ms) until a packet is available or the ring terminates.
    pub async fn get(&self, reader: &mut Reader) -> Option<T> {
        loop {
            let current = self.latest_seq();
            if current < reader.next {
                if self.is_terminated() {
                    return None;
                }
                sleep(POLL_INTERVAL).await;
                continue;
            }

            let read_seq = if current - reader.next >= self.capacity as i64 {
                current
            } else {
                reader.next
            };

            let item = self.slots[(read_seq as usize) % self.capacity]
                .read()
                .unwrap()
                .clone();
            reader.next = read_seq + 1;
            return item;
        }
    }
}

/// Per-reader cursor. Cheap, `Copy`-free on purpose so callers own their position.
#[derive(Debug, Clone, Copy)]
pub struct Reader {
    next: i64,
}

impl Reader {
    pub fn next_seq(&self) -> i64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_observes_pushes_in_order_when_not_lagging() {
        let ring: Ring<i32> = Ring::new(4);
        let mut reader = ring.reader();
        ring.push(1);
        ring.push(2);
        ring.push(3);

        assert_eq!(ring.get(&mut reader).await, Some(1));
        assert_eq!(ring.get(&mut reader).await, Some(2));
        assert_eq!(ring.get(&mut reader).await, Some(3));
    }

    #[tokio::test]
    async fn far_behind_reader_jumps_forward_instead_of_stalling() {
        let ring: Ring<i32> = Ring::new(4);
        let mut reader = ring.reader();
        for i in 0..10 {
            ring.push(i);
        }
        // reader.next is 0, writer is at seq 9: lag is 9 >= capacity(4) -> jump to newest.
        let got = ring.get(&mut reader).await;
        assert_eq!(got, Some(9));
        assert_eq!(reader.next_seq(), 10);
    }

    #[tokio::test]
    async fn reader_blocks_until_push_then_terminate_unblocks() {
        let ring: Ring<i32> = Ring::new(4);
        let mut reader = ring.reader();
        ring.terminate();
        assert_eq!(ring.get(&mut reader).await, None);
    }

    #[tokio::test]
    async fn push_is_never_blocked_by_a_lagging_reader() {
        let ring: Ring<i32> = Ring::new(2);
        let _reader = ring.reader();
        for i in 0..100 {
            ring.push(i);
        }
        assert_eq!(ring.latest_seq(), 99);
    }
}
