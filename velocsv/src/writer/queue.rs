//! Bounded handoff between the parallel column encoder and the single
//! writer thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use parquet::arrow::arrow_writer::ArrowColumnChunk;

/// One fully encoded row group, ready for sequential writing.
pub struct EncodedRowGroup {
    pub sequence: usize,
    pub num_rows: usize,
    pub chunks: Vec<ArrowColumnChunk>,
}

/// FIFO queue with a size cap. Submission order is preserved; the writer
/// never reorders. `close()` unblocks all waiters.
pub struct EncodedRowGroupQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    max_size: usize,
}

struct QueueState {
    queue: VecDeque<EncodedRowGroup>,
    closed: bool,
}

pub const DEFAULT_QUEUE_DEPTH: usize = 4;

impl EncodedRowGroupQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            max_size: max_size.max(1),
        }
    }

    /// Producer: blocks while the queue is full. Returns false if closed.
    pub fn push(&self, row_group: EncodedRowGroup) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while state.queue.len() >= self.max_size && !state.closed {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.closed {
            return false;
        }
        state.queue.push_back(row_group);
        self.not_empty.notify_one();
        true
    }

    /// Consumer: blocks while empty. Returns `None` once the queue is
    /// closed and drained.
    pub fn pop(&self) -> Option<EncodedRowGroup> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while state.queue.is_empty() && !state.closed {
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        let item = state.queue.pop_front();
        self.not_full.notify_one();
        item
    }

    pub fn close(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn rg(sequence: usize) -> EncodedRowGroup {
        EncodedRowGroup {
            sequence,
            num_rows: 0,
            chunks: Vec::new(),
        }
    }

    #[test]
    fn fifo_order() {
        let q = EncodedRowGroupQueue::new(4);
        q.push(rg(0));
        q.push(rg(1));
        q.push(rg(2));
        q.close();
        assert_eq!(q.pop().unwrap().sequence, 0);
        assert_eq!(q.pop().unwrap().sequence, 1);
        assert_eq!(q.pop().unwrap().sequence, 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn capacity_blocks_producer() {
        let q = Arc::new(EncodedRowGroupQueue::new(1));
        q.push(rg(0));
        let q2 = Arc::clone(&q);
        let producer = thread::spawn(move || q2.push(rg(1)));
        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(q.pop().unwrap().sequence, 0);
        assert!(producer.join().unwrap());
        assert_eq!(q.pop().unwrap().sequence, 1);
    }

    #[test]
    fn close_unblocks_everyone() {
        let q = Arc::new(EncodedRowGroupQueue::new(1));
        let q2 = Arc::clone(&q);
        let consumer = thread::spawn(move || q2.pop().map(|r| r.sequence));
        thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert!(consumer.join().unwrap().is_none());
        assert!(!q.push(rg(9)));
    }
}
