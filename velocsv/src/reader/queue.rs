//! Consumer-ordered, distance-bounded chunk delivery.

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};

use crate::columns::ColumnBuilder;

/// Thread-safe bounded queue that delivers parsed chunks in sequential
/// order.
///
/// Producers push chunks by index, out of order as parsing completes. The
/// consumer pops chunks in order 0, 1, 2, ... Backpressure is distance
/// based: a producer blocks while `chunk_idx >= next_pop + max_buffered`,
/// so chunks near the consumer's cursor always get through while far-ahead
/// chunks are throttled — a count-based bound could starve the very chunk
/// the consumer is waiting on. `close()` unblocks all waiters.
pub struct ParsedChunkQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    num_chunks: usize,
    max_buffered: usize,
}

struct QueueState {
    ready: BTreeMap<usize, Vec<ColumnBuilder>>,
    next_pop: usize,
    closed: bool,
}

pub const DEFAULT_MAX_BUFFERED: usize = 4;

impl ParsedChunkQueue {
    pub fn new(num_chunks: usize, max_buffered: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: BTreeMap::new(),
                next_pop: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            num_chunks,
            max_buffered: max_buffered.max(1),
        }
    }

    /// Producer: park a parsed chunk under its index. Blocks while the
    /// index is too far ahead of the consumer. Returns false if the queue
    /// was closed.
    pub fn push(&self, chunk_idx: usize, columns: Vec<ColumnBuilder>) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while chunk_idx >= state.next_pop + self.max_buffered && !state.closed {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.closed {
            return false;
        }
        state.ready.insert(chunk_idx, columns);
        self.not_empty.notify_all();
        true
    }

    /// Consumer: take the next sequential chunk. Blocks until it arrives.
    /// Returns `None` once all chunks were consumed or the queue closed
    /// without the next chunk present.
    pub fn pop(&self) -> Option<Vec<ColumnBuilder>> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if state.next_pop >= self.num_chunks {
                return None;
            }
            if state.ready.contains_key(&state.next_pop) {
                break;
            }
            if state.closed {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        let idx = state.next_pop;
        let columns = state.ready.remove(&idx);
        state.next_pop += 1;
        self.not_full.notify_all();
        columns
    }

    /// Signal that no more chunks will arrive; wakes every waiter.
    pub fn close(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .closed
    }
}
