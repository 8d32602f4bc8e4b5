//! Bounded relay buffer between the capture and encode threads.
//!
//! `push` never blocks: when the buffer is full the oldest entry is evicted
//! first. `pop` blocks until an entry is available or the buffer is closed.
//! Both operations serialize on one mutex.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Default relay depth.
pub const DEFAULT_RELAY_CAPACITY: usize = 5;

pub struct RelayBuffer<T> {
    state: Mutex<RelayState<T>>,
    available: Condvar,
    capacity: usize,
}

struct RelayState<T> {
    queue: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

impl<T> RelayBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("relay capacity must be greater than zero"));
        }
        Ok(Self::build(capacity))
    }

    pub fn with_default_capacity() -> Self {
        Self::build(DEFAULT_RELAY_CAPACITY)
    }

    fn build(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RelayState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Insert at the tail, evicting the head first if the buffer is full.
    ///
    /// Wakes one waiting consumer. After `close()` the item is discarded.
    pub fn push(&self, item: T) {
        // Evicted entries are dropped after the lock is released.
        let evicted = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            let evicted = if state.queue.len() >= self.capacity {
                state.dropped += 1;
                state.queue.pop_front()
            } else {
                None
            };
            state.queue.push_back(item);
            evicted
        };
        self.available.notify_one();
        drop(evicted);
    }

    /// Remove the head, waiting while the buffer is empty.
    ///
    /// Returns `None` only once the buffer is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let guard = self.lock();
        let mut state = self
            .available
            .wait_while(guard, |state| state.queue.is_empty() && !state.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.queue.pop_front()
    }

    /// Remove the head without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().queue.pop_front()
    }

    /// Stop accepting entries and wake every waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    // The queue is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, RelayState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for RelayBuffer<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
