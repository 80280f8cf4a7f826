//! Bounded exchange buffer between one producer and one consumer
//!
//! Records are `VariableSet`s kept in FIFO order. Two overflow policies:
//! drop-oldest (the default for reader-fed buffers) evicts the head to admit
//! a new record; no-drop suspends the producer until the consumer makes
//! room, for writer-fed buffers where loss is unacceptable. Sharing beyond
//! one producer plus one consumer is unsupported and prevented by
//! construction at the config layer, not by extra runtime locking here.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::transport::VariableSet;

/// What `append` does when the buffer is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest record to admit the new one
    DropOldest,
    /// Suspend the producer until space is available
    Block,
}

/// Bounded, ordered, task-safe buffer of variable records
pub struct DataBuffer {
    inner: Mutex<VecDeque<VariableSet>>,
    capacity: usize,
    policy: OverflowPolicy,
    space_available: Notify,
}

impl DataBuffer {
    /// Drop-oldest buffer of the given capacity
    pub fn drop_oldest(capacity: usize) -> Self {
        Self::new(capacity, OverflowPolicy::DropOldest)
    }

    /// Blocking (no-drop) buffer of the given capacity
    pub fn no_drop(capacity: usize) -> Self {
        Self::new(capacity, OverflowPolicy::Block)
    }

    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            space_available: Notify::new(),
        }
    }

    /// Add a record to the tail. Under `DropOldest` this never suspends;
    /// under `Block` it suspends while the buffer is full.
    pub async fn append(&self, record: VariableSet) {
        match self.policy {
            OverflowPolicy::DropOldest => {
                let mut queue = self.inner.lock().await;
                if queue.len() == self.capacity {
                    queue.pop_front();
                    debug!("Buffer full, dropped oldest record");
                }
                queue.push_back(record);
            },
            OverflowPolicy::Block => loop {
                {
                    let mut queue = self.inner.lock().await;
                    if queue.len() < self.capacity {
                        queue.push_back(record);
                        return;
                    }
                }
                // Full no-drop buffer: wait for a consumer pop. Notify
                // stores a permit, so a pop between unlock and await is
                // not lost.
                self.space_available.notified().await;
            },
        }
    }

    /// Remove and return the oldest record
    pub async fn pop_front(&self) -> Option<VariableSet> {
        let mut queue = self.inner.lock().await;
        let record = queue.pop_front();
        if record.is_some() {
            self.space_available.notify_one();
        }
        record
    }

    /// Remove and return up to `n` records in FIFO order
    pub async fn pop_batch(&self, n: usize) -> Vec<VariableSet> {
        let mut queue = self.inner.lock().await;
        let take = n.min(queue.len());
        let records: Vec<VariableSet> = queue.drain(..take).collect();
        if !records.is_empty() {
            self.space_available.notify_one();
        }
        records
    }

    /// Peek at the oldest record without removing it
    pub async fn peek(&self) -> Option<VariableSet> {
        let queue = self.inner.lock().await;
        queue.front().cloned()
    }

    /// Atomically remove up to `n` records and coalesce them into a single
    /// `VariableSet` for one batch write. Later records win on duplicate
    /// variable names.
    pub async fn dump(&self, n: usize) -> VariableSet {
        let mut queue = self.inner.lock().await;
        let take = n.min(queue.len());
        let mut merged = VariableSet::new();
        for record in queue.drain(..take) {
            merged.extend(record);
        }
        if take > 0 {
            self.space_available.notify_one();
        }
        merged
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
