//! Per-target offline queues for deferred writes.
//!
//! Each queue is a bounded buffer drained in descending priority then
//! ascending enqueue time. At the bound, the lowest-priority, oldest entry
//! is evicted before insertion.

use aegis_core::Clock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One deferred operation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QueueEntry {
    /// Target the operation was destined for.
    pub target: String,
    /// Operation tag, for the redelivery handler.
    pub operation_tag: String,
    /// Opaque payload.
    pub payload: Value,
    /// Clock offset at which the entry was queued.
    pub enqueued_at: Duration,
    /// Higher drains first.
    pub priority: i64,
}

/// Acknowledgement returned to the caller whose write was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QueueAck {
    /// 1-based drain position at enqueue time.
    pub position: usize,
    /// Queue depth after the insertion.
    pub depth: usize,
}

#[derive(Debug)]
struct StoredEntry {
    entry: QueueEntry,
    seq: u64,
}

impl StoredEntry {
    /// Drain precedence: priority descending, then enqueue time ascending,
    /// then insertion sequence.
    fn drain_cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .priority
            .cmp(&self.entry.priority)
            .then(self.entry.enqueued_at.cmp(&other.entry.enqueued_at))
            .then(self.seq.cmp(&other.seq))
    }

    /// Eviction precedence: lowest priority first, oldest first.
    fn eviction_cmp(&self, other: &Self) -> Ordering {
        self.entry
            .priority
            .cmp(&other.entry.priority)
            .then(self.entry.enqueued_at.cmp(&other.entry.enqueued_at))
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct TargetQueue {
    bound: usize,
    seq: u64,
    entries: Vec<StoredEntry>,
}

/// All per-target offline queues.
pub struct OfflineQueues {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<String, TargetQueue>>,
}

impl OfflineQueues {
    /// Creates an empty queue set.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Registers (or resizes) the queue for a target. A bound of zero
    /// disables queueing for the target.
    pub fn register(&self, target: &str, bound: usize) {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.entry(target.to_string()).or_default();
        queue.bound = bound;
    }

    /// True when the target accepts queued entries.
    pub fn is_registered(&self, target: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .get(target)
            .is_some_and(|q| q.bound > 0)
    }

    /// Queues a payload. Returns `None` when the target has no queue.
    pub fn enqueue(
        &self,
        target: &str,
        operation_tag: &str,
        payload: Value,
        priority: i64,
    ) -> Option<QueueAck> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.get_mut(target)?;
        if queue.bound == 0 {
            return None;
        }

        if queue.entries.len() >= queue.bound {
            if let Some(victim) = queue
                .entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.eviction_cmp(b))
                .map(|(index, _)| index)
            {
                queue.entries.remove(victim);
            }
        }

        queue.seq += 1;
        let stored = StoredEntry {
            entry: QueueEntry {
                target: target.to_string(),
                operation_tag: operation_tag.to_string(),
                payload,
                enqueued_at: now,
                priority,
            },
            seq: queue.seq,
        };

        let position = 1 + queue
            .entries
            .iter()
            .filter(|existing| existing.drain_cmp(&stored) == Ordering::Less)
            .count();
        queue.entries.push(stored);

        Some(QueueAck {
            position,
            depth: queue.entries.len(),
        })
    }

    /// Removes and returns the next entry in drain order.
    pub fn pop_next(&self, target: &str) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.get_mut(target)?;
        let index = queue
            .entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.drain_cmp(b))
            .map(|(index, _)| index)?;
        Some(queue.entries.remove(index).entry)
    }

    /// Puts an entry back after a failed redelivery, preserving its
    /// original priority and enqueue time. May evict if the queue refilled.
    pub fn restore(&self, entry: QueueEntry) {
        let mut inner = self.inner.lock().unwrap();
        let Some(queue) = inner.get_mut(&entry.target) else {
            return;
        };
        if queue.bound == 0 {
            return;
        }

        if queue.entries.len() >= queue.bound {
            if let Some(victim) = queue
                .entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.eviction_cmp(b))
                .map(|(index, _)| index)
            {
                queue.entries.remove(victim);
            }
        }

        queue.seq += 1;
        let seq = queue.seq;
        queue.entries.push(StoredEntry { entry, seq });
    }

    /// Depth of one queue.
    pub fn len(&self, target: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .get(target)
            .map_or(0, |q| q.entries.len())
    }

    /// True when the target's queue is empty or unregistered.
    pub fn is_empty(&self, target: &str) -> bool {
        self.len(target) == 0
    }
}
