//! Bounded signal queue with time-windowed deduplication.
//!
//! The same trade can be observed by several sources; a dedup map keyed by
//! the signal's minute-granular digest suppresses repeats inside a sliding
//! window (default 5 minutes). The window is pruned lazily on each `put` —
//! an insertion-ordered deque is enough at tens of signals per second.
//!
//! `put` suspends when the queue is full and `get` when it is empty; both
//! are plain futures, so callers cancel them by dropping (`tokio::select!`
//! against the shutdown signal).

use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::models::TradeSignal;

struct Inner {
    queue: VecDeque<TradeSignal>,
    seen_order: VecDeque<(String, Instant)>,
    seen: HashSet<String>,
}

pub struct SignalQueue {
    inner: Mutex<Inner>,
    not_empty: Notify,
    not_full: Notify,
    capacity: usize,
    dedup_window: Duration,
}

impl SignalQueue {
    pub fn new(capacity: usize, dedup_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                seen_order: VecDeque::new(),
                seen: HashSet::new(),
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            capacity: capacity.max(1),
            dedup_window,
        }
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Enqueue a signal. Returns false (without enqueueing) when its dedup id
    /// is already inside the window. Suspends while the queue is at capacity.
    pub async fn put(&self, signal: TradeSignal) -> bool {
        let dedup_id = signal.dedup_id();
        loop {
            {
                let mut inner = self.inner.lock().await;
                self.prune(&mut inner);

                if inner.seen.contains(&dedup_id) {
                    return false;
                }

                if inner.queue.len() < self.capacity {
                    inner.seen.insert(dedup_id.clone());
                    inner.seen_order.push_back((dedup_id, Instant::now()));
                    inner.queue.push_back(signal);
                    self.not_empty.notify_one();
                    return true;
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Dequeue the next signal, waiting up to `timeout` (forever when None).
    pub async fn get(&self, timeout: Option<Duration>) -> Option<TradeSignal> {
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(signal) = inner.queue.pop_front() {
                    self.not_full.notify_one();
                    return Some(signal);
                }
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    if tokio::time::timeout_at(deadline, self.not_empty.notified())
                        .await
                        .is_err()
                    {
                        return None;
                    }
                }
                None => self.not_empty.notified().await,
            }
        }
    }

    pub async fn get_nowait(&self) -> Option<TradeSignal> {
        let mut inner = self.inner.lock().await;
        let signal = inner.queue.pop_front();
        if signal.is_some() {
            self.not_full.notify_one();
        }
        signal
    }

    /// Drain the queue and the dedup map atomically.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.queue.clear();
        inner.seen_order.clear();
        inner.seen.clear();
        self.not_full.notify_waiters();
    }

    /// Entries exactly at the window boundary count as expired.
    fn prune(&self, inner: &mut Inner) {
        let now = Instant::now();
        while let Some((id, inserted)) = inner.seen_order.front() {
            if now.duration_since(*inserted) >= self.dedup_window {
                let id = id.clone();
                inner.seen_order.pop_front();
                inner.seen.remove(&id);
            } else {
                break;
            }
        }
    }
}
