//! Deferred replay of spends that failed for insufficient balance.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::Amount;
use crate::model::{RetryEntry, RetryId, TransactionType, UserId, now_millis};

/// Capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        let initial_delay = initial_delay.max(Duration::from_millis(1));
        Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Delay before the entry with `retry_count` is replayed again:
    /// `min(initial * 2^retry_count, max)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry_count);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether an entry that just failed with `retry_count` gets another attempt.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_attempts
    }
}

#[derive(Debug)]
struct Scheduled {
    ready_at: Instant,
    entry: RetryEntry,
}

#[derive(Debug, Default)]
struct QueueState {
    scheduled: VecDeque<Scheduled>,
    /// Entries popped for replay whose outcome is not settled yet.
    in_flight: usize,
}

/// FIFO of retry entries, each held back until its ready instant.
#[derive(Debug)]
pub struct RetryQueue {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue a fresh entry (retry count 0), ready immediately.
    pub fn submit(&self, user: UserId, amount: Amount, kind: TransactionType) -> RetryEntry {
        let entry = RetryEntry {
            origin_id: self.next_id(),
            user_id: user,
            amount,
            kind,
            submitted_at: now_millis(),
            retry_count: 0,
        };
        self.state.lock().scheduled.push_back(Scheduled {
            ready_at: Instant::now(),
            entry: entry.clone(),
        });
        entry
    }

    /// Put an entry back, ready once `delay` has elapsed.
    pub fn requeue(&self, entry: RetryEntry, delay: Duration) {
        self.state.lock().scheduled.push_back(Scheduled {
            ready_at: Instant::now() + delay,
            entry,
        });
    }

    /// Remove and return the oldest entry whose delay has elapsed.
    ///
    /// The entry counts as in flight until [`RetryQueue::finish`] is called,
    /// which must happen after any requeue of it.
    pub fn pop_ready(&self) -> Option<RetryEntry> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let idx = state.scheduled.iter().position(|s| s.ready_at <= now)?;
        let entry = state.scheduled.remove(idx).map(|s| s.entry)?;
        state.in_flight += 1;
        Some(entry)
    }

    /// Mark one popped entry as settled.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Time until the next entry becomes ready, zero if one already is.
    pub fn next_ready_in(&self) -> Option<Duration> {
        let now = Instant::now();
        self.state
            .lock()
            .scheduled
            .iter()
            .map(|s| s.ready_at.saturating_duration_since(now))
            .min()
    }

    /// Number of queued entries, not counting those being replayed.
    pub fn len(&self) -> usize {
        self.state.lock().scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().scheduled.is_empty()
    }

    /// Nothing queued and nothing being replayed.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.scheduled.is_empty() && state.in_flight == 0
    }

    /// Copy of every queued entry in queue order, ready or not.
    pub fn snapshot(&self) -> Vec<RetryEntry> {
        self.state
            .lock()
            .scheduled
            .iter()
            .map(|s| s.entry.clone())
            .collect()
    }

    fn next_id(&self) -> RetryId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}
