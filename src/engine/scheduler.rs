use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{LedgerCore, LedgerError, Shortfall};
use crate::model::{Balance, RetryEntry};

/// Result of replaying one queued spend.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The spend went through; the entry is discarded.
    Succeeded { entry: RetryEntry, balance: Balance },
    /// Still short; `entry` (one more attempt recorded) is back in the queue
    /// and becomes ready after `delay`.
    Requeued { entry: RetryEntry, delay: Duration },
    /// Attempts exhausted or the store rejected the spend; the entry is gone.
    Dropped {
        entry: RetryEntry,
        reason: LedgerError,
    },
}

/// Spawn the periodic replay loop. It exits once `cancel` fires.
pub(super) fn spawn(core: Arc<LedgerCore>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(core.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        debug!(interval = ?core.config.tick_interval, "retry scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    core.replay_tick().await;
                }
            }
        }

        let abandoned = core.retries.len();
        if abandoned > 0 {
            warn!(abandoned, "retry scheduler stopped with queued entries");
        } else {
            debug!("retry scheduler stopped");
        }
    })
}

impl LedgerCore {
    /// Replay up to `retry_batch` ready entries.
    pub(super) async fn replay_tick(&self) -> Vec<ReplayOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..self.config.retry_batch {
            let Some(entry) = self.retries.pop_ready() else {
                break;
            };
            let outcome = self.replay(entry).await;
            // after any requeue, so `settle` never sees a gap
            self.retries.finish();
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Replay a single entry as a fresh spend that never queues itself again.
    async fn replay(&self, entry: RetryEntry) -> ReplayOutcome {
        let policy = &self.config.retry;
        match self
            .spend(entry.user_id, entry.amount, Shortfall::Report)
            .await
        {
            Ok(balance) => {
                info!(
                    user = %entry.user_id,
                    amount = %entry.amount,
                    origin = entry.origin_id,
                    attempt = entry.retry_count,
                    "retried spend applied"
                );
                ReplayOutcome::Succeeded { entry, balance }
            }
            Err(LedgerError::InsufficientBalance { .. }) if policy.should_retry(entry.retry_count) => {
                let delay = policy.delay_for(entry.retry_count);
                let next = entry.next_attempt();
                self.retries.requeue(next.clone(), delay);
                debug!(
                    user = %next.user_id,
                    origin = next.origin_id,
                    attempt = next.retry_count,
                    delay = ?delay,
                    "retried spend still short, requeued"
                );
                ReplayOutcome::Requeued { entry: next, delay }
            }
            Err(reason @ LedgerError::InsufficientBalance { .. }) => {
                warn!(
                    user = %entry.user_id,
                    amount = %entry.amount,
                    origin = entry.origin_id,
                    retry_count = entry.retry_count,
                    replays = entry.retry_count + 1,
                    "retry attempts exhausted, spend dropped"
                );
                ReplayOutcome::Dropped { entry, reason }
            }
            Err(reason) => {
                error!(
                    user = %entry.user_id,
                    amount = %entry.amount,
                    origin = entry.origin_id,
                    reason = %reason,
                    "retried spend failed, dropped"
                );
                ReplayOutcome::Dropped { entry, reason }
            }
        }
    }
}
