//! Point ledger engine.
//!
//! The ledger charges and spends per-user point balances for any number of
//! concurrent callers. Mutations of one user are serialized through that
//! user's lock; different users never wait on each other. Spends that fail
//! for insufficient balance are queued and replayed in the background with
//! capped exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Amount;
use crate::config::LedgerConfig;
use crate::model::{Balance, HistoryRecord, RetryEntry, Transaction, TransactionType, UserId};
use crate::store::{BalanceStore, HistoryStore, MemoryBalanceStore, MemoryHistoryStore};

mod error;
pub use error::LedgerError;

mod locks;
pub use locks::{LockHandle, LockRegistry};

mod retry;
pub use retry::{RetryPolicy, RetryQueue};

mod scheduler;
pub use scheduler::ReplayOutcome;

/// The point ledger.
///
/// Owns the lock registry, the retry queue and the retry scheduler task. The
/// scheduler starts on construction and stops on [`Ledger::shutdown`] or drop,
/// so a ledger must be created inside a tokio runtime.
pub struct Ledger {
    core: Arc<LedgerCore>,
    cancel: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between callers and the scheduler task.
struct LedgerCore {
    config: LedgerConfig,
    locks: LockRegistry,
    balances: Arc<dyn BalanceStore>,
    history: Arc<dyn HistoryStore>,
    retries: RetryQueue,
}

/// What `spend` does when the balance is short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortfall {
    /// Queue the request for background replay, then report.
    Queue,
    /// Only report; used when replaying an already queued request.
    Report,
}

/// Public API
impl Ledger {
    /// Ledger backed by in-memory stores.
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(MemoryBalanceStore::new()),
            Arc::new(MemoryHistoryStore::new()),
        )
    }

    pub fn with_stores(
        config: LedgerConfig,
        balances: Arc<dyn BalanceStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let background = config.background_retries;
        let core = Arc::new(LedgerCore {
            config,
            locks: LockRegistry::new(),
            balances,
            history,
            retries: RetryQueue::new(),
        });
        let cancel = CancellationToken::new();
        let handle = background.then(|| scheduler::spawn(Arc::clone(&core), cancel.clone()));

        Self {
            core,
            cancel,
            scheduler: Mutex::new(handle),
        }
    }

    /// Credit `amount` points to `user`.
    pub async fn charge(&self, user: UserId, amount: Amount) -> Result<Balance, LedgerError> {
        let result = self.core.charge(user, amount).await;
        Self::log_result(TransactionType::Charge, user, amount, &result);
        result
    }

    /// Debit `amount` points from `user`.
    ///
    /// On [`LedgerError::InsufficientBalance`] the request is also queued for
    /// background replay; the caller still gets the error.
    pub async fn spend(&self, user: UserId, amount: Amount) -> Result<Balance, LedgerError> {
        let result = self.core.spend(user, amount, Shortfall::Queue).await;
        Self::log_result(TransactionType::Spend, user, amount, &result);
        result
    }

    /// Current balance of `user`, zero if never written.
    pub fn balance(&self, user: UserId) -> Result<Balance, LedgerError> {
        check_user(user)?;
        Ok(self.core.balances.read(user))
    }

    /// Every successful mutation of `user`, oldest first.
    pub fn history(&self, user: UserId) -> Result<Vec<HistoryRecord>, LedgerError> {
        check_user(user)?;
        Ok(self.core.history.list_by_user(user))
    }

    /// Apply a single transaction.
    pub async fn apply(&self, tx: Transaction) -> Result<Balance, LedgerError> {
        match tx {
            Transaction::Charge { user, amount } => self.charge(user, amount).await,
            Transaction::Spend { user, amount } => self.spend(user, amount).await,
        }
    }

    /// Apply every transaction of the stream in order.
    pub async fn run(&self, mut stream: impl Stream<Item = Transaction> + Unpin) {
        while let Some(tx) = stream.next().await {
            // failures are logged by `apply` and must not stop the stream
            let _ = self.apply(tx).await;
        }
    }

    /// Entries waiting for replay, in queue order.
    pub fn pending_retries(&self) -> Vec<RetryEntry> {
        self.core.retries.snapshot()
    }

    /// Run one scheduler tick now: replay up to `retry_batch` ready entries.
    pub async fn retry_tick(&self) -> Vec<ReplayOutcome> {
        self.core.replay_tick().await
    }

    /// Wait until no retry is queued or being replayed. Returns `false` if
    /// `timeout` passed first.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let poll = self.core.config.tick_interval;
        let drained = async {
            while !self.core.retries.is_idle() {
                tokio::time::sleep(poll).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    /// Stop the scheduler task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(reason = %err, "retry scheduler task failed");
            }
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.core.config
    }
}

/// Private API
impl Ledger {
    fn log_result(
        kind: TransactionType,
        user: UserId,
        amount: Amount,
        result: &Result<Balance, LedgerError>,
    ) {
        match result {
            Ok(balance) => {
                info!(
                    user = %user,
                    amount = %amount,
                    balance = %balance.amount,
                    "{kind} applied"
                );
            }
            Err(e) => {
                info!(
                    user = %user,
                    amount = %amount,
                    reason = %e,
                    "{kind} skipped"
                );
            }
        }
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LedgerCore {
    /// Charge under the user's lock:
    /// - Read the current balance
    /// - Add the amount and persist with a fresh timestamp
    /// - Append a CHARGE record
    async fn charge(&self, user: UserId, amount: Amount) -> Result<Balance, LedgerError> {
        check_request(user, amount)?;

        let lock = self.locks.acquire(user);
        let _guard = lock.lock().await;

        let current = self.balances.read(user);
        let next = current
            .amount
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(user))?;

        self.commit(user, &current, next, amount, TransactionType::Charge)
    }

    /// Spend under the user's lock:
    /// - Read the current balance
    /// - Fail when it is below the amount, queueing the request if asked to
    /// - Otherwise subtract, persist and append a SPEND record
    async fn spend(
        &self,
        user: UserId,
        amount: Amount,
        shortfall: Shortfall,
    ) -> Result<Balance, LedgerError> {
        check_request(user, amount)?;

        let lock = self.locks.acquire(user);
        let _guard = lock.lock().await;

        let current = self.balances.read(user);
        let Some(next) = current.amount.checked_sub(amount) else {
            if shortfall == Shortfall::Queue {
                let entry = self.retries.submit(user, amount, TransactionType::Spend);
                debug!(
                    user = %user,
                    amount = %amount,
                    origin = entry.origin_id,
                    "spend queued for retry"
                );
            }
            return Err(LedgerError::InsufficientBalance {
                user,
                balance: current.amount,
                requested: amount,
            });
        };

        self.commit(user, &current, next, amount, TransactionType::Spend)
    }

    /// Persist `next` and its history record. Must run under the user's lock.
    /// If the record is rejected the balance goes back to `current`.
    fn commit(
        &self,
        user: UserId,
        current: &Balance,
        next: Amount,
        amount: Amount,
        kind: TransactionType,
    ) -> Result<Balance, LedgerError> {
        let balance = self.balances.write(user, next)?;
        if let Err(err) = self.history.append(user, amount, kind, balance.updated_at) {
            if let Err(restore) = self.balances.write(user, current.amount) {
                error!(
                    user = %user,
                    amount = %current.amount,
                    reason = %restore,
                    "could not restore balance after rejected {kind} record"
                );
            }
            return Err(err.into());
        }
        Ok(balance)
    }
}

fn check_user(user: UserId) -> Result<(), LedgerError> {
    if user <= 0 {
        return Err(LedgerError::InvalidUser(user));
    }
    Ok(())
}

fn check_request(user: UserId, amount: Amount) -> Result<(), LedgerError> {
    check_user(user)?;
    if !amount.is_valid_operation() {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}
