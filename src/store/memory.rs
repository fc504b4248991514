use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use super::{BalanceStore, HistoryStore, StoreError};
use crate::Amount;
use crate::amount::MAX_AMOUNT;
use crate::model::{Balance, HistoryRecord, Timestamp, TransactionType, UserId, now_millis};

/// In-process balance table.
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    balances: DashMap<UserId, Balance>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalanceStore for MemoryBalanceStore {
    fn read(&self, user: UserId) -> Balance {
        self.balances
            .get(&user)
            .map(|entry| *entry.value())
            .unwrap_or_else(|| Balance::empty(user))
    }

    fn write(&self, user: UserId, amount: Amount) -> Result<Balance, StoreError> {
        if user <= 0 {
            return Err(StoreError::InvalidUser(user));
        }
        if amount < Amount::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }

        let now = now_millis();
        let mut entry = self
            .balances
            .entry(user)
            .or_insert_with(|| Balance::empty(user));

        // updated_at must move forward even when two writes land in the same millisecond
        let updated_at = now.max(entry.updated_at + 1);
        *entry = Balance {
            user_id: user,
            amount,
            updated_at,
        };
        Ok(*entry)
    }
}

/// In-process history table with a global monotonic id cursor.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    records: DashMap<UserId, Vec<HistoryRecord>>,
    cursor: AtomicI64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            cursor: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(
        &self,
        user: UserId,
        amount: Amount,
        kind: TransactionType,
        updated_at: Timestamp,
    ) -> Result<HistoryRecord, StoreError> {
        if user <= 0 {
            return Err(StoreError::InvalidUser(user));
        }
        if amount < Amount::ZERO || amount.points() >= MAX_AMOUNT {
            return Err(StoreError::InvalidAmount(amount));
        }
        if updated_at <= 0 {
            return Err(StoreError::InvalidTimestamp(updated_at));
        }

        let mut records = self.records.entry(user).or_default();
        let record = HistoryRecord {
            id: self.cursor.fetch_add(1, Ordering::Relaxed),
            user_id: user,
            amount,
            kind,
            updated_at,
        };
        records.push(record.clone());
        Ok(record)
    }

    fn list_by_user(&self, user: UserId) -> Vec<HistoryRecord> {
        self.records
            .get(&user)
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}
