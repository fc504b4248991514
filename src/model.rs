//! Core domain types for the point ledger.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Amount;

/// User identifier. Valid ids are strictly positive.
pub type UserId = i64;

/// Milliseconds since the unix epoch.
pub type Timestamp = i64;

/// Identifier assigned to a retry entry when it is first queued.
pub type RetryId = u64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(1)
}

/// The kind of balance mutation recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Charge,
    Spend,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Charge => f.write_str("CHARGE"),
            TransactionType::Spend => f.write_str("SPEND"),
        }
    }
}

/// A request accepted by [`Ledger::apply`](crate::Ledger::apply).
#[derive(Debug, Clone)]
pub enum Transaction {
    /// Credit points to a user's balance.
    Charge { user: UserId, amount: Amount },
    /// Debit points from a user's balance.
    Spend { user: UserId, amount: Amount },
}

impl Transaction {
    pub fn user(&self) -> UserId {
        match self {
            Transaction::Charge { user, .. } | Transaction::Spend { user, .. } => *user,
        }
    }

    pub fn kind(&self) -> TransactionType {
        match self {
            Transaction::Charge { .. } => TransactionType::Charge,
            Transaction::Spend { .. } => TransactionType::Spend,
        }
    }
}

/// A user's current point balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub user_id: UserId,
    pub amount: Amount,
    pub updated_at: Timestamp,
}

impl Balance {
    /// Zero balance for a user that has never been written.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            amount: Amount::ZERO,
            updated_at: now_millis(),
        }
    }
}

/// Immutable audit entry for one successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub user_id: UserId,
    pub amount: Amount,
    pub kind: TransactionType,
    pub updated_at: Timestamp,
}

/// A failed spend awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub origin_id: RetryId,
    pub user_id: UserId,
    pub amount: Amount,
    pub kind: TransactionType,
    pub submitted_at: Timestamp,
    pub retry_count: u32,
}

impl RetryEntry {
    /// Same request, one more attempt recorded.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_balance_is_zero_with_current_time() {
        let balance = Balance::empty(3);
        assert_eq!(balance.user_id, 3);
        assert_eq!(balance.amount, Amount::ZERO);
        assert!(balance.updated_at > 0);
    }

    #[test]
    fn transaction_accessors() {
        let tx = Transaction::Spend {
            user: 9,
            amount: Amount::from_points(10),
        };
        assert_eq!(tx.user(), 9);
        assert_eq!(tx.kind(), TransactionType::Spend);
    }

    #[test]
    fn transaction_type_display() {
        assert_eq!(TransactionType::Charge.to_string(), "CHARGE");
        assert_eq!(TransactionType::Spend.to_string(), "SPEND");
    }

    #[test]
    fn next_attempt_leaves_original_untouched() {
        let entry = RetryEntry {
            origin_id: 1,
            user_id: 2,
            amount: Amount::from_points(500),
            kind: TransactionType::Spend,
            submitted_at: 1_700_000_000_000,
            retry_count: 0,
        };
        let next = entry.next_attempt();
        assert_eq!(entry.retry_count, 0);
        assert_eq!(next.retry_count, 1);
        assert_eq!(next.origin_id, entry.origin_id);
        assert_eq!(next.amount, entry.amount);
        assert_eq!(next.submitted_at, entry.submitted_at);
    }
}
