use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::UserId;

/// Exclusive, non-reentrant lock guarding one user's balance.
pub type LockHandle = Arc<Mutex<()>>;

/// Lazily created per-user locks. Handles live as long as the registry.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<UserId, LockHandle>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `user`, installing it on first access.
    ///
    /// Racing first accesses go through the same shard entry, so exactly one
    /// handle is ever installed per user.
    pub fn acquire(&self, user: UserId) -> LockHandle {
        self.locks
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of users that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
