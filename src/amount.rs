use std::fmt;

/// Exclusive upper bound for a single charge or spend.
pub const MAX_AMOUNT: i64 = 100_000_000;

/// A whole number of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_points(value: i64) -> Self {
        Amount(value)
    }

    pub fn points(self) -> i64 {
        self.0
    }

    /// Whether this amount may be charged or spent in one operation: `[1, MAX_AMOUNT)`.
    pub fn is_valid_operation(self) -> bool {
        self.0 > 0 && self.0 < MAX_AMOUNT
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Subtract, returning `None` when the result would go below zero.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        match self.0.checked_sub(rhs.0) {
            Some(value) if value >= 0 => Some(Amount(value)),
            _ => None,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(value)
    }
}
