//! Balance and withdrawal read models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::number::OrderNumber;

/// A user's point balance: what is spendable now and what has already
/// been withdrawn over the account's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Currently available points. Never negative; the storage layer
    /// enforces this with a check constraint.
    pub current: Decimal,
    /// Cumulative withdrawn points.
    pub withdrawn: Decimal,
}

/// A completed withdrawal of points against an order number.
///
/// The order number is display-only linkage; it does not have to
/// reference an order known to the accrual pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Order number the withdrawal was booked against.
    pub order_number: OrderNumber,
    /// Amount debited.
    pub sum: Decimal,
    /// When the withdrawal was committed.
    pub processed_at: DateTime<Utc>,
}
