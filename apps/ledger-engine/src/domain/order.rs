//! Order entity and status lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::number::OrderNumber;

/// Identifier of a registered user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// System-generated identifier of an order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reconciliation status of an order.
///
/// `Invalid` and `Processed` are terminal; the worker pool only ever
/// re-polls orders left in `New` or `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, not yet seen by the accrual service.
    New,
    /// Accrual service is still deciding.
    Processing,
    /// Accrual service rejected the order; no points will be earned.
    Invalid,
    /// Accrual decided; the accrual amount has been credited.
    Processed,
}

impl OrderStatus {
    /// Returns true if no further reconciliation attempts are expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Processed => write!(f, "PROCESSED"),
        }
    }
}

/// A status string that is not part of the order lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PROCESSING" => Ok(Self::Processing),
            "INVALID" => Ok(Self::Invalid),
            "PROCESSED" => Ok(Self::Processed),
            other => Err(UnknownOrderStatus(other.to_string())),
        }
    }
}

/// A submitted purchase order awaiting (or past) its accrual decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// System-generated row identifier.
    pub id: OrderId,
    /// Owning user.
    pub user_id: UserId,
    /// User-supplied, checksum-validated order number.
    pub number: OrderNumber,
    /// Current reconciliation status.
    pub status: OrderStatus,
    /// Points earned; present only once the order is `PROCESSED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    /// Submission time, used for display ordering and FIFO re-scan.
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_is_terminal() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
    }

    #[test]
    fn order_status_display() {
        assert_eq!(format!("{}", OrderStatus::New), "NEW");
        assert_eq!(format!("{}", OrderStatus::Processing), "PROCESSING");
        assert_eq!(format!("{}", OrderStatus::Invalid), "INVALID");
        assert_eq!(format!("{}", OrderStatus::Processed), "PROCESSED");
    }

    #[test]
    fn order_status_round_trips_through_str() {
        for status in [
            OrderStatus::New,
            OrderStatus::Processing,
            OrderStatus::Invalid,
            OrderStatus::Processed,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert!("FILLED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn order_status_serde() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");

        let parsed: OrderStatus = serde_json::from_str("\"PROCESSED\"").unwrap();
        assert_eq!(parsed, OrderStatus::Processed);
    }

    #[test]
    fn order_serializes_without_null_accrual() {
        let order = Order {
            id: OrderId::random(),
            user_id: UserId::random(),
            number: OrderNumber::from_trusted("9278923470".to_string()),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        };
        let json = serde_json::to_string(&order).unwrap();
        assert!(!json.contains("accrual"));
    }
}
