//! Wire types for the accrual service API.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::OrderStatus;

/// Order status as reported by the accrual service.
///
/// `REGISTERED` exists only on the wire: the service has seen the
/// order but not started on it. Stored statuses stay within the order
/// lifecycle via [`AccrualStatus::into_order_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    /// Registered with the accrual service, not yet evaluated.
    Registered,
    /// Evaluation in progress.
    Processing,
    /// Order rejected; earns nothing.
    Invalid,
    /// Decision made; `accrual` carries the reward.
    Processed,
}

impl AccrualStatus {
    /// Map the wire status onto the stored order lifecycle.
    #[must_use]
    pub const fn into_order_status(self) -> OrderStatus {
        match self {
            // A registered order is in the accrual service's hands;
            // keep it non-terminal so the startup scan picks it up
            // again.
            Self::Registered | Self::Processing => OrderStatus::Processing,
            Self::Invalid => OrderStatus::Invalid,
            Self::Processed => OrderStatus::Processed,
        }
    }
}

/// Accrual decision payload from `GET /api/orders/{number}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualReply {
    /// Order number the decision refers to.
    pub order: String,
    /// Reported status.
    pub status: AccrualStatus,
    /// Points earned. Omitted by the service until processed.
    #[serde(default)]
    pub accrual: Decimal,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn reply_parses_with_accrual() {
        let reply: AccrualReply = serde_json::from_str(
            r#"{"order":"9278923470","status":"PROCESSED","accrual":500.5}"#,
        )
        .unwrap();
        assert_eq!(reply.order, "9278923470");
        assert_eq!(reply.status, AccrualStatus::Processed);
        assert_eq!(reply.accrual, dec!(500.5));
    }

    #[test]
    fn missing_accrual_defaults_to_zero() {
        let reply: AccrualReply =
            serde_json::from_str(r#"{"order":"9278923470","status":"REGISTERED"}"#).unwrap();
        assert_eq!(reply.status, AccrualStatus::Registered);
        assert_eq!(reply.accrual, Decimal::ZERO);
    }

    #[test]
    fn wire_statuses_map_onto_lifecycle() {
        assert_eq!(
            AccrualStatus::Registered.into_order_status(),
            OrderStatus::Processing
        );
        assert_eq!(
            AccrualStatus::Processing.into_order_status(),
            OrderStatus::Processing
        );
        assert_eq!(
            AccrualStatus::Invalid.into_order_status(),
            OrderStatus::Invalid
        );
        assert_eq!(
            AccrualStatus::Processed.into_order_status(),
            OrderStatus::Processed
        );
    }
}
