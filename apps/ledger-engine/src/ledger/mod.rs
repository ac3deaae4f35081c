//! Order ledger service: business operations on orders, balances and
//! withdrawals.
//!
//! The ledger validates inputs, translates store outcomes into the
//! caller-facing taxonomy, and hands freshly created orders to the
//! reconciliation queue. The caller's identity is always an explicit
//! parameter; nothing here reads it from ambient context.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    BalanceSummary, InvalidOrderNumber, Order, OrderNumber, OrderStatus, UserId, Withdrawal,
};
use crate::reconciliation::QueueSender;
use crate::store::{OrderStore, StoreError};

/// Errors surfaced synchronously to submitting callers.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The order number is not a valid Luhn digit string.
    #[error(transparent)]
    InvalidNumber(#[from] InvalidOrderNumber),

    /// The number was already submitted by a different user.
    #[error("order number belongs to another user")]
    NumberOwnedByAnotherUser,

    /// A withdrawal amount must be positive.
    #[error("withdrawal amount must be positive")]
    NonPositiveAmount,

    /// The debit would take the balance below zero.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Nothing to return for this user.
    #[error("not found")]
    NotFound,

    /// Storage failed in a way the caller cannot act on.
    #[error("storage error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BalanceExhausted => Self::InsufficientBalance,
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

/// Success outcomes of an order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new order row was created and queued for reconciliation.
    Created,
    /// The caller already submitted this number; idempotent no-op.
    AlreadySubmitted,
}

/// Business operations over one [`OrderStore`].
pub struct OrderLedger<S> {
    store: Arc<S>,
    queue: QueueSender,
}

impl<S: OrderStore> OrderLedger<S> {
    /// Create a ledger over a store and a reconciliation queue handle.
    pub fn new(store: Arc<S>, queue: QueueSender) -> Self {
        Self { store, queue }
    }

    /// Submit an order number on behalf of `user`.
    ///
    /// Validates the checksum, persists the order with
    /// insert-or-ignore semantics, and dispatches newly created orders
    /// to the reconciliation queue without blocking on worker
    /// availability.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidNumber`] on a failed checksum,
    /// [`LedgerError::NumberOwnedByAnotherUser`] when the number is
    /// taken, or [`LedgerError::Store`] on storage failure.
    pub async fn submit_order(
        &self,
        user: UserId,
        raw_number: &str,
    ) -> Result<SubmitOutcome, LedgerError> {
        let number = OrderNumber::parse(raw_number)?;
        let inserted = self.store.insert_order(user, &number).await?;

        if inserted.owner != user {
            return Err(LedgerError::NumberOwnedByAnotherUser);
        }
        if !inserted.newly_created {
            debug!(order = %number, user = %user, "Order already submitted by caller");
            return Ok(SubmitOutcome::AlreadySubmitted);
        }

        self.queue.dispatch(number);
        Ok(SubmitOutcome::Created)
    }

    /// Apply an accrual decision to an order and its owner's balance,
    /// atomically.
    ///
    /// Any status may overwrite any other: the accrual service is the
    /// source of truth and reconciliation stays idempotent by
    /// overwrite.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; the worker logs them and the order
    /// keeps its prior status until a later poll.
    pub async fn reconcile(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), LedgerError> {
        self.store.apply_accrual(number, status, accrual).await?;
        Ok(())
    }

    /// Debit `sum` points against `raw_number`.
    ///
    /// The order number is display-only linkage but still has to pass
    /// checksum validation.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidNumber`], [`LedgerError::NonPositiveAmount`],
    /// [`LedgerError::InsufficientBalance`] (detected from the balance
    /// check constraint), or [`LedgerError::Store`].
    pub async fn withdraw(
        &self,
        user: UserId,
        raw_number: &str,
        sum: Decimal,
    ) -> Result<(), LedgerError> {
        let number = OrderNumber::parse(raw_number)?;
        if sum <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount);
        }
        self.store.withdraw(user, &number, sum).await?;
        Ok(())
    }

    /// All orders of `user`, newest first.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when the user has no orders.
    pub async fn orders(&self, user: UserId) -> Result<Vec<Order>, LedgerError> {
        let orders = self.store.orders_for_user(user).await?;
        if orders.is_empty() {
            return Err(LedgerError::NotFound);
        }
        Ok(orders)
    }

    /// Current and withdrawn balance of `user`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown user.
    pub async fn balance(&self, user: UserId) -> Result<BalanceSummary, LedgerError> {
        Ok(self.store.balance(user).await?)
    }

    /// All withdrawals of `user`, newest first.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when the user has never withdrawn.
    pub async fn withdrawals(&self, user: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        let withdrawals = self.store.withdrawals_for_user(user).await?;
        if withdrawals.is_empty() {
            return Err(LedgerError::NotFound);
        }
        Ok(withdrawals)
    }

    /// Numbers of all orders still awaiting a terminal status, oldest
    /// first. Feeds the startup backlog scan.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn unresolved_orders(&self) -> Result<Vec<OrderNumber>, LedgerError> {
        Ok(self.store.unresolved_order_numbers().await?)
    }
}
