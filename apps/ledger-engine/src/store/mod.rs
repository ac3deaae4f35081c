//! Order store port and its error taxonomy.
//!
//! The store owns every transactional invariant: order-number
//! uniqueness, the non-negative balance constraint, and the
//! update-status-then-credit-balance atomicity of reconciliation.
//! Services above it translate these outcomes; they never re-check
//! them.

mod memory;
mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

use crate::domain::{BalanceSummary, Order, OrderId, OrderNumber, OrderStatus, UserId, Withdrawal};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not reach or set up the database.
    #[error("database connection error: {0}")]
    Connection(String),

    /// A query failed for a reason the caller cannot act on.
    #[error("query error: {0}")]
    Query(String),

    /// The per-operation deadline elapsed.
    #[error("query deadline of {0:?} elapsed")]
    Deadline(std::time::Duration),

    /// The requested row does not exist.
    #[error("not found")]
    NotFound,

    /// Another account already holds this login.
    #[error("login already taken")]
    LoginTaken,

    /// A debit would take the balance below zero. Raised by the
    /// `balance >= 0` check constraint, not by an application-side
    /// comparison.
    #[error("balance would go negative")]
    BalanceExhausted,

    /// A stored value could not be mapped back into a domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Result of the insert-or-ignore order submission.
///
/// Carries the row that actually ended up stored so the caller can
/// tell a fresh insert from an existing row, and its owner from the
/// submitting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedOrder {
    /// Identifier of the stored row.
    pub id: OrderId,
    /// Owner of the stored row.
    pub owner: UserId,
    /// True when this call created the row.
    pub newly_created: bool,
}

/// A stored user account, as far as this crate needs to know it.
///
/// Credential verification happens in the excluded auth layer; the
/// hash is an opaque string here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// Account identifier.
    pub id: UserId,
    /// Unique login.
    pub login: String,
    /// Opaque password hash.
    pub password_hash: String,
}

/// Persistent storage for users, orders, balances and withdrawals.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create a user account with a zero balance.
    ///
    /// Fails with [`StoreError::LoginTaken`] when the login is held by
    /// an existing account.
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId, StoreError>;

    /// Look up an account by login. [`StoreError::NotFound`] when absent.
    async fn find_user(&self, login: &str) -> Result<UserAccount, StoreError>;

    /// Insert an order row for `user_id`, keyed by order number.
    ///
    /// Uses insert-or-ignore-on-conflict: when the number already
    /// exists, the existing row is returned untouched.
    async fn insert_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<InsertedOrder, StoreError>;

    /// All orders of one user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Numbers of every order not yet in a terminal status, oldest
    /// first. Feeds the startup backlog scan.
    async fn unresolved_order_numbers(&self) -> Result<Vec<OrderNumber>, StoreError>;

    /// Apply an accrual decision atomically: set the order's status
    /// and accrual, and credit the owner's balance when `accrual` is
    /// positive. Either both changes commit or neither does.
    async fn apply_accrual(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), StoreError>;

    /// Current and cumulative-withdrawn balance of one user.
    async fn balance(&self, user_id: UserId) -> Result<BalanceSummary, StoreError>;

    /// Debit `sum` from the user's balance and record the withdrawal,
    /// atomically. Fails with [`StoreError::BalanceExhausted`] when
    /// the debit would violate the non-negative constraint.
    async fn withdraw(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> Result<(), StoreError>;

    /// All withdrawals of one user, newest first.
    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError>;
}
