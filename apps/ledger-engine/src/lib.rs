// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Ledger Engine - Rust Core Library
//!
//! Loyalty-points ledger for the Perks rewards system. Users submit
//! purchase order numbers, an external accrual service decides how
//! many points each order earns, and users withdraw points against
//! their balance.
//!
//! # Architecture
//!
//! - **Domain**: order numbers (Luhn-validated), order lifecycle,
//!   balance read models.
//! - **Store**: the `OrderStore` port plus PostgreSQL and in-memory
//!   implementations; every transactional invariant lives here.
//! - **Accrual**: HTTP client for the external accrual service, with
//!   rate-limit awareness.
//! - **Ledger**: business operations — submit, reconcile, withdraw,
//!   listings — over a store.
//! - **Reconciliation**: the bounded hand-off queue and the supervised
//!   worker pool polling the accrual service.
//!
//! HTTP routing, session authentication and password hashing live in
//! a separate service layer and are not part of this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Core domain types with no external dependencies.
pub mod domain;

/// Configuration loading and validation.
pub mod config;

/// Accrual service client.
pub mod accrual;

/// Storage port and implementations.
pub mod store;

/// Order ledger service.
pub mod ledger;

/// Reconciliation queue and worker pool.
pub mod reconciliation;

// Re-exports for the binary and the HTTP service layer.
pub use accrual::{AccrualApi, AccrualClient, AccrualConfig, AccrualError};
pub use config::{load_config, Config, ConfigError};
pub use domain::{BalanceSummary, Order, OrderNumber, OrderStatus, UserId, Withdrawal};
pub use ledger::{LedgerError, OrderLedger, SubmitOutcome};
pub use reconciliation::{order_queue, PoolConfig, PoolHandle, WorkerPool};
pub use store::{InMemoryOrderStore, OrderStore, PgOrderStore, StoreError};
