//! PostgreSQL order store.
//!
//! Uses `PostgreSQL` via `SQLx`. Balance integrity is delegated to the
//! schema: `orders.number` is unique and `users.balance` carries the
//! `users_balance_check` constraint, so concurrent credit and debit
//! are serialized by row locks and over-withdrawal surfaces as a
//! check-constraint violation rather than an application-side race.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use super::{InsertedOrder, OrderStore, StoreError, UserAccount};
use crate::domain::{BalanceSummary, Order, OrderId, OrderNumber, OrderStatus, UserId, Withdrawal};

/// Constraint backing the non-negative balance invariant.
const BALANCE_CHECK_CONSTRAINT: &str = "users_balance_check";

/// PostgreSQL-backed implementation of [`OrderStore`].
pub struct PgOrderStore {
    /// Database connection pool, shared across all workers.
    pool: PgPool,
    /// Deadline applied to every store operation.
    query_timeout: Duration,
}

impl PgOrderStore {
    /// Connect to the database, run pending migrations, and return the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be connected or a
    /// migration fails to apply.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(max_connections, "PostgreSQL connection pool initialized");

        Ok(Self {
            pool,
            query_timeout,
        })
    }

    /// Create a store over an existing pool (for testing).
    #[must_use]
    pub const fn with_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run one store operation under the per-operation deadline.
    async fn within_deadline<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Deadline(self.query_timeout)),
        }
    }
}

/// Translate an SQLx error into the store taxonomy.
///
/// The balance check violation is recognized here by constraint name;
/// this is the only place "insufficient funds" is detected.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) => {
            if db.is_check_violation() && db.constraint() == Some(BALANCE_CHECK_CONSTRAINT) {
                StoreError::BalanceExhausted
            } else {
                StoreError::Query(db.to_string())
            }
        }
        _ => StoreError::Query(err.to_string()),
    }
}

/// Convert an order row into the domain entity.
fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
    let id: Uuid = row
        .try_get("id")
        .map_err(|e| StoreError::CorruptRow(format!("id: {e}")))?;
    let user_id: Uuid = row
        .try_get("user_id")
        .map_err(|e| StoreError::CorruptRow(format!("user_id: {e}")))?;
    let number: String = row
        .try_get("number")
        .map_err(|e| StoreError::CorruptRow(format!("number: {e}")))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StoreError::CorruptRow(format!("status: {e}")))?;
    let accrual: Option<Decimal> = row
        .try_get("accrual")
        .map_err(|e| StoreError::CorruptRow(format!("accrual: {e}")))?;
    let uploaded_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| StoreError::CorruptRow(format!("created_at: {e}")))?;

    Ok(Order {
        id: OrderId(id),
        user_id: UserId(user_id),
        number: OrderNumber::from_trusted(number),
        status: OrderStatus::from_str(&status).map_err(|e| StoreError::CorruptRow(e.to_string()))?,
        accrual,
        uploaded_at,
    })
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId, StoreError> {
        let candidate = Uuid::new_v4();
        self.within_deadline(async {
            let row = sqlx::query(
                r"
                INSERT INTO users (id, login, password_hash) VALUES ($1, $2, $3)
                ON CONFLICT (login) DO UPDATE SET login = EXCLUDED.login
                RETURNING id
                ",
            )
            .bind(candidate)
            .bind(login)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            let stored: Uuid = row
                .try_get("id")
                .map_err(|e| StoreError::CorruptRow(format!("id: {e}")))?;
            if stored != candidate {
                return Err(StoreError::LoginTaken);
            }
            debug!(%login, "User account created");
            Ok(UserId(stored))
        })
        .await
    }

    async fn find_user(&self, login: &str) -> Result<UserAccount, StoreError> {
        self.within_deadline(async {
            let row = sqlx::query("SELECT id, login, password_hash FROM users WHERE login = $1")
                .bind(login)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .ok_or(StoreError::NotFound)?;

            Ok(UserAccount {
                id: UserId(
                    row.try_get("id")
                        .map_err(|e| StoreError::CorruptRow(format!("id: {e}")))?,
                ),
                login: row
                    .try_get("login")
                    .map_err(|e| StoreError::CorruptRow(format!("login: {e}")))?,
                password_hash: row
                    .try_get("password_hash")
                    .map_err(|e| StoreError::CorruptRow(format!("password_hash: {e}")))?,
            })
        })
        .await
    }

    async fn insert_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<InsertedOrder, StoreError> {
        let candidate = Uuid::new_v4();
        self.within_deadline(async {
            // Insert-or-ignore keyed by number: the no-op DO UPDATE makes
            // RETURNING yield the surviving row either way.
            let row = sqlx::query(
                r"
                INSERT INTO orders (id, user_id, number) VALUES ($1, $2, $3)
                ON CONFLICT (number) DO UPDATE SET number = EXCLUDED.number
                RETURNING id, user_id
                ",
            )
            .bind(candidate)
            .bind(user_id.0)
            .bind(number.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            let stored_id: Uuid = row
                .try_get("id")
                .map_err(|e| StoreError::CorruptRow(format!("id: {e}")))?;
            let owner: Uuid = row
                .try_get("user_id")
                .map_err(|e| StoreError::CorruptRow(format!("user_id: {e}")))?;

            Ok(InsertedOrder {
                id: OrderId(stored_id),
                owner: UserId(owner),
                newly_created: stored_id == candidate,
            })
        })
        .await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.within_deadline(async {
            let rows = sqlx::query(
                r"
                SELECT id, user_id, number, status, accrual, created_at
                FROM orders WHERE user_id = $1 ORDER BY created_at DESC
                ",
            )
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            rows.iter().map(row_to_order).collect()
        })
        .await
    }

    async fn unresolved_order_numbers(&self) -> Result<Vec<OrderNumber>, StoreError> {
        self.within_deadline(async {
            let rows = sqlx::query(
                r"
                SELECT number FROM orders
                WHERE status IN ('NEW', 'PROCESSING') ORDER BY created_at
                ",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            rows.iter()
                .map(|row| {
                    let number: String = row
                        .try_get("number")
                        .map_err(|e| StoreError::CorruptRow(format!("number: {e}")))?;
                    Ok(OrderNumber::from_trusted(number))
                })
                .collect()
        })
        .await
    }

    async fn apply_accrual(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), StoreError> {
        // The accrual amount is only displayed for processed orders.
        let stored_accrual = match status {
            OrderStatus::Processed => Some(accrual),
            _ => None,
        };

        self.within_deadline(async {
            // Dropping the transaction on an early return rolls back.
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            sqlx::query("UPDATE orders SET status = $1, accrual = $2 WHERE number = $3")
                .bind(status.to_string())
                .bind(stored_accrual)
                .bind(number.as_str())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            if accrual > Decimal::ZERO {
                sqlx::query(
                    r"
                    UPDATE users SET balance = balance + $1
                    WHERE id = (SELECT user_id FROM orders WHERE number = $2)
                    ",
                )
                .bind(accrual)
                .bind(number.as_str())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            }

            tx.commit().await.map_err(map_sqlx_error)?;
            debug!(order = %number, %status, "Accrual decision applied");
            Ok(())
        })
        .await
    }

    async fn balance(&self, user_id: UserId) -> Result<BalanceSummary, StoreError> {
        self.within_deadline(async {
            let row = sqlx::query(
                r"
                SELECT balance,
                       COALESCE((SELECT SUM(w.sum) FROM withdrawals w WHERE w.user_id = u.id), 0)
                           AS withdrawn
                FROM users u WHERE u.id = $1
                ",
            )
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)?;

            Ok(BalanceSummary {
                current: row
                    .try_get("balance")
                    .map_err(|e| StoreError::CorruptRow(format!("balance: {e}")))?,
                withdrawn: row
                    .try_get("withdrawn")
                    .map_err(|e| StoreError::CorruptRow(format!("withdrawn: {e}")))?,
            })
        })
        .await
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> Result<(), StoreError> {
        self.within_deadline(async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            // An over-debit trips users_balance_check and surfaces as
            // BalanceExhausted via map_sqlx_error.
            let debited = sqlx::query("UPDATE users SET balance = balance - $2 WHERE id = $1")
                .bind(user_id.0)
                .bind(sum)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            if debited.rows_affected() == 0 {
                return Err(StoreError::NotFound);
            }

            sqlx::query("INSERT INTO withdrawals (id, user_id, number, sum) VALUES ($1, $2, $3, $4)")
                .bind(Uuid::new_v4())
                .bind(user_id.0)
                .bind(number.as_str())
                .bind(sum)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_sqlx_error)?;
            debug!(user = %user_id, order = %number, "Withdrawal recorded");
            Ok(())
        })
        .await
    }

    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        self.within_deadline(async {
            let rows = sqlx::query(
                r"
                SELECT number, sum, created_at FROM withdrawals
                WHERE user_id = $1 ORDER BY created_at DESC
                ",
            )
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            rows.iter()
                .map(|row| {
                    Ok(Withdrawal {
                        order_number: OrderNumber::from_trusted(
                            row.try_get("number")
                                .map_err(|e| StoreError::CorruptRow(format!("number: {e}")))?,
                        ),
                        sum: row
                            .try_get("sum")
                            .map_err(|e| StoreError::CorruptRow(format!("sum: {e}")))?,
                        processed_at: row
                            .try_get("created_at")
                            .map_err(|e| StoreError::CorruptRow(format!("created_at: {e}")))?,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
    }

    #[test]
    fn pool_errors_map_to_query() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Query(_)
        ));
    }
}
