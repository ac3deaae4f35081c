//! In-memory order store for testing.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use super::{InsertedOrder, OrderStore, StoreError, UserAccount};
use crate::domain::{BalanceSummary, Order, OrderId, OrderNumber, OrderStatus, UserId, Withdrawal};

#[derive(Debug, Clone)]
struct UserRecord {
    id: UserId,
    login: String,
    password_hash: String,
    balance: Decimal,
}

#[derive(Debug, Clone)]
struct WithdrawalRecord {
    user_id: UserId,
    withdrawal: Withdrawal,
}

#[derive(Debug, Default)]
struct State {
    users: Vec<UserRecord>,
    // Insertion order doubles as the creation-time order.
    orders: Vec<Order>,
    withdrawals: Vec<WithdrawalRecord>,
}

/// In-memory implementation of [`OrderStore`].
///
/// Enforces the same invariants as the PostgreSQL store (unique order
/// numbers, unique logins, non-negative balances) so service and
/// pipeline tests exercise the real outcome taxonomy. Suitable for
/// testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: RwLock<State>,
}

#[allow(clippy::unwrap_used)]
impl InMemoryOrderStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Current status of one order, if it exists (for test assertions).
    #[must_use]
    pub fn status_of(&self, number: &OrderNumber) -> Option<OrderStatus> {
        self.state
            .read()
            .unwrap()
            .orders
            .iter()
            .find(|o| &o.number == number)
            .map(|o| o.status)
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId, StoreError> {
        let mut state = self.state.write().unwrap();
        if state.users.iter().any(|u| u.login == login) {
            return Err(StoreError::LoginTaken);
        }
        let id = UserId::random();
        state.users.push(UserRecord {
            id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            balance: Decimal::ZERO,
        });
        Ok(id)
    }

    async fn find_user(&self, login: &str) -> Result<UserAccount, StoreError> {
        let state = self.state.read().unwrap();
        state
            .users
            .iter()
            .find(|u| u.login == login)
            .map(|u| UserAccount {
                id: u.id,
                login: u.login.clone(),
                password_hash: u.password_hash.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn insert_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<InsertedOrder, StoreError> {
        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.orders.iter().find(|o| &o.number == number) {
            return Ok(InsertedOrder {
                id: existing.id,
                owner: existing.user_id,
                newly_created: false,
            });
        }
        let id = OrderId::random();
        state.orders.push(Order {
            id,
            user_id,
            number: number.clone(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        });
        Ok(InsertedOrder {
            id,
            owner: user_id,
            newly_created: true,
        })
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn unresolved_order_numbers(&self) -> Result<Vec<OrderNumber>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.number.clone())
            .collect())
    }

    async fn apply_accrual(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        let Some(order) = state.orders.iter_mut().find(|o| &o.number == number) else {
            // The accrual service is trusted; a decision for an unknown
            // number is a no-op, matching the SQL UPDATE touching zero rows.
            return Ok(());
        };
        order.status = status;
        order.accrual = match status {
            OrderStatus::Processed => Some(accrual),
            _ => None,
        };
        let owner = order.user_id;
        if accrual > Decimal::ZERO {
            if let Some(user) = state.users.iter_mut().find(|u| u.id == owner) {
                user.balance += accrual;
            }
        }
        Ok(())
    }

    async fn balance(&self, user_id: UserId) -> Result<BalanceSummary, StoreError> {
        let state = self.state.read().unwrap();
        let user = state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound)?;
        let withdrawn = state
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.withdrawal.sum)
            .sum();
        Ok(BalanceSummary {
            current: user.balance,
            withdrawn,
        })
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        sum: Decimal,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound)?;
        if user.balance - sum < Decimal::ZERO {
            return Err(StoreError::BalanceExhausted);
        }
        user.balance -= sum;
        state.withdrawals.push(WithdrawalRecord {
            user_id,
            withdrawal: Withdrawal {
                order_number: number.clone(),
                sum,
                processed_at: Utc::now(),
            },
        });
        Ok(())
    }

    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.withdrawal.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn duplicate_login_is_rejected() {
        let store = InMemoryOrderStore::new();
        store.create_user("alice", "hash").await.unwrap();
        assert!(matches!(
            store.create_user("alice", "other").await,
            Err(StoreError::LoginTaken)
        ));
    }

    #[tokio::test]
    async fn duplicate_number_returns_existing_row() {
        let store = InMemoryOrderStore::new();
        let user = store.create_user("alice", "hash").await.unwrap();
        let first = store.insert_order(user, &number("9278923470")).await.unwrap();
        let second = store.insert_order(user, &number("9278923470")).await.unwrap();
        assert!(first.newly_created);
        assert!(!second.newly_created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn over_withdrawal_leaves_state_untouched() {
        let store = InMemoryOrderStore::new();
        let user = store.create_user("alice", "hash").await.unwrap();
        let num = number("9278923470");
        store.insert_order(user, &num).await.unwrap();
        store
            .apply_accrual(&num, OrderStatus::Processed, dec!(100))
            .await
            .unwrap();

        assert!(matches!(
            store.withdraw(user, &num, dec!(500)).await,
            Err(StoreError::BalanceExhausted)
        ));
        let balance = store.balance(user).await.unwrap();
        assert_eq!(balance.current, dec!(100));
        assert_eq!(balance.withdrawn, Decimal::ZERO);
        assert!(store.withdrawals_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn debit_to_exactly_zero_is_allowed() {
        let store = InMemoryOrderStore::new();
        let user = store.create_user("alice", "hash").await.unwrap();
        let num = number("9278923470");
        store.insert_order(user, &num).await.unwrap();
        store
            .apply_accrual(&num, OrderStatus::Processed, dec!(100))
            .await
            .unwrap();

        store.withdraw(user, &num, dec!(100)).await.unwrap();
        let balance = store.balance(user).await.unwrap();
        assert_eq!(balance.current, Decimal::ZERO);
        assert_eq!(balance.withdrawn, dec!(100));
    }

    #[tokio::test]
    async fn unresolved_scan_skips_terminal_orders() {
        let store = InMemoryOrderStore::new();
        let user = store.create_user("alice", "hash").await.unwrap();
        let first = number("9278923470");
        let second = number("12345678903");
        store.insert_order(user, &first).await.unwrap();
        store.insert_order(user, &second).await.unwrap();
        store
            .apply_accrual(&first, OrderStatus::Invalid, Decimal::ZERO)
            .await
            .unwrap();

        assert_eq!(store.unresolved_order_numbers().await.unwrap(), vec![second]);
    }
}
