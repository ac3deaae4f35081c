//! Reconciliation Pipeline Integration Tests
//!
//! End-to-end flows over the in-memory store and a wiremock accrual
//! service: submit an order, let the worker pool reconcile it against
//! the accrual decision, then withdraw points against the balance.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use ledger_engine::{
    order_queue, AccrualClient, AccrualConfig, InMemoryOrderStore, LedgerError, OrderLedger,
    OrderNumber, OrderStatus, OrderStore, PoolConfig, PoolHandle, SubmitOutcome, UserId,
    WorkerPool,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Pipeline {
    store: Arc<InMemoryOrderStore>,
    ledger: Arc<OrderLedger<InMemoryOrderStore>>,
    shutdown: CancellationToken,
    handle: PoolHandle,
}

/// Wire a real worker pool to a wiremock accrual service.
async fn start_pipeline(server: &MockServer) -> Pipeline {
    let store = Arc::new(InMemoryOrderStore::new());
    let (queue_tx, queue_rx) = order_queue(64);
    let ledger = Arc::new(OrderLedger::new(Arc::clone(&store), queue_tx.clone()));
    let accrual = Arc::new(
        AccrualClient::new(&AccrualConfig::new(server.uri()).with_timeout(Duration::from_secs(2)))
            .expect("client builds"),
    );
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(
        PoolConfig::default(),
        Arc::clone(&ledger),
        accrual,
        queue_tx,
        queue_rx,
        shutdown.clone(),
    );
    let handle = pool.start();
    // Let the (empty) backlog scan drain before tests submit orders.
    tokio::time::sleep(Duration::from_millis(10)).await;

    Pipeline {
        store,
        ledger,
        shutdown,
        handle,
    }
}

async fn register_user(store: &InMemoryOrderStore, login: &str) -> UserId {
    store.create_user(login, "hash").await.expect("user created")
}

/// Tell the accrual service to answer `number` with a decision.
async fn mount_decision(server: &MockServer, number: &str, status: &str, accrual: Decimal) {
    Mock::given(method("GET"))
        .and(path(format!("/api/orders/{number}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "order": number,
            "status": status,
            "accrual": accrual,
        })))
        .mount(server)
        .await;
}

async fn wait_for_status(store: &InMemoryOrderStore, number: &str, status: OrderStatus) {
    let number = OrderNumber::parse(number).expect("valid number");
    for _ in 0..500 {
        if store.status_of(&number) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("order {number} never reached {status}");
}

#[tokio::test]
async fn submit_reconcile_withdraw_round_trip() {
    let server = MockServer::start().await;
    mount_decision(&server, "9399142970086005", "PROCESSED", dec!(500)).await;

    let pipeline = start_pipeline(&server).await;
    let alice = register_user(&pipeline.store, "alice").await;

    // Submission leaves the order in a non-terminal status.
    let outcome = pipeline
        .ledger
        .submit_order(alice, "9399142970086005")
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Created);
    let submitted_status = pipeline
        .store
        .status_of(&OrderNumber::parse("9399142970086005").unwrap())
        .unwrap();
    assert!(!submitted_status.is_terminal());

    // The pool applies the accrual decision.
    wait_for_status(&pipeline.store, "9399142970086005", OrderStatus::Processed).await;
    assert_eq!(pipeline.ledger.balance(alice).await.unwrap().current, dec!(500));

    // Withdraw against the balance.
    pipeline
        .ledger
        .withdraw(alice, "2377225624", dec!(100))
        .await
        .unwrap();
    let balance = pipeline.ledger.balance(alice).await.unwrap();
    assert_eq!(balance.current, dec!(400));
    assert_eq!(balance.withdrawn, dec!(100));

    // Over-withdrawal is rejected and changes nothing.
    let err = pipeline
        .ledger
        .withdraw(alice, "2377225624", dec!(1000))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance));
    assert_eq!(pipeline.ledger.balance(alice).await.unwrap().current, dec!(400));

    let withdrawals = pipeline.ledger.withdrawals(alice).await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].sum, dec!(100));

    pipeline.shutdown.cancel();
    pipeline.handle.join().await.unwrap();
}

#[tokio::test]
async fn invalid_decision_is_terminal_and_credits_nothing() {
    let server = MockServer::start().await;
    mount_decision(&server, "9278923470", "INVALID", Decimal::ZERO).await;

    let pipeline = start_pipeline(&server).await;
    let bob = register_user(&pipeline.store, "bob").await;

    pipeline.ledger.submit_order(bob, "9278923470").await.unwrap();
    wait_for_status(&pipeline.store, "9278923470", OrderStatus::Invalid).await;
    assert_eq!(
        pipeline.ledger.balance(bob).await.unwrap().current,
        Decimal::ZERO
    );

    pipeline.shutdown.cancel();
    pipeline.handle.join().await.unwrap();
}

#[tokio::test]
async fn restart_scan_reprocesses_leftover_orders() {
    let server = MockServer::start().await;
    mount_decision(&server, "9278923470", "PROCESSED", dec!(50)).await;
    mount_decision(&server, "12345678903", "PROCESSED", dec!(70)).await;

    // A "previous run": orders persisted but never reconciled.
    let store = Arc::new(InMemoryOrderStore::new());
    let carol = register_user(&store, "carol").await;
    store
        .insert_order(carol, &OrderNumber::parse("9278923470").unwrap())
        .await
        .unwrap();
    store
        .insert_order(carol, &OrderNumber::parse("12345678903").unwrap())
        .await
        .unwrap();

    // The "restarted" process discovers them via the startup scan.
    let (queue_tx, queue_rx) = order_queue(64);
    let ledger = Arc::new(OrderLedger::new(Arc::clone(&store), queue_tx.clone()));
    let accrual = Arc::new(
        AccrualClient::new(&AccrualConfig::new(server.uri())).expect("client builds"),
    );
    let shutdown = CancellationToken::new();
    let handle = WorkerPool::new(
        PoolConfig::default(),
        Arc::clone(&ledger),
        accrual,
        queue_tx,
        queue_rx,
        shutdown.clone(),
    )
    .start();

    wait_for_status(&store, "9278923470", OrderStatus::Processed).await;
    wait_for_status(&store, "12345678903", OrderStatus::Processed).await;
    assert_eq!(ledger.balance(carol).await.unwrap().current, dec!(120));

    shutdown.cancel();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn transient_accrual_failures_do_not_kill_workers() {
    let server = MockServer::start().await;
    // First order: the service errors out; the worker logs and moves on.
    Mock::given(method("GET"))
        .and(path("/api/orders/9278923470"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    mount_decision(&server, "12345678903", "PROCESSED", dec!(10)).await;

    let pipeline = start_pipeline(&server).await;
    let dave = register_user(&pipeline.store, "dave").await;

    pipeline.ledger.submit_order(dave, "9278923470").await.unwrap();
    pipeline.ledger.submit_order(dave, "12345678903").await.unwrap();

    // The second order still gets processed, proving the pool survived
    // the failure on the first.
    wait_for_status(&pipeline.store, "12345678903", OrderStatus::Processed).await;
    let failed = pipeline
        .store
        .status_of(&OrderNumber::parse("9278923470").unwrap())
        .unwrap();
    assert_eq!(failed, OrderStatus::New);

    pipeline.shutdown.cancel();
    pipeline.handle.join().await.unwrap();
}
