//! Bounded hand-off channel carrying order numbers to the worker pool.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::OrderNumber;

/// Producer half of the reconciliation queue.
///
/// Shared by submission dispatch and the startup backlog scan.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<OrderNumber>,
}

/// Consumer half of the reconciliation queue.
///
/// Cloneable so a fixed set of workers can drain one queue; receives
/// are serialized through an async mutex, which also keeps delivery
/// FIFO-ish without promising any cross-order contract.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<OrderNumber>>>,
}

/// Create the reconciliation queue with the given capacity.
#[must_use]
pub fn order_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        },
    )
}

impl QueueSender {
    /// Hand an order number to the pool without blocking the caller.
    ///
    /// Submission latency must not depend on worker availability: when
    /// the queue is full the number is dropped here and recovered by
    /// the next startup scan, which re-derives the backlog from
    /// storage. Returns whether the number was enqueued.
    pub fn dispatch(&self, number: OrderNumber) -> bool {
        match self.tx.try_send(number) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(number)) => {
                warn!(order = %number, "Reconciliation queue full, relying on startup scan");
                false
            }
            Err(mpsc::error::TrySendError::Closed(number)) => {
                warn!(order = %number, "Reconciliation queue closed, dropping dispatch");
                false
            }
        }
    }

    /// Push an order number, waiting for queue capacity.
    ///
    /// Used by the startup backlog scan, which may legitimately wait
    /// on a saturated pool. Returns false when the queue is closed.
    pub async fn push(&self, number: OrderNumber) -> bool {
        self.tx.send(number).await.is_ok()
    }
}

impl QueueReceiver {
    /// Receive the next order number; `None` once every producer has
    /// dropped and the buffer is drained.
    pub async fn recv(&self) -> Option<OrderNumber> {
        self.rx.lock().await.recv().await
    }
}
