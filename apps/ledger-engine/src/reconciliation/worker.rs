//! A single reconciliation worker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::QueueReceiver;
use crate::accrual::AccrualApi;
use crate::domain::OrderNumber;
use crate::ledger::OrderLedger;
use crate::store::OrderStore;

/// Why a worker's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The shared cancellation signal fired; expected shutdown.
    Cancelled,
    /// The queue closed underneath the worker; reported to the
    /// supervisor as a failure.
    QueueClosed,
}

/// One member of the reconciliation pool.
///
/// Loops pulling an order number, polling the accrual service, and
/// applying the decision through the ledger. Accrual-service errors never
/// escape the loop: rate limits turn into a mandated sleep, everything
/// else is logged and the worker moves on.
pub struct Worker<S, A> {
    id: u32,
    queue: QueueReceiver,
    ledger: Arc<OrderLedger<S>>,
    accrual: Arc<A>,
    shutdown: CancellationToken,
}

impl<S, A> Worker<S, A>
where
    S: OrderStore + 'static,
    A: AccrualApi + 'static,
{
    /// Create a worker. `id` only labels log lines.
    pub fn new(
        id: u32,
        queue: QueueReceiver,
        ledger: Arc<OrderLedger<S>>,
        accrual: Arc<A>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            ledger,
            accrual,
            shutdown,
        }
    }

    /// Drive the worker until cancellation or queue closure.
    pub async fn run(self) -> WorkerExit {
        debug!(worker = self.id, "Reconciliation worker started");
        loop {
            let number = tokio::select! {
                () = self.shutdown.cancelled() => {
                    debug!(worker = self.id, "Reconciliation worker stopping");
                    return WorkerExit::Cancelled;
                }
                received = self.queue.recv() => match received {
                    Some(number) => number,
                    None => {
                        info!(worker = self.id, "Reconciliation queue closed");
                        return WorkerExit::QueueClosed;
                    }
                },
            };

            if let Some(backoff) = self.process(number).await {
                // The item is delayed, not re-enqueued; the startup
                // scan re-derives anything still unresolved.
                tokio::select! {
                    () = self.shutdown.cancelled() => {}
                    () = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    /// Handle one order number. Returns a backoff the worker must
    /// sleep out before its next pull, if the accrual service mandated one.
    async fn process(&self, number: OrderNumber) -> Option<Duration> {
        match self.accrual.check_order(&number).await {
            Ok(reply) => {
                let status = reply.status.into_order_status();
                let decided = OrderNumber::from_trusted(reply.order);
                if let Err(e) = self.ledger.reconcile(&decided, status, reply.accrual).await {
                    // Report and retry later: the order keeps its prior
                    // status until it is polled again.
                    warn!(
                        worker = self.id,
                        order = %decided,
                        error = %e,
                        "Failed to apply accrual decision"
                    );
                }
                None
            }
            Err(err) => {
                let backoff = err.suggested_backoff();
                if backoff > Duration::ZERO {
                    warn!(
                        worker = self.id,
                        order = %number,
                        delay_s = backoff.as_secs(),
                        "Accrual service rate limit, backing off"
                    );
                    Some(backoff)
                } else {
                    warn!(
                        worker = self.id,
                        order = %number,
                        error = %err,
                        "Accrual lookup failed"
                    );
                    None
                }
            }
        }
    }
}
