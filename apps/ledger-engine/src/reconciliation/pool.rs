//! Reconciliation worker pool with supervision and startup recovery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::queue::{QueueReceiver, QueueSender};
use super::worker::{Worker, WorkerExit};
use crate::accrual::AccrualApi;
use crate::ledger::OrderLedger;
use crate::store::OrderStore;

/// Worker pool sizing and self-healing limits.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub workers: u32,
    /// Replacement workers the supervisor may spawn before giving up.
    pub max_restarts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_restarts: 10,
        }
    }
}

/// Handle onto a started pool.
pub struct PoolHandle {
    supervisor: JoinHandle<()>,
    restarts: Arc<AtomicU32>,
}

impl PoolHandle {
    /// Replacement workers spawned so far. A value at the configured
    /// maximum means self-healing is exhausted and the pool is running
    /// degraded.
    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Wait for the supervisor to finish (it ends on cancellation).
    ///
    /// # Errors
    ///
    /// Returns the join error if the supervisor task panicked.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.supervisor.await
    }
}

/// The reconciliation worker pool.
///
/// On start it spawns the configured number of workers, one backlog
/// scan that re-enqueues every order left unresolved by a prior run,
/// and a supervisor loop that is the single owner of the restart
/// counter: worker-exit signals arrive on a channel and replacements
/// are spawned until the restart budget is spent.
pub struct WorkerPool<S, A> {
    config: PoolConfig,
    ledger: Arc<OrderLedger<S>>,
    accrual: Arc<A>,
    queue_tx: QueueSender,
    queue_rx: QueueReceiver,
    shutdown: CancellationToken,
}

impl<S, A> WorkerPool<S, A>
where
    S: OrderStore + 'static,
    A: AccrualApi + 'static,
{
    /// Create a pool over the shared queue.
    pub fn new(
        config: PoolConfig,
        ledger: Arc<OrderLedger<S>>,
        accrual: Arc<A>,
        queue_tx: QueueSender,
        queue_rx: QueueReceiver,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            ledger,
            accrual,
            queue_tx,
            queue_rx,
            shutdown,
        }
    }

    /// Spawn the backlog scan, the workers, and the supervisor.
    pub fn start(self) -> PoolHandle {
        let Self {
            config,
            ledger,
            accrual,
            queue_tx,
            queue_rx,
            shutdown,
        } = self;

        // The scan owns the pool's producer handle; once the backlog is
        // pushed, queue lifetime is governed by submission senders.
        spawn_backlog_scan(Arc::clone(&ledger), queue_tx, shutdown.clone());

        let supervisor = Supervisor {
            config,
            ledger,
            accrual,
            queue_rx,
            shutdown,
        };

        let (exit_tx, exit_rx) = mpsc::channel::<(u32, WorkerExit)>(16);
        for id in 1..=config.workers {
            supervisor.spawn_worker(id, exit_tx.clone());
        }
        info!(workers = config.workers, "Reconciliation pool started");

        let restarts = Arc::new(AtomicU32::new(0));
        let handle = tokio::spawn(supervisor.run(exit_rx, exit_tx, Arc::clone(&restarts)));

        PoolHandle {
            supervisor: handle,
            restarts,
        }
    }
}

/// Owns worker lifecycles and the restart budget.
struct Supervisor<S, A> {
    config: PoolConfig,
    ledger: Arc<OrderLedger<S>>,
    accrual: Arc<A>,
    queue_rx: QueueReceiver,
    shutdown: CancellationToken,
}

impl<S, A> Supervisor<S, A>
where
    S: OrderStore + 'static,
    A: AccrualApi + 'static,
{
    /// Spawn one worker; its exit reason is reported back on `exit_tx`.
    fn spawn_worker(&self, id: u32, exit_tx: mpsc::Sender<(u32, WorkerExit)>) {
        let worker = Worker::new(
            id,
            self.queue_rx.clone(),
            Arc::clone(&self.ledger),
            Arc::clone(&self.accrual),
            self.shutdown.clone(),
        );
        tokio::spawn(async move {
            let exit = worker.run().await;
            let _ = exit_tx.send((id, exit)).await;
        });
    }

    /// Observe worker exits and spawn replacements until the restart
    /// budget is spent. The counter has exactly one writer: this loop.
    async fn run(
        self,
        mut exit_rx: mpsc::Receiver<(u32, WorkerExit)>,
        exit_tx: mpsc::Sender<(u32, WorkerExit)>,
        restarts: Arc<AtomicU32>,
    ) {
        let mut spent = 0u32;
        loop {
            let exit = tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Reconciliation pool shutting down");
                    return;
                }
                exit = exit_rx.recv() => exit,
            };
            // The supervisor holds exit_tx, so the channel cannot close
            // while this loop runs.
            let Some((id, exit)) = exit else { return };

            match exit {
                WorkerExit::Cancelled => {
                    // Expected during shutdown; nothing to heal.
                }
                WorkerExit::QueueClosed => {
                    if spent < self.config.max_restarts {
                        spent += 1;
                        restarts.store(spent, Ordering::SeqCst);
                        let replacement = self.config.workers + spent;
                        warn!(
                            died = id,
                            replacement,
                            restarts = spent,
                            "Worker died, spawning replacement"
                        );
                        self.spawn_worker(replacement, exit_tx.clone());
                    } else {
                        warn!(
                            died = id,
                            restarts = spent,
                            "Worker restart budget exhausted, pool degraded"
                        );
                    }
                }
            }
        }
    }
}

/// Re-enqueue every order a prior run left in a non-terminal status.
///
/// Durability comes from re-deriving queue contents from persisted
/// state, not from persisting the queue itself.
fn spawn_backlog_scan<S: OrderStore + 'static>(
    ledger: Arc<OrderLedger<S>>,
    queue: QueueSender,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let numbers = match ledger.unresolved_orders().await {
            Ok(numbers) => numbers,
            Err(e) => {
                warn!(error = %e, "Backlog scan failed");
                return;
            }
        };
        let count = numbers.len();
        for number in numbers {
            tokio::select! {
                () = shutdown.cancelled() => return,
                pushed = queue.push(number) => {
                    if !pushed {
                        return;
                    }
                }
            }
        }
        info!(count, "Backlog scan enqueued unresolved orders");
    });
}
