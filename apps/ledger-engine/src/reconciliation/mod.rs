//! Order reconciliation pipeline: queue, workers, supervision.

pub mod pool;
pub mod queue;
pub mod worker;

pub use pool::{PoolConfig, PoolHandle, WorkerPool};
pub use queue::{order_queue, QueueReceiver, QueueSender};
pub use worker::{Worker, WorkerExit};
