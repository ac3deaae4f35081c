//! Accrual service client: the external authority deciding order rewards.

mod api_types;
mod client;
mod config;
mod error;

pub use api_types::{AccrualReply, AccrualStatus};
pub use client::{AccrualApi, AccrualClient};
pub use config::AccrualConfig;
pub use error::AccrualError;
