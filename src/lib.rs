//! OKX order-book connector with a concurrent matrix-inversion workload.
//!
//! Two workers share one order book: the feed keeps it current from the OKX
//! public websocket, and the compute worker repeatedly snapshots it and
//! solves A·X = E by Gauss-Jordan elimination. The pipeline runs both for a
//! fixed observation window, requests a cooperative stop, and reports the
//! message and inversion counters.

pub mod book;
pub mod compute;
pub mod config;
pub mod error;
pub mod feed;
pub mod matrix;
pub mod pipeline;
pub mod state;

pub use book::OrderBook;
pub use compute::InversionWorker;
pub use config::{AppConfig, ConnectorConfig, Mode, RunConfig, SettingsLoader};
pub use error::{BenchError, Result};
pub use feed::OkxFeed;
pub use matrix::{InverseResult, Matrix};
pub use state::{RunReport, RunState};
