//! Delivery of closed-window counts to the downstream metrics consumer.
//!
//! Delivery is best-effort: bounded retries, then drop and count. Consumers
//! should de-duplicate on `(label, window_start)`; a retried publish carries
//! the same key.

mod dispatcher;
mod http;
mod line;

pub use dispatcher::{Delivery, SinkDispatcher};
pub use http::{HttpMetricsConsumer, MetricDatum};
pub use line::LineConsumer;

use crate::window::WindowedCount;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("consumer rejected datum: {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    async fn publish(&self, count: &WindowedCount) -> Result<(), SinkError>;
}
