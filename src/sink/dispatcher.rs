//! Retry loop in front of a [`MetricsConsumer`].

use super::MetricsConsumer;
use crate::config::SinkConfig;
use crate::retry::Backoff;
use crate::stats::{bump, PipelineStats};
use crate::window::WindowedCount;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Ok,
    /// Attempt cap exhausted; the count was dropped.
    Failed,
}

pub struct SinkDispatcher {
    consumer: Arc<dyn MetricsConsumer>,
    max_attempts: u32,
    backoff: Backoff,
    stats: Arc<PipelineStats>,
}

impl SinkDispatcher {
    pub fn new(
        consumer: Arc<dyn MetricsConsumer>,
        max_attempts: u32,
        backoff: Backoff,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            consumer,
            max_attempts: max_attempts.max(1),
            backoff,
            stats,
        }
    }

    pub fn from_config(
        consumer: Arc<dyn MetricsConsumer>,
        config: &SinkConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self::new(
            consumer,
            config.max_attempts,
            Backoff::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
            stats,
        )
    }

    /// Publish one count, backing off between failed attempts.
    pub async fn deliver(&self, count: &WindowedCount) -> Delivery {
        for attempt in 1..=self.max_attempts {
            match self.consumer.publish(count).await {
                Ok(()) => {
                    bump(&self.stats.sink_delivered);
                    debug!(key = %count.dedup_key(), count = count.count, attempt, "count delivered");
                    return Delivery::Ok;
                }
                Err(e) if attempt < self.max_attempts => {
                    bump(&self.stats.sink_retries);
                    let delay = self.backoff.jittered(attempt);
                    debug!(
                        key = %count.dedup_key(),
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "delivery failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    bump(&self.stats.sink_dropped);
                    warn!(
                        label = count.label.as_deref().unwrap_or("null"),
                        window_start = %count.window_start,
                        count = count.count,
                        attempts = attempt,
                        error = %e,
                        "delivery failed; count dropped"
                    );
                }
            }
        }
        Delivery::Failed
    }

    /// Deliver everything the shards emit until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<WindowedCount>) -> (u64, u64) {
        let (mut delivered, mut failed) = (0u64, 0u64);
        while let Some(count) = rx.recv().await {
            match self.deliver(&count).await {
                Delivery::Ok => delivered += 1,
                Delivery::Failed => failed += 1,
            }
        }
        info!(delivered, failed, "sink dispatcher finished");
        (delivered, failed)
    }
}
