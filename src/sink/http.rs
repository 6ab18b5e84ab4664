//! HTTP metrics consumer: one JSON metric datum per Windowed Count.

use super::{MetricsConsumer, SinkError};
use crate::config::SinkConfig;
use crate::window::WindowedCount;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Metric name used for the null-label bucket.
pub const UNKNOWN_METRIC: &str = "unknown";

/// Body posted to the endpoint. `value` is the window count, `timestamp` the window start.
#[derive(Debug, Serialize)]
pub struct MetricDatum<'a> {
    pub namespace: &'a str,
    pub metric_name: &'a str,
    pub timestamp: String,
    pub value: u64,
    pub unit: &'static str,
    pub dedup_key: String,
}

impl<'a> MetricDatum<'a> {
    pub fn from_count(namespace: &'a str, count: &'a WindowedCount) -> Self {
        Self {
            namespace,
            metric_name: count.label.as_deref().unwrap_or(UNKNOWN_METRIC),
            timestamp: count.window_start.to_rfc3339(),
            value: count.count,
            unit: "Count",
            dedup_key: count.dedup_key(),
        }
    }
}

pub struct HttpMetricsConsumer {
    client: reqwest::Client,
    url: String,
    namespace: String,
}

impl HttpMetricsConsumer {
    pub fn new(endpoint: &str, config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: endpoint.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MetricsConsumer for HttpMetricsConsumer {
    async fn publish(&self, count: &WindowedCount) -> Result<(), SinkError> {
        let datum = MetricDatum::from_count(&self.namespace, count);
        let res = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", datum.dedup_key.as_str())
            .json(&datum)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
