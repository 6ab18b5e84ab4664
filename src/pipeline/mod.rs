//! Pipeline assembly: startup checks, one worker per shard, one sink dispatcher.

mod shard;

pub use shard::{ShardReport, ShardTap, ShardWorker};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, PipelineConfig};
use crate::enrich::StreamEnricher;
use crate::ingest::{BatchFlusher, BufferLimits, IngestionBuffer};
use crate::reference::{ReferenceError, ReferenceHandle, ReferenceTable};
use crate::retry::Backoff;
use crate::sink::{HttpMetricsConsumer, LineConsumer, MetricsConsumer, SinkDispatcher, SinkError};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::storage::{BatchStore, FsBatchStore, StoreError};
use crate::window::{TumblingWindow, WindowedAggregator, WindowedCount};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Startup failures. Everything after startup is recovered locally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reference table: {0}")]
    Reference(#[from] ReferenceError),
    #[error("batch store: {0}")]
    Storage(#[from] StoreError),
    #[error("metrics sink: {0}")]
    Sink(#[from] SinkError),
}

pub struct Pipeline {
    config: PipelineConfig,
    reference: ReferenceHandle,
    store: Arc<dyn BatchStore>,
    consumer: Arc<dyn MetricsConsumer>,
    clock: Arc<dyn Clock>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Validate config, load the reference asset and check the store. Any failure is fatal.
    pub async fn bootstrap(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let table = ReferenceTable::load(&config.reference_path)?;
        let store = FsBatchStore::new(&config.storage.root_dir);
        store.probe().await?;
        info!(root = %store.root().display(), "batch store ready");

        let consumer: Arc<dyn MetricsConsumer> = match config.sink.endpoint.as_deref() {
            Some(endpoint) => {
                let http = HttpMetricsConsumer::new(endpoint, &config.sink)?;
                info!(url = %http.url(), "metrics sink: http");
                Arc::new(http)
            }
            None => {
                info!("metrics sink: stdout");
                Arc::new(LineConsumer::stdout())
            }
        };

        Ok(Self::with_parts(
            config,
            ReferenceHandle::new(table),
            Arc::new(store),
            consumer,
            Arc::new(SystemClock),
        ))
    }

    /// Assemble from already-built collaborators (tests, embedding).
    pub fn with_parts(
        config: PipelineConfig,
        reference: ReferenceHandle,
        store: Arc<dyn BatchStore>,
        consumer: Arc<dyn MetricsConsumer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            reference,
            store,
            consumer,
            clock,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn reference(&self) -> &ReferenceHandle {
        &self.reference
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Build shard `id` and spawn its flusher. Must be called inside a tokio runtime.
    pub fn shard(&self, id: usize, counts_tx: mpsc::UnboundedSender<WindowedCount>) -> ShardWorker {
        let ingest = &self.config.ingest;
        let storage = &self.config.storage;
        let unflushed = Arc::new(AtomicU64::new(0));
        let (sealed_tx, sealed_rx) = mpsc::unbounded_channel();

        let flusher = BatchFlusher::new(
            id,
            self.store.clone(),
            Backoff::new(
                Duration::from_millis(storage.retry_base_ms),
                Duration::from_millis(storage.retry_max_ms),
            ),
            storage.compression_level,
            unflushed.clone(),
            self.stats.clone(),
        );
        let flusher = tokio::spawn(flusher.run(sealed_rx));

        let tap = ShardTap::new(
            id,
            StreamEnricher::new(id, self.reference.clone(), self.stats.clone()),
            WindowedAggregator::new(
                id,
                TumblingWindow::new(self.config.window.width()),
                self.stats.clone(),
            ),
            counts_tx,
        );
        let buffer = IngestionBuffer::new(
            id,
            BufferLimits::from_config(ingest, storage),
            unflushed.clone(),
            sealed_tx,
            tap,
            self.stats.clone(),
        );

        ShardWorker::new(
            id,
            buffer,
            flusher,
            unflushed,
            self.clock.clone(),
            ingest.tick(),
            ingest.throttle_retry(),
            ingest.drain_timeout(),
            self.stats.clone(),
        )
    }

    /// Run one shard per input until every input ends or `shutdown` flips to true,
    /// then drain and wait for the sink.
    pub async fn run<R>(self, inputs: Vec<R>, shutdown: watch::Receiver<bool>) -> StatsSnapshot
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (counts_tx, counts_rx) = mpsc::unbounded_channel();
        let dispatcher =
            SinkDispatcher::from_config(self.consumer.clone(), &self.config.sink, self.stats.clone());
        let sink = tokio::spawn(dispatcher.run(counts_rx));

        let mut workers = Vec::with_capacity(inputs.len());
        for (id, input) in inputs.into_iter().enumerate() {
            let worker = self.shard(id, counts_tx.clone());
            workers.push(tokio::spawn(worker.run(input, shutdown.clone())));
        }
        drop(counts_tx);
        info!(shards = workers.len(), "pipeline running");

        for w in workers {
            if let Err(e) = w.await {
                error!(error = %e, "shard task failed");
            }
        }
        if let Err(e) = sink.await {
            error!(error = %e, "sink task failed");
        }

        let snapshot = self.stats.snapshot();
        info!(
            accepted = snapshot.accepted,
            malformed = snapshot.malformed_records,
            reference_misses = snapshot.reference_misses,
            late = snapshot.late_records,
            windows_closed = snapshot.windows_closed,
            batches_flushed = snapshot.batches_flushed,
            sink_delivered = snapshot.sink_delivered,
            sink_dropped = snapshot.sink_dropped,
            "pipeline stopped"
        );
        snapshot
    }
}
