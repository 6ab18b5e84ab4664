//! One shard end to end: reader → ingestion buffer → tap (enricher → aggregator) → counts channel.

use crate::clock::Clock;
use crate::enrich::StreamEnricher;
use crate::ingest::{IngestionBuffer, Submit, Tap};
use crate::stats::{bump, PipelineStats};
use crate::window::{Observation, WindowedAggregator, WindowedCount};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Real-time path of a shard.
pub struct ShardTap {
    shard: usize,
    enricher: StreamEnricher,
    aggregator: WindowedAggregator,
    counts_tx: mpsc::UnboundedSender<WindowedCount>,
}

impl ShardTap {
    pub fn new(
        shard: usize,
        enricher: StreamEnricher,
        aggregator: WindowedAggregator,
        counts_tx: mpsc::UnboundedSender<WindowedCount>,
    ) -> Self {
        Self {
            shard,
            enricher,
            aggregator,
            counts_tx,
        }
    }

    /// Close the open window if processing time has passed its end.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let closed = self.aggregator.advance_to(now);
        self.emit(closed);
    }

    /// Emit every open window.
    pub fn drain(&mut self) {
        let closed = self.aggregator.close_all();
        self.emit(closed);
    }

    fn emit(&self, counts: Vec<WindowedCount>) {
        for count in counts {
            if let Err(mpsc::error::SendError(count)) = self.counts_tx.send(count) {
                warn!(
                    shard = self.shard,
                    key = %count.dedup_key(),
                    "sink dispatcher gone; count not delivered"
                );
            }
        }
    }
}

impl Tap for ShardTap {
    fn forward(&mut self, line: &str, arrived_at: DateTime<Utc>) {
        // malformed lines are counted by the enricher and go no further
        let Ok(record) = self.enricher.enrich(line, arrived_at) else {
            return;
        };
        if let Observation::Counted { closed } = self.aggregator.observe(&record) {
            self.emit(closed);
        }
    }
}

/// Summary returned when a shard stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardReport {
    pub shard: usize,
    pub lines_read: u64,
    /// Lines read but never accepted because shutdown interrupted backpressure.
    pub lines_unaccepted: u64,
    /// Unflushed bytes abandoned when the drain timed out.
    pub bytes_lost: u64,
}

pub struct ShardWorker {
    shard: usize,
    buffer: IngestionBuffer<ShardTap>,
    flusher: JoinHandle<()>,
    unflushed: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    throttle_retry: Duration,
    drain_timeout: Duration,
    stats: Arc<PipelineStats>,
    /// Latest arrival time handed out; a wall clock stepping back never goes below it.
    last_arrival: Option<DateTime<Utc>>,
}

impl ShardWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shard: usize,
        buffer: IngestionBuffer<ShardTap>,
        flusher: JoinHandle<()>,
        unflushed: Arc<AtomicU64>,
        clock: Arc<dyn Clock>,
        tick: Duration,
        throttle_retry: Duration,
        drain_timeout: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            shard,
            buffer,
            flusher,
            unflushed,
            clock,
            tick,
            throttle_retry,
            drain_timeout,
            stats,
            last_arrival: None,
        }
    }

    pub fn id(&self) -> usize {
        self.shard
    }

    /// Consume `input` until EOF or shutdown, then drain.
    pub async fn run<R>(mut self, input: R, mut shutdown: watch::Receiver<bool>) -> ShardReport
    where
        R: AsyncBufRead + Unpin,
    {
        let mut segments = input.split(b'\n');
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut lines_read = 0u64;
        let mut lines_unaccepted = 0u64;
        let mut signal_open = true;

        info!(shard = self.shard, "shard started");
        loop {
            tokio::select! {
                stopped = async { shutdown.wait_for(|stop| *stop).await.is_ok() }, if signal_open => {
                    if stopped {
                        info!(shard = self.shard, "shutdown requested");
                        break;
                    }
                    signal_open = false;
                }
                seg = segments.next_segment() => match seg {
                    Ok(Some(raw)) => {
                        lines_read += 1;
                        let Ok(line) = String::from_utf8(raw) else {
                            bump(&self.stats.malformed_records);
                            debug!(shard = self.shard, "non UTF-8 record skipped");
                            continue;
                        };
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !self.submit_with_backpressure(&line, &shutdown).await {
                            lines_unaccepted += 1;
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(shard = self.shard, "input exhausted");
                        break;
                    }
                    Err(e) => {
                        error!(shard = self.shard, error = %e, "input read failed");
                        break;
                    }
                },
                _ = ticker.tick() => self.on_tick(),
            }
        }

        let shard = self.shard;
        let bytes_lost = self.drain().await;
        let report = ShardReport {
            shard,
            lines_read,
            lines_unaccepted,
            bytes_lost,
        };
        info!(
            shard = report.shard,
            lines_read = report.lines_read,
            lines_unaccepted = report.lines_unaccepted,
            bytes_lost = report.bytes_lost,
            "shard stopped"
        );
        report
    }

    /// Retry a throttled record until it is accepted; gives up only on shutdown.
    async fn submit_with_backpressure(
        &mut self,
        line: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> bool {
        let mut throttled_since: Option<std::time::Instant> = None;
        loop {
            let now = self.arrival_time();
            match self.buffer.submit(line, now) {
                Submit::Accepted => {
                    if let Some(since) = throttled_since {
                        debug!(
                            shard = self.shard,
                            waited_ms = since.elapsed().as_millis() as u64,
                            "backpressure released"
                        );
                    }
                    return true;
                }
                Submit::Throttled => {
                    if throttled_since.is_none() {
                        warn!(
                            shard = self.shard,
                            buffered_bytes = self.buffer.buffered_bytes(),
                            "ingestion throttled; flush is behind"
                        );
                        throttled_since = Some(std::time::Instant::now());
                    }
                    if *shutdown.borrow() {
                        return false;
                    }
                    tokio::time::sleep(self.throttle_retry).await;
                    self.on_tick();
                }
            }
        }
    }

    /// Clock reading clamped to be non-decreasing, so a backward wall-clock step
    /// cannot make records look late to the aggregator.
    fn arrival_time(&mut self) -> DateTime<Utc> {
        let read = self.clock.now();
        let now = self.last_arrival.map_or(read, |last| last.max(read));
        self.last_arrival = Some(now);
        now
    }

    fn on_tick(&mut self) {
        let now = self.arrival_time();
        self.buffer.poll_age(now);
        self.buffer.tap_mut().tick(now);
    }

    /// Graceful drain: seal the open batch, emit open windows, wait for the flusher
    /// up to the drain timeout. Returns bytes abandoned by a hard cancellation.
    async fn drain(self) -> u64 {
        let Self {
            shard,
            mut buffer,
            mut flusher,
            unflushed,
            drain_timeout,
            stats,
            ..
        } = self;

        buffer.seal_remaining();
        // dropping the buffer closes the sealed-batch channel; the flusher exits once it is empty
        let mut tap = buffer.into_tap();
        tap.drain();
        drop(tap);

        match tokio::time::timeout(drain_timeout, &mut flusher).await {
            Ok(Ok(())) => 0,
            Ok(Err(e)) => {
                let lost = unflushed.load(Ordering::Acquire);
                error!(shard, error = %e, bytes_lost = lost, "flusher task failed");
                if lost > 0 {
                    bump(&stats.batches_dropped);
                }
                lost
            }
            Err(_) => {
                flusher.abort();
                let lost = unflushed.load(Ordering::Acquire);
                bump(&stats.batches_dropped);
                error!(
                    shard,
                    bytes_lost = lost,
                    timeout_secs = drain_timeout.as_secs(),
                    "drain timed out; in-flight batch dropped"
                );
                lost
            }
        }
    }
}
