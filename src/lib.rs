//! bidflow — real-time click-stream enrichment and tumbling-window aggregation.
//!
//! Modular structure:
//! - [`record`] — Event Record wire format (40 tab-separated fields)
//! - [`reference`] — Immutable reference table with atomic snapshot swap
//! - [`ingest`] — Ingestion buffer: batching to durable storage plus the real-time tap
//! - [`storage`] — Durable batch store (gzip objects, deterministic keys)
//! - [`enrich`] — Left-outer join of records against the reference table
//! - [`window`] — Tumbling-window per-label counts
//! - [`sink`] — Retried delivery of closed-window counts
//! - [`pipeline`] — Shard workers and startup/shutdown
//! - [`logging`] — Structured JSON logging

pub mod clock;
pub mod config;
pub mod enrich;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod reference;
pub mod retry;
pub mod sink;
pub mod stats;
pub mod storage;
pub mod window;

pub use config::PipelineConfig;
pub use enrich::{EnrichedRecord, StreamEnricher};
pub use ingest::{IngestionBuffer, Submit};
pub use logging::StructuredLogger;
pub use pipeline::{Pipeline, PipelineError};
pub use record::EventRecord;
pub use reference::{ReferenceHandle, ReferenceTable};
pub use sink::{Delivery, MetricsConsumer, SinkDispatcher};
pub use stats::{PipelineStats, StatsSnapshot};
pub use storage::BatchStore;
pub use window::{WindowedAggregator, WindowedCount};
