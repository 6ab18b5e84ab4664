//! Stream enrichment: tap line → validated Event Record → left-outer join on `AD`.

mod enricher;

pub use enricher::StreamEnricher;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Record after the join. `label` is `None` when `AD` has no reference entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedRecord {
    pub ingest_time: DateTime<Utc>,
    pub code: i64,
    pub label: Option<Arc<str>>,
}
