//! Per-shard enricher. Invoked synchronously from the shard tap, so output order is arrival order.

use super::EnrichedRecord;
use crate::record::{EventRecord, RecordError};
use crate::reference::ReferenceHandle;
use crate::stats::{bump, PipelineStats};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub struct StreamEnricher {
    shard: usize,
    reference: ReferenceHandle,
    stats: Arc<PipelineStats>,
}

impl StreamEnricher {
    pub fn new(shard: usize, reference: ReferenceHandle, stats: Arc<PipelineStats>) -> Self {
        Self {
            shard,
            reference,
            stats,
        }
    }

    /// Validate and join one line. Malformed lines are counted and returned as errors for the caller to skip.
    pub fn enrich(
        &self,
        line: &str,
        ingest_time: DateTime<Utc>,
    ) -> Result<EnrichedRecord, RecordError> {
        let record = match EventRecord::parse(line) {
            Ok(r) => r,
            Err(e) => {
                bump(&self.stats.malformed_records);
                debug!(shard = self.shard, error = %e, "malformed record skipped");
                return Err(e);
            }
        };

        let label = self.reference.snapshot().lookup_shared(record.ad);
        if label.is_none() {
            bump(&self.stats.reference_misses);
        }
        Ok(EnrichedRecord {
            ingest_time,
            code: record.ad,
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceTable;
    use chrono::TimeZone;

    fn line(ad: &str) -> String {
        let mut fields = vec![ad.to_string()];
        fields.extend(std::iter::repeat("0".to_string()).take(13));
        fields.extend(std::iter::repeat("05db9164".to_string()).take(26));
        fields.join("\t")
    }

    fn enricher(stats: &Arc<PipelineStats>) -> StreamEnricher {
        let table = ReferenceTable::from_entries([(0, "Not clicked"), (1, "Clicked")]);
        StreamEnricher::new(0, ReferenceHandle::new(table), stats.clone())
    }

    #[test]
    fn hit_carries_label() {
        let stats = Arc::new(PipelineStats::default());
        let at = Utc.timestamp_millis_opt(1_567_208_819_301).unwrap();
        let e = enricher(&stats).enrich(&line("1"), at).unwrap();
        assert_eq!(e.label.as_deref(), Some("Clicked"));
        assert_eq!(e.code, 1);
        assert_eq!(e.ingest_time, at);
        assert_eq!(stats.snapshot().reference_misses, 0);
    }

    #[test]
    fn miss_is_unknown_bucket_not_dropped() {
        let stats = Arc::new(PipelineStats::default());
        let e = enricher(&stats).enrich(&line("9"), Utc::now()).unwrap();
        assert_eq!(e.label, None);
        assert_eq!(stats.snapshot().reference_misses, 1);
    }

    #[test]
    fn malformed_is_counted() {
        let stats = Arc::new(PipelineStats::default());
        let en = enricher(&stats);
        assert!(en.enrich("garbage", Utc::now()).is_err());
        assert!(en.enrich(&line("1x"), Utc::now()).is_err());
        assert_eq!(stats.snapshot().malformed_records, 2);
    }

    #[test]
    fn sees_swapped_table() {
        let stats = Arc::new(PipelineStats::default());
        let handle = ReferenceHandle::new(ReferenceTable::default());
        let en = StreamEnricher::new(0, handle.clone(), stats);
        assert_eq!(en.enrich(&line("1"), Utc::now()).unwrap().label, None);
        handle.swap(ReferenceTable::from_entries([(1, "Clicked")]));
        assert_eq!(
            en.enrich(&line("1"), Utc::now()).unwrap().label.as_deref(),
            Some("Clicked")
        );
    }
}
