//! Sealed batches and their object keys.

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// `<prefix>YYYY/MM/DD/HH/shard-<shard>-<seq>.gz`, partitioned by first arrival (UTC).
/// Depends only on shard, sequence and that instant, so a retry rewrites the same object.
pub fn object_key(prefix: &str, shard: usize, seq: u64, opened_at: DateTime<Utc>) -> String {
    format!(
        "{}{}/shard-{:04}-{:010}.gz",
        prefix,
        opened_at.format("%Y/%m/%d/%H"),
        shard,
        seq
    )
}

/// Batch closed for writing; its key is fixed at seal time.
#[derive(Debug, Clone)]
pub struct SealedBatch {
    pub shard: usize,
    pub seq: u64,
    pub key: String,
    pub opened_at: DateTime<Utc>,
    pub records: u64,
    /// Raw newline-terminated lines.
    pub body: Vec<u8>,
}

impl SealedBatch {
    pub fn raw_len(&self) -> usize {
        self.body.len()
    }

    pub fn gzip(&self, level: u32) -> std::io::Result<Vec<u8>> {
        gzip(&self.body, level)
    }
}

pub(crate) fn gzip(body: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut enc = GzEncoder::new(
        Vec::with_capacity(body.len() / 4 + 64),
        Compression::new(level),
    );
    enc.write_all(body)?;
    enc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn key_is_partitioned_by_date_and_hour() {
        let t = Utc.with_ymd_and_hms(2019, 8, 31, 0, 46, 59).unwrap();
        assert_eq!(
            object_key("raw-data/", 3, 42, t),
            "raw-data/2019/08/31/00/shard-0003-0000000042.gz"
        );
    }

    #[test]
    fn gzip_preserves_lines() {
        let b = SealedBatch {
            shard: 0,
            seq: 1,
            key: "k".into(),
            opened_at: Utc::now(),
            records: 2,
            body: b"a\nb\n".to_vec(),
        };
        let gz = b.gzip(6).unwrap();
        let mut out = String::new();
        GzDecoder::new(&gz[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, "a\nb\n");
    }
}
