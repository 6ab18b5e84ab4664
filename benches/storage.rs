//! Batch storage benchmark: gzip a sealed batch and write it to the filesystem store.

use bidflow::ingest::{object_key, SealedBatch};
use bidflow::storage::{BatchStore, FsBatchStore};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

fn make_batch(records: usize) -> SealedBatch {
    let mut body = Vec::new();
    for i in 0..records {
        let mut fields = vec![(i % 2).to_string()];
        fields.extend((0..39).map(|c| format!("{:08x}", i + c)));
        body.extend_from_slice(fields.join("\t").as_bytes());
        body.push(b'\n');
    }
    let opened_at = Utc::now();
    SealedBatch {
        shard: 0,
        seq: 1,
        key: object_key("raw-data/", 0, 1, opened_at),
        opened_at,
        records: records as u64,
        body,
    }
}

fn bench_gzip_batch(c: &mut Criterion) {
    let batch = make_batch(10_000);
    c.bench_function("gzip_10k_record_batch", |b| {
        b.iter(|| black_box(batch.gzip(6)).unwrap())
    });
}

fn bench_fs_put(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = FsBatchStore::new(dir.path());
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(store.probe()).unwrap();
    let batch = make_batch(1_000);
    let body = batch.gzip(6).unwrap();

    c.bench_function("fs_store_put_1k_record_batch", |b| {
        b.iter(|| rt.block_on(store.put(&batch.key, black_box(&body))).unwrap())
    });
}

criterion_group!(benches, bench_gzip_batch, bench_fs_put);
criterion_main!(benches);
