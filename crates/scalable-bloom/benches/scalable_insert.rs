//! # Scalable Filter Benchmarks
//!
//! ```bash
//! cargo bench --package scalable-bloom --bench scalable_insert
//! ```
//!
//! - Insert throughput while tiers are being appended
//! - Lookup cost as the tier count grows
//! - Keyed-store backend overhead relative to in-process tiers
//! - Snapshot encode/decode

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use scalable_bloom::adapters::persistence::{decode_snapshot, encode_snapshot};
use scalable_bloom::{
    InMemoryKVStore, KeyedBackendFactory, ScalableConfigBuilder, ScalableFilter,
    ScalableFilterApi,
};

fn generate_keys(count: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut key = vec![0u8; 20];
            rng.fill(&mut key[..]);
            key
        })
        .collect()
}

fn filled_filter(initial_size: u64, keys: &[Vec<u8>]) -> ScalableFilter {
    let config = ScalableConfigBuilder::new()
        .initial_size(initial_size)
        .build()
        .unwrap();
    let mut filter = ScalableFilter::new(config).unwrap();
    for key in keys {
        filter.insert(key).unwrap();
    }
    filter
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalable/insert");
    group.measurement_time(Duration::from_secs(5));

    for count in [1_000usize, 10_000] {
        let keys = generate_keys(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("local", count), &keys, |b, keys| {
            b.iter(|| black_box(filled_filter(1_000, keys)))
        });

        group.bench_with_input(BenchmarkId::new("keyed", count), &keys, |b, keys| {
            b.iter(|| {
                let store = Arc::new(InMemoryKVStore::new());
                let factory = Arc::new(KeyedBackendFactory::new(store));
                let config = ScalableConfigBuilder::new()
                    .initial_size(1_000)
                    .build()
                    .unwrap();
                let mut filter = ScalableFilter::with_backend(config, factory).unwrap();
                for key in keys {
                    filter.insert(key).unwrap();
                }
                black_box(filter)
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalable/lookup");

    // Smaller initial tiers mean more tiers for the same key count
    for initial_size in [100_000u64, 10_000, 1_000] {
        let keys = generate_keys(20_000);
        let filter = filled_filter(initial_size, &keys);
        let lookups = generate_keys(1_000);

        group.bench_with_input(
            BenchmarkId::new("absent", format!("{}_tiers", filter.size())),
            &lookups,
            |b, lookups| {
                b.iter(|| {
                    for lookup in lookups {
                        black_box(filter.include(lookup).unwrap());
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalable/snapshot");
    let filter = filled_filter(1_000, &generate_keys(10_000));
    let state = filter.to_state().unwrap();
    let bytes = encode_snapshot(&state).unwrap();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(encode_snapshot(&state).unwrap()))
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(decode_snapshot(&bytes).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_snapshot);
criterion_main!(benches);
