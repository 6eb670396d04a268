use std::{collections::HashMap, hint::black_box, sync::Arc};

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use libris::{AggregationSource, BatchLoader, Key, LoaderOptions};
use libris_error::LoaderError;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tokio::runtime::Runtime;

/// Источник без задержек: отдаёт 1 для каждого ключа.
struct ConstSource;

#[async_trait]
impl AggregationSource for ConstSource {
    async fn count_by_parent(
        &self,
        keys: &[Key],
    ) -> Result<HashMap<Key, u64>, LoaderError> {
        Ok(keys.iter().map(|k| (k.clone(), 1)).collect())
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Ключи с повторами: примерно половина запросов дублирует уже
/// запрошенные ключи.
fn keys_with_duplicates(n: usize) -> Vec<Key> {
    let mut rng = SmallRng::seed_from_u64(42);
    (0..n)
        .map(|_| Key::from(rng.gen_range(0..(n as u64 / 2).max(1))))
        .collect()
}

fn bench_load_window(c: &mut Criterion) {
    let rt = runtime();
    let source: Arc<dyn AggregationSource> = Arc::new(ConstSource);
    let mut group = c.benchmark_group("loader_window");

    for &n in &[10usize, 100, 1000] {
        let keys = keys_with_duplicates(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &keys, |b, keys| {
            b.to_async(&rt).iter(|| {
                let loader = BatchLoader::new(source.clone(), LoaderOptions::default());
                let keys = keys.clone();
                async move { black_box(loader.load_many(keys).await) }
            })
        });
    }
    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = runtime();
    let source: Arc<dyn AggregationSource> = Arc::new(ConstSource);
    let loader = BatchLoader::new(source, LoaderOptions::default());
    rt.block_on(async {
        let _ = loader.load("warm").await;
    });

    c.bench_function("loader_cache_hit", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(loader.load("warm").await) })
    });
}

criterion_group!(benches, bench_load_window, bench_cache_hit);
criterion_main!(benches);
