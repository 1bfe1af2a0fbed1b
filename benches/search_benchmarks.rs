//! Search scaling benchmarks.
//!
//! Search is a linear cosine scan, so latency should grow with corpus size
//! times dimension.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use synapse_core::policy::RobotsTxt;
use synapse_core::search::{cosine_similarity, EmbeddingProvider, MemoryRepository};
use synapse_core::{Result, SemanticStore};

/// Random unit-free vectors, seeded by the text so repeats agree.
struct RandomEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for RandomEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        Ok((0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "random"
    }
}

fn bench_cosine(c: &mut Criterion) {
    let mut group = c.benchmark_group("cosine_similarity");
    let mut rng = StdRng::seed_from_u64(42);

    for &dims in &[384usize, 768] {
        let a: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let b: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(dims), &(a, b), |bench, (a, b)| {
            bench.iter(|| black_box(cosine_similarity(a, b)))
        });
    }

    group.finish();
}

fn bench_search_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_scaling");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(30);

    let rt = tokio::runtime::Runtime::new().unwrap();

    for &size in &[100usize, 1_000, 5_000] {
        let store = Arc::new(SemanticStore::new(
            Arc::new(RandomEmbedder { dims: 384 }),
            Arc::new(MemoryRepository::new()),
        ));
        rt.block_on(async {
            for i in 0..size {
                store
                    .store_document(&format!("doc-{}", i), &format!("text {}", i), None)
                    .await
                    .unwrap();
            }
            // Hydrate before timing.
            store.search("warmup", 1).await.unwrap();
        });

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("top_5", size), &store, |b, store| {
            b.to_async(&rt)
                .iter(|| async { black_box(store.search("query", 5).await.unwrap()) })
        });
    }

    group.finish();
}

fn bench_robots_parse(c: &mut Criterion) {
    let mut body = String::from("User-agent: *\nCrawl-delay: 1\n");
    for i in 0..200 {
        body.push_str(&format!("Disallow: /section-{}/*/private$\n", i));
        body.push_str(&format!("Allow: /section-{}/public\n", i));
    }
    body.push_str("\nUser-agent: SynapseBot\nDisallow: /internal\n");

    c.bench_function("robots_parse_and_check", |b| {
        b.iter(|| {
            let robots = RobotsTxt::parse(black_box(&body));
            black_box(robots.check("/section-150/a/b/private", "SynapseBot/1.0"))
        })
    });
}

criterion_group!(benches, bench_cosine, bench_search_scaling, bench_robots_parse);
criterion_main!(benches);
