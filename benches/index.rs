use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vsearch::config::IndexOptions;
use vsearch::distance::Metric;
use vsearch::index::ShardedIndex;
use vsearch::ivf::QuantizerKind;
use vsearch::kmeans::kmeans;
use vsearch::types::ItemRecord;

const DIM: usize = 128;

// 生成有聚类模式的测试数据
fn generate_clustered_data(n: usize, num_clusters: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    let centers = (0..num_clusters * DIM).map(|_| rng.random_range(-1.0..1.0)).collect::<Vec<f32>>();
    let mut data = Vec::with_capacity(n * DIM);
    for i in 0..n {
        let center = &centers[(i % num_clusters) * DIM..(i % num_clusters + 1) * DIM];
        data.extend(center.iter().map(|c| c + rng.random_range(-0.1..0.1)));
    }
    data
}

fn build_index(data: &[f32], quantizer: QuantizerKind) -> ShardedIndex {
    let opts = IndexOptions {
        metric: Metric::Euclidean,
        shards: 4,
        train_threshold: 0,
        quantizer,
        ..IndexOptions::default()
    };
    let index = ShardedIndex::new(DIM, &opts);
    let records = data
        .chunks(DIM)
        .enumerate()
        .map(|(i, v)| ItemRecord::new(format!("v{i}"), v.to_vec()))
        .collect();
    index.insert_batch(records).unwrap();
    index.train();
    index
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.sample_size(10);

    for (n, k) in [(4096, 64), (16384, 256)] {
        let data = generate_clustered_data(n, k / 2);
        group.bench_function(format!("kmeans_{n}_{k}"), |b| {
            b.iter(|| kmeans(black_box(&data), DIM, k, 25, Metric::Euclidean, 0))
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let data = generate_clustered_data(50000, 200);
    let queries = generate_clustered_data(100, 200);

    for quantizer in [QuantizerKind::Flat, QuantizerKind::Hnsw] {
        let index = build_index(&data, quantizer);
        for nprobe in [1, 8, 32] {
            group.bench_with_input(
                BenchmarkId::new(format!("{quantizer:?}"), nprobe),
                &nprobe,
                |b, &nprobe| {
                    b.iter(|| {
                        for q in queries.chunks(DIM) {
                            black_box(index.query_with(q, 10, nprobe).unwrap());
                        }
                    })
                },
            );
        }
    }

    let index = build_index(&data, QuantizerKind::Flat);
    group.bench_function("exact", |b| {
        b.iter(|| {
            for q in queries.chunks(DIM) {
                black_box(index.query_exact(q, 10).unwrap());
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_kmeans, bench_query);
criterion_main!(benches);
