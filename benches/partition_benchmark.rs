use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nhop::graph::{partition, plan_deployment, SizeLimits};
use nhop::CsrGraph;

fn ring_lattice(nodes: usize, degree: usize) -> Arc<CsrGraph<u32>> {
    let adjacency: Vec<Vec<usize>> = (0..nodes)
        .map(|i| (1..=degree).map(|j| (i + j * 7) % nodes).collect())
        .collect();
    Arc::new(CsrGraph::from_adjacency(&adjacency).unwrap())
}

fn bench_partition(c: &mut Criterion) {
    let graph = ring_lattice(100_000, 16);
    let mut group = c.benchmark_group("partition");
    for channels in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(channels), &channels, |b, &channels| {
            b.iter(|| black_box(partition(&graph, channels, SizeLimits::new(1 << 16, 1 << 18)).unwrap()));
        });
    }
    group.finish();

    c.bench_function("plan_deployment_multi_kernel", |b| {
        b.iter(|| black_box(plan_deployment(&graph, 8, SizeLimits::new(1 << 14, 1 << 16)).unwrap()));
    });
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
