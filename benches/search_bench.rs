//! Benchmarks for kNN search: linear scan vs R*-tree vs M-tree

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tree_index::{
    DistanceMetric, LinearScan, MTree, MTreeSettings, MemoryRelation, RStarTree,
    RStarTreeSettings, Vector,
};

fn random_relation(n: usize, dim: usize) -> MemoryRelation<Vector> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| Vector::new((0..dim).map(|_| rng.gen::<f64>()).collect()))
        .collect()
}

fn benchmark_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn");
    let metric = DistanceMetric::Euclidean;
    let query = Vector::new(vec![0.5; 4]);

    for size in [1000, 10000].iter() {
        let relation = random_relation(*size, 4);
        let scan = LinearScan::new(&relation, &metric);
        let rstar = RStarTree::from_relation(&relation, RStarTreeSettings::default()).unwrap();
        let mtree = MTree::from_relation(&relation, metric, MTreeSettings::default()).unwrap();

        group.bench_with_input(BenchmarkId::new("linear", size), size, |b, _| {
            b.iter(|| scan.knn(black_box(&query), black_box(10)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("rstar", size), size, |b, _| {
            b.iter(|| {
                rstar
                    .knn(&metric, black_box(query.as_slice()), black_box(10))
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("mtree", size), size, |b, _| {
            b.iter(|| mtree.knn(&relation, black_box(&query), black_box(10)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    let relation = random_relation(5000, 4);

    group.bench_function("rstar_bulk", |b| {
        b.iter(|| RStarTree::from_relation(&relation, RStarTreeSettings::default()).unwrap());
    });
    group.bench_function("rstar_insert", |b| {
        b.iter(|| {
            let mut tree = RStarTree::new(RStarTreeSettings::default()).unwrap();
            for (oid, v) in relation.iter() {
                tree.insert(oid, v).unwrap();
            }
            tree
        });
    });
    group.bench_function("mtree", |b| {
        b.iter(|| {
            MTree::from_relation(&relation, DistanceMetric::Euclidean, MTreeSettings::default())
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_knn, benchmark_build);
criterion_main!(benches);
