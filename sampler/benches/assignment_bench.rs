use criterion::{black_box, criterion_group, criterion_main, Criterion};
use experiment_sampler::{
    AssignmentStrategy, HashAlgorithm, IdentifierHasher, SamplingBucketEngine,
};
use std::collections::HashMap;

fn create_strategy(algorithm: HashAlgorithm) -> AssignmentStrategy {
    let engine = SamplingBucketEngine::new(
        0.1,
        vec!["control".to_string(), "treatment".to_string()],
    )
    .unwrap();
    AssignmentStrategy::new(
        engine,
        IdentifierHasher::new(algorithm),
        Some("forceTest".to_string()),
    )
}

fn benchmark_hash(c: &mut Criterion) {
    let md5 = IdentifierHasher::new(HashAlgorithm::Md5);
    let xxh3 = IdentifierHasher::new(HashAlgorithm::Xxh3);

    c.bench_function("hash_md5", |b| b.iter(|| md5.hash(black_box(123_456_789))));
    c.bench_function("hash_xxh3", |b| b.iter(|| xxh3.hash(black_box(123_456_789))));
}

fn benchmark_engine(c: &mut Criterion) {
    let engine = SamplingBucketEngine::new(
        0.5,
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
    )
    .unwrap();

    c.bench_function("engine_sample_and_bucket", |b| {
        b.iter(|| {
            let random = black_box(0.618);
            (engine.is_sampled(random), engine.get_bucket(random))
        });
    });
}

fn benchmark_resolve(c: &mut Criterion) {
    let strategy = create_strategy(HashAlgorithm::Md5);
    let empty = HashMap::new();
    let forced: HashMap<String, String> = [("forceTest".to_string(), "1".to_string())]
        .into_iter()
        .collect();

    c.bench_function("resolve_probabilistic", |b| {
        b.iter(|| strategy.resolve_bucket(black_box(987_654), &empty));
    });

    c.bench_function("resolve_override", |b| {
        b.iter(|| strategy.resolve_bucket(black_box(987_654), &forced));
    });
}

criterion_group!(benches, benchmark_hash, benchmark_engine, benchmark_resolve);
criterion_main!(benches);
