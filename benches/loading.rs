//! Benchmarks for the loading pipeline.
//!
//! Measures the stages a type goes through before first use:
//! - Decoding a `CLNK` class image
//! - Loading a hierarchy through a loader chain
//! - Linking with eager resolution
//! - Initializing through the coordinator
//! - Repeated lookups of already initialized types

extern crate classlink;

use classlink::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::hint::black_box;

const CHAIN: usize = 32;

/// A linear hierarchy `demo.T0 <- demo.T1 <- ...` where every type references
/// its supertype's field and method.
fn chain_source() -> MemorySource {
    let source = MemorySource::new().with_class(
        &ClassBuilder::class("demo.T0")
            .field("value", "I")
            .static_field("count", "J")
            .method("run", "()V", vec![0x01])
            .initializer(vec![0x01])
            .build()
            .unwrap(),
    );
    for level in 1..CHAIN {
        let parent = format!("demo.T{}", level - 1);
        source.insert_class(
            &ClassBuilder::class(format!("demo.T{level}"))
                .extends(parent.as_str())
                .field(format!("f{level}"), "I")
                .method("run", "()V", vec![0x01])
                .field_ref(parent.as_str(), "value", "I")
                .method_ref(parent.as_str(), "run", "()V")
                .type_ref(parent.as_str())
                .initializer(vec![0x01])
                .build()
                .unwrap(),
        );
    }
    source
}

fn fresh_runtime() -> Runtime {
    Runtime::builder().bootstrap_source(chain_source()).build()
}

fn leaf() -> String {
    format!("demo.T{}", CHAIN - 1)
}

/// Benchmark decoding a single class image.
fn bench_decode(c: &mut Criterion) {
    let bytes = ClassBuilder::class("demo.Wide")
        .extends("demo.Base")
        .implements("demo.Api")
        .field("a", "I")
        .field("b", "[Ljava.lang.String;")
        .static_constant("LIMIT", "J", Value::Long(64))
        .method("run", "(IJ)V", vec![0x01; 64])
        .field_ref("demo.Base", "a", "I")
        .method_ref("demo.Base", "run", "(IJ)V")
        .to_bytes()
        .unwrap();
    let decoder = ImageDecoder;

    let mut group = c.benchmark_group("image");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let descriptor = decoder.decode("demo.Wide", black_box(&bytes)).unwrap();
            black_box(descriptor)
        });
    });
    group.finish();
}

/// Benchmark loading, linking and initializing a deep hierarchy in a fresh runtime.
fn bench_pipeline(c: &mut Criterion) {
    let leaf = leaf();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(CHAIN as u64));

    group.bench_function("load", |b| {
        b.iter_batched(
            fresh_runtime,
            |runtime| {
                let record = runtime.load_type(runtime.bootstrap(), &leaf).unwrap();
                black_box(record)
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("link", |b| {
        b.iter_batched(
            || {
                let runtime = fresh_runtime();
                let record = runtime.load_type(runtime.bootstrap(), &leaf).unwrap();
                (runtime, record)
            },
            |(runtime, record)| {
                runtime.link(&record).unwrap();
                black_box(record)
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("entry_point", |b| {
        b.iter_batched(
            fresh_runtime,
            |runtime| {
                let record = runtime.entry_point(runtime.bootstrap(), &leaf).unwrap();
                black_box(record)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

/// Benchmark the fast paths taken once everything is initialized.
fn bench_warm_lookups(c: &mut Criterion) {
    let leaf = leaf();
    let runtime = fresh_runtime();
    let app = runtime
        .create_loader("app", runtime.bootstrap(), MemorySource::new())
        .unwrap();
    let record = runtime.entry_point(&app, &leaf).unwrap();

    c.bench_function("warm_load_through_child", |b| {
        b.iter(|| {
            let found = runtime.load_type(&app, black_box(&leaf)).unwrap();
            black_box(found)
        });
    });

    c.bench_function("warm_ensure_initialized", |b| {
        b.iter(|| runtime.ensure_initialized(black_box(&record)).unwrap());
    });

    c.bench_function("warm_resolve", |b| {
        b.iter(|| {
            let binding = runtime.resolve(&record, black_box(1)).unwrap();
            black_box(binding)
        });
    });
}

criterion_group!(benches, bench_decode, bench_pipeline, bench_warm_lookups);
criterion_main!(benches);
