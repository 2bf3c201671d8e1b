//! # Handle Pool and Arena Benchmark
//!
//! Run with: `cargo bench --package walrus_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use walrus_core::{HandleAllocator, TransientArena};

/// Benchmark: fill and drain a pool.
fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_alloc_free");

    for capacity in [256u16, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let mut pool = HandleAllocator::new(capacity);
                let mut live = Vec::with_capacity(usize::from(capacity));
                b.iter(|| {
                    while let Some(h) = pool.alloc() {
                        live.push(h);
                    }
                    for h in live.drain(..) {
                        pool.free(black_box(h));
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: one frame worth of transient vertex grants.
fn bench_arena(c: &mut Criterion) {
    c.bench_function("transient_arena_1k_grants", |b| {
        let mut arena = TransientArena::new(6 << 20);
        b.iter(|| {
            arena.reset();
            for i in 0..1_000u32 {
                black_box(arena.alloc_strided(64 + i % 7, 32));
            }
        });
    });
}

criterion_group!(benches, bench_alloc_free, bench_arena);
criterion_main!(benches);
