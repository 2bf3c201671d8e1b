//! # Submission Benchmark
//!
//! Measures the application-side cost of recording draws and the cost of
//! sorting and executing a frame against the headless backend.
//!
//! Run with: `cargo bench --package walrus_rhi`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Mat4;
use walrus_rhi::{
    radix_sort, AttribType, BufferFlags, DiscardFlags, DrawOrder, HeadlessBackend,
    ProgramHandle, RhiConfig, RhiContext, ShaderType, SortKey, SortKind, VertexLayout,
    ViewOrder,
};

fn setup() -> (RhiContext, Vec<ProgramHandle>) {
    let mut rhi =
        RhiContext::new(RhiConfig::single_threaded(), Box::new(HeadlessBackend::new()))
            .unwrap();
    let programs = (0..16)
        .map(|i| {
            let vs = rhi
                .create_shader(ShaderType::Vertex, &format!("// {i}\nvoid vs_main() {{}}"))
                .unwrap();
            let fs = rhi
                .create_shader(ShaderType::Fragment, &format!("// {i}\nvoid fs_main() {{}}"))
                .unwrap();
            rhi.create_program(&[vs, fs], true).unwrap()
        })
        .collect();
    (rhi, programs)
}

/// Benchmark: record and execute N draws per frame.
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_draws");

    for draws in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(draws), &draws, |b, &draws| {
            let (mut rhi, programs) = setup();
            let layout = VertexLayout::begin().add(3, AttribType::Float, false).end();
            let layout = rhi.create_vertex_layout(&layout).unwrap();
            let vertices = rhi.create_buffer(&[0u8; 36 * 64], BufferFlags::empty()).unwrap();
            let transform = [Mat4::IDENTITY];

            b.iter(|| {
                for i in 0..draws {
                    let program = programs[(i % 16) as usize];
                    rhi.set_transform(&transform);
                    rhi.set_vertex_buffer(0, vertices, layout, 0, Some(3));
                    rhi.submit((i % 4) as u8, program, black_box(i * 7919), DiscardFlags::ALL);
                }
                rhi.frame().unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark: radix sort of a frame's keys.
fn bench_radix_sort(c: &mut Criterion) {
    let order = ViewOrder::identity();
    let keys: Vec<u64> = (0..65_536u32)
        .map(|i| {
            SortKey {
                view: (i % 8) as u8,
                program: ProgramHandle((i.wrapping_mul(2_654_435_761) % 511) as u16),
                kind: SortKind::Draw(DrawOrder::Default {
                    blend: (i % 3) as u8,
                    depth: i.wrapping_mul(40_503),
                }),
            }
            .encode(&order)
        })
        .collect();

    c.bench_function("radix_sort_64k", |b| {
        let mut tmp_keys = vec![0u64; keys.len()];
        let mut tmp_values = vec![0u32; keys.len()];
        b.iter(|| {
            let mut sorted = keys.clone();
            let mut values: Vec<u32> = (0..keys.len() as u32).collect();
            radix_sort(&mut sorted, &mut values, &mut tmp_keys, &mut tmp_values);
            black_box(sorted)
        });
    });
}

criterion_group!(benches, bench_frame, bench_radix_sort);
criterion_main!(benches);
