//! Performance benchmarks for the ZeroBlur stacking pipeline
//!
//! Run with: cargo bench
//!
//! These benchmarks measure pyramid, alignment and end-to-end stacking cost
//! to establish baseline metrics and detect performance regressions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use zeroblur::focus_stack::align::{estimate_transform, prepare_working_image};
use zeroblur::focus_stack::merge::fuse_pyramids;
use zeroblur::focus_stack::progress::NullSink;
use zeroblur::focus_stack::pyramid::LaplacianPyramid;
use zeroblur::focus_stack::reconstruct::collapse_to_frame;
use zeroblur::focus_stack::{stack_frames, FocusStackConfig};
use zeroblur::testing::{focus_burst, shifted_frame, textured_frame};

fn bench_pyramid(c: &mut Criterion) {
    let mut group = c.benchmark_group("Laplacian Pyramid");

    let resolutions = [(640, 480, "480p"), (1280, 720, "720p")];

    for (width, height, name) in resolutions {
        let frame = textured_frame(width, height, 0).unwrap();
        group.throughput(Throughput::Elements((width * height) as u64));

        group.bench_with_input(BenchmarkId::new("build", name), &frame, |b, frame| {
            b.iter(|| LaplacianPyramid::build(black_box(frame), 5));
        });

        let pyramid = LaplacianPyramid::build(&frame, 5);
        group.bench_with_input(BenchmarkId::new("collapse", name), &pyramid, |b, pyramid| {
            b.iter(|| collapse_to_frame(black_box(pyramid)));
        });
    }

    group.finish();
}

fn bench_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pyramid Fusion");

    for frames in [3usize, 5, 9] {
        let pyramids: Vec<LaplacianPyramid> = focus_burst(640, 480, frames, frames / 2)
            .unwrap()
            .iter()
            .map(|f| LaplacianPyramid::build(f, 5))
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(frames),
            &pyramids,
            |b, pyramids| {
                b.iter(|| fuse_pyramids(black_box(pyramids)).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_alignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("ECC Alignment");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let reference = textured_frame(320, 240, 1).unwrap();
    let moved = shifted_frame(&reference, 3, -2);
    let template = prepare_working_image(&reference, 1.0);
    let input = prepare_working_image(&moved, 1.0);

    group.bench_function("estimate_320x240", |b| {
        b.iter(|| estimate_transform(black_box(&template), black_box(&input), 50, 1e-3));
    });

    group.finish();
}

fn bench_full_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("Full Stack");
    group.measurement_time(Duration::from_secs(15));
    group.sample_size(10);

    let burst = focus_burst(640, 480, 5, 2).unwrap();
    for (label, enable_alignment) in [("aligned", true), ("unaligned", false)] {
        let config = FocusStackConfig {
            enable_alignment,
            ..Default::default()
        };
        group.bench_function(label, |b| {
            b.iter(|| stack_frames(burst.clone(), black_box(&config), &mut NullSink).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pyramid,
    bench_fusion,
    bench_alignment,
    bench_full_stack
);
criterion_main!(benches);
