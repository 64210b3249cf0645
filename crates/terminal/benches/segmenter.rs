//! Criterion benchmarks for the output capture hot path.
//!
//! Run with: `cargo bench -p terminal`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write;

use terminal::ansi;
use terminal::LineSegmenter;

/// Colored `ls -l` style output, roughly what a busy build log looks like.
fn colored_listing(lines: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..lines {
        let _ = write!(
            out,
            "-rw-r--r--  1 user staff  {:>6} Oct 16 12:{:02} \x1b[01;34mfile_{i}.rs\x1b[0m\r\n",
            i * 37,
            i % 60
        );
    }
    out.into_bytes()
}

// ============================================================================
// Escape stripping
// ============================================================================

fn bench_strip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ansi_strip");

    let cases = [
        ("plain", "Compiling earshot v0.1.0 (/home/user/earshot)".to_string()),
        (
            "sgr_heavy",
            "\x1b[1;32m   Compiling\x1b[0m \x1b[36mearshot\x1b[0m v0.1.0".repeat(4),
        ),
        ("osc_title", "\x1b]0;user@host: ~/src\x07user@host:~/src$ ".to_string()),
    ];

    for (name, text) in &cases {
        group.bench_with_input(BenchmarkId::new("strip", name), text, |b, text| {
            b.iter(|| ansi::strip(black_box(text)))
        });
    }
    group.finish();
}

fn bench_pad_to_exact_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("pad_to_exact_width");
    let line = "warning: unused variable `segmenter` 日本語 in crates/terminal/src/segmenter.rs";

    for width in [20usize, 80, 200] {
        group.bench_with_input(BenchmarkId::new("pad", width), &width, |b, &width| {
            b.iter(|| ansi::pad_to_exact_width(black_box(line), width))
        });
    }
    group.finish();
}

// ============================================================================
// Line segmentation
// ============================================================================

fn bench_segmenter(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmenter");
    let data = colored_listing(1000);
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("single_chunk", |b| {
        b.iter(|| {
            let mut segmenter = LineSegmenter::new();
            black_box(segmenter.feed(black_box(&data)))
        })
    });

    // PTY reads typically arrive in 4 KiB pieces that split lines.
    group.bench_function("4k_chunks", |b| {
        b.iter(|| {
            let mut segmenter = LineSegmenter::new();
            let mut lines = 0;
            for chunk in data.chunks(4096) {
                lines += segmenter.feed(black_box(chunk)).len();
            }
            black_box(lines)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_strip, bench_pad_to_exact_width, bench_segmenter);
criterion_main!(benches);
