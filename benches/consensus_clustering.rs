//! Consensus Analyzer (C4, spec §4.4) clustering throughput.
//!
//! Run with: cargo bench --bench consensus_clustering

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use motif::consensus::color;
use motif::consensus::{analyze, analyze_with_tokens};
use motif::css::observations::{Observation, Observations};
use motif::model::TokenCategory;

fn synthetic_colors(count: usize, distinct: usize) -> Vec<Observation> {
    (0..count)
        .map(|i| {
            let hue = (i % distinct) as u32;
            let r = (hue * 37 % 256) as u8;
            let g = (hue * 59 % 256) as u8;
            let b = (hue * 83 % 256) as u8;
            Observation {
                raw_value: format!("#{r:02x}{g:02x}{b:02x}"),
                usage: 1.0 + (i % 5) as f64,
                origin_sha: "bench".to_string(),
            }
        })
        .collect()
}

fn synthetic_observations(count: usize, distinct_colors: usize) -> Observations {
    let mut obs = Observations::default();
    for o in synthetic_colors(count, distinct_colors) {
        obs.push(TokenCategory::Color, o.raw_value, o.usage, &o.origin_sha);
    }
    for i in 0..count / 4 {
        let px = 4 * (1 + i % 12);
        obs.push(TokenCategory::Dimension, format!("{px}px"), 1.0, "bench");
    }
    obs
}

fn bench_color_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("color_clustering");
    for &(count, distinct) in &[(200usize, 8usize), (2_000, 32), (20_000, 128)] {
        let observations = synthetic_colors(count, distinct);
        group.bench_with_input(BenchmarkId::from_parameter(count), &observations, |b, observations| {
            b.iter(|| black_box(color::analyze(observations)));
        });
    }
    group.finish();
}

fn bench_full_document_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_document_assembly");
    group.sample_size(20);
    for &count in &[1_000usize, 10_000, 50_000] {
        let observations = synthetic_observations(count, count.min(64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &observations, |b, observations| {
            b.iter(|| black_box(analyze(observations)));
        });
    }
    group.finish();
}

fn bench_with_sampling_cap(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_document_assembly_with_cap");
    let mut observations = synthetic_observations(60_000, 256);
    observations.enforce_caps();
    group.bench_function("60k_observations_capped", |b| {
        b.iter(|| black_box(analyze_with_tokens(&observations)));
    });
    group.finish();
}

criterion_group!(benches, bench_color_clustering, bench_full_document_assembly, bench_with_sampling_cap);
criterion_main!(benches);
