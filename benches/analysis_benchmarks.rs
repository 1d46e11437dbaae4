//! Benchmarks comparing the product-generation backends
//!
//! The fixture is a ladder of 2-of-3 combination gates, which exercises
//! at-least normalization, module detection, and diagram growth.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cutset_logic::{Algorithm, FaultTreeAnalysis, Model, Settings};

/// A chain of 2-of-3 gates, each feeding the next level.
fn ladder_text(levels: usize) -> String {
    let mut text = format!("top := g{}\n", levels - 1);
    text.push_str("g0 := @(2, [b0, b1, b2])\n");
    for level in 1..levels {
        text.push_str(&format!(
            "g{} := @(2, [g{}, b{}, b{}])\n",
            level,
            level - 1,
            2 * level + 1,
            2 * level + 2
        ));
    }
    for event in 0..(2 * levels + 1) {
        text.push_str(&format!("p(b{}) = 0.01\n", event));
    }
    text
}

fn run_analysis(model: &Model, algorithm: Algorithm) -> usize {
    let mut settings = Settings::default();
    settings.algorithm(algorithm).unwrap();
    let mut analysis = FaultTreeAnalysis::new(model, "top", settings).unwrap();
    analysis.analyze().unwrap();
    analysis.products().len()
}

fn bench_backends(c: &mut Criterion) {
    let model = Model::parse(&ladder_text(6)).unwrap();
    let mut group = c.benchmark_group("ladder-2of3");
    group.bench_function("bdd", |b| {
        b.iter(|| run_analysis(black_box(&model), Algorithm::Bdd))
    });
    group.bench_function("zbdd", |b| {
        b.iter(|| run_analysis(black_box(&model), Algorithm::Zbdd))
    });
    group.bench_function("mocus", |b| {
        b.iter(|| run_analysis(black_box(&model), Algorithm::Mocus))
    });
    group.finish();
}

fn bench_parsing(c: &mut Criterion) {
    let text = ladder_text(12);
    c.bench_function("parse-ladder", |b| {
        b.iter(|| Model::parse(black_box(&text)).unwrap())
    });
}

criterion_group!(benches, bench_backends, bench_parsing);
criterion_main!(benches);
