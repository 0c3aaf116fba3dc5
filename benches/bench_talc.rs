#![allow(
    clippy::string_slice,
    clippy::tests_outside_test_module,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    reason = "benchmark"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use talc::Compiler;

mod utils;

fn talc_benchmark(c: &mut Criterion) {
    // Generate 100 random template sources
    let templates = utils::generate_templates(100);

    // Print binary size information
    utils::print_binary_size();

    // Setup benchmark group
    let mut group = c.benchmark_group("Template Compilation");
    group.sample_size(50);

    // Benchmark template compilation; one compiler across the batch so the
    // expression memo behaves as it would in a real build.
    group.bench_function("talc_compile", |b| {
        b.iter(|| {
            let mut compiler = Compiler::new();
            for template in &templates {
                black_box(compiler.compile(template).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, talc_benchmark);
criterion_main!(benches);
