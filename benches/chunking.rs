use code_doc_helper::embeddings::chunking::{DEFAULT_CHUNK_SIZE, chunk_text};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::path::Path;

fn synthetic_source(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("    let value_{i} = compute({i}) * {};\r", i % 7))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let source = synthetic_source(20_000);
    let path = Path::new("src/generated.rs");

    c.bench_function("chunking", |b| {
        b.iter(|| {
            chunk_text(
                black_box(&source),
                black_box(DEFAULT_CHUNK_SIZE),
                "generated.rs",
                path,
            )
        })
    });
    c.bench_function("chunking_small_windows", |b| {
        b.iter(|| chunk_text(black_box(&source), black_box(10), "generated.rs", path))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
