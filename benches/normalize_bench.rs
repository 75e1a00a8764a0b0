use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mapi_stream::NormalizeCrLf;

fn rows(count: usize, line_ending: &str) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..count {
        data.extend_from_slice(format!("{i}|value {i}|2024-01-01{line_ending}").as_bytes());
    }
    data
}

fn bench_normalize(c: &mut Criterion) {
    let crlf = rows(10_000, "\r\n");
    let lf = rows(10_000, "\n");

    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Bytes(crlf.len() as u64));
    group.bench_function("crlf_input", |b| {
        b.iter(|| {
            let mut out = NormalizeCrLf::new(Vec::with_capacity(crlf.len()));
            out.write_all(black_box(&crlf)).unwrap();
            black_box(out.finish().unwrap())
        })
    });
    group.throughput(Throughput::Bytes(lf.len() as u64));
    group.bench_function("lf_passthrough", |b| {
        b.iter(|| {
            let mut out = NormalizeCrLf::new(Vec::with_capacity(lf.len()));
            out.write_all(black_box(&lf)).unwrap();
            black_box(out.finish().unwrap())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
