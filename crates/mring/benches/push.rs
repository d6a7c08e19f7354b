//! Benchmark for steady-state push throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use mring::Ring;

fn benchmark_push(c: &mut Criterion) {
    let name = format!("/mring-bench-{}", std::process::id());
    let mut ring: Ring<u64> = Ring::create(&name, 64 * 1024).unwrap();

    c.bench_function("push", |b| {
        let mut value = 0u64;
        b.iter(|| {
            value += 1;
            ring.push(value).unwrap();
        });
    });

    let run: Vec<u64> = (0..1024).collect();
    c.bench_function("push_values 1024", |b| {
        b.iter(|| {
            ring.push_values(&run).unwrap();
        });
    });
}

criterion_group!(benches, benchmark_push);
criterion_main!(benches);
