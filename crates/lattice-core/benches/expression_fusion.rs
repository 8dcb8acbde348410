//! Fused expression assignment against the same arithmetic evaluated one
//! operator at a time through temporaries

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lattice_core::{mul_add, Context, DispatchConfig, FlatGrid, HostBackend, Lattice, Parity};

fn even(ctx: &std::sync::Arc<Context<HostBackend>>, grid: &lattice_core::GridRef, seed: f32) -> Lattice<f32, HostBackend> {
    let data: Vec<f32> = (0..grid.osites()).map(|i| seed + i as f32 * 1e-3).collect();
    let mut lattice = Lattice::from_slice(ctx, grid, &data).unwrap();
    lattice.set_checkerboard(Parity::Even);
    lattice
}

/// Benchmark `a * b + d` fused vs through a temporary
fn bench_axpy(c: &mut Criterion) {
    let mut group = c.benchmark_group("a_times_b_plus_d");
    let ctx = Context::new(HostBackend::new()).unwrap();

    let sizes = vec![1 << 10, 1 << 14, 1 << 18, 1 << 20];

    for n in sizes {
        group.throughput(Throughput::Elements(n as u64));
        let grid = FlatGrid::shared(n);
        let a = even(&ctx, &grid, 1.0);
        let b = even(&ctx, &grid, 2.0);
        let d = even(&ctx, &grid, 3.0);

        group.bench_with_input(BenchmarkId::new("fused", n), &n, |bencher, _| {
            let mut out = Lattice::<f32, _>::new(&ctx, &grid);
            bencher.iter(|| out.assign(&a * &b + &d));
        });

        group.bench_with_input(BenchmarkId::new("mul_add", n), &n, |bencher, _| {
            let mut out = Lattice::<f32, _>::new(&ctx, &grid);
            bencher.iter(|| out.assign(mul_add(&a, &b, &d)));
        });

        group.bench_with_input(BenchmarkId::new("unfused", n), &n, |bencher, _| {
            let mut tmp = Lattice::<f32, _>::new(&ctx, &grid);
            let mut out = Lattice::<f32, _>::new(&ctx, &grid);
            bencher.iter(|| {
                tmp.assign(&a * &b);
                out.assign(&tmp + &d);
            });
        });
    }

    group.finish();
}

/// Benchmark streaming vs regular stores on the fused path
fn bench_streaming_stores(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_stores");
    let n = 1 << 20;
    group.throughput(Throughput::Elements(n as u64));

    for streaming in [true, false] {
        let config = DispatchConfig::default().with_streaming_stores(streaming);
        let ctx = Context::with_config(HostBackend::new(), config).unwrap();
        let grid = FlatGrid::shared(n);
        let a = even(&ctx, &grid, 1.0);
        let b = even(&ctx, &grid, 2.0);

        group.bench_with_input(BenchmarkId::new("streaming", streaming), &streaming, |bencher, _| {
            let mut out = Lattice::<f32, _>::new(&ctx, &grid);
            bencher.iter(|| out.assign(&a - &b * 0.5f32));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_axpy, bench_streaming_stores);
criterion_main!(benches);
