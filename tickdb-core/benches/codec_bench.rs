use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tickdb_core::compression::{bitpack, decimal, pfor, time, SUPER_BLOCK};
use tickdb_core::Px;

fn times(n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(1);
    let mut t = 1_600_000_000_000_000_000u64;
    (0..n)
        .map(|_| {
            t += rng.gen_range(0..2_000_000);
            t
        })
        .collect()
}

fn prices(n: usize) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(2);
    let mut px = 1.1f32;
    (0..n)
        .map(|_| {
            px += rng.gen_range(-5i32..=5) as f32 * 0.00001;
            Px::from_f32(px).to_bits()
        })
        .collect()
}

fn bench_bitpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitpack");
    let mut rng = StdRng::seed_from_u64(3);
    for width in [3u32, 17, 40] {
        let values: Vec<u64> = (0..SUPER_BLOCK)
            .map(|_| rng.gen::<u64>() & ((1u64 << width) - 1))
            .collect();
        group.throughput(Throughput::Elements(values.len() as u64));
        group.bench_with_input(BenchmarkId::new("pack", width), &values, |b, v| {
            b.iter(|| {
                let mut out = Vec::new();
                bitpack::pack(&mut out, black_box(v), width)
            })
        });
    }
    group.finish();
}

fn bench_pfor(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(4);
    let values: Vec<u64> = (0..SUPER_BLOCK)
        .map(|i| if i % 61 == 0 { rng.gen() } else { rng.gen_range(0..64) })
        .collect();
    let mut encoded = Vec::new();
    pfor::encode(&mut encoded, &values);

    let mut group = c.benchmark_group("pfor");
    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            pfor::encode(&mut out, black_box(&values))
        })
    });
    group.bench_function("decode", |b| {
        let mut out = vec![0u64; values.len()];
        b.iter(|| pfor::decode(&mut out, black_box(&encoded)))
    });
    group.finish();
}

fn bench_columns(c: &mut Criterion) {
    let ts = times(SUPER_BLOCK);
    let px = prices(SUPER_BLOCK);

    let mut group = c.benchmark_group("columns");
    group.throughput(Throughput::Elements(SUPER_BLOCK as u64));
    group.bench_function("time_encode", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            time::encode(&mut out, black_box(&ts))
        })
    });
    group.bench_function("decimal32_encode", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            decimal::encode32(&mut out, black_box(&px))
        })
    });

    let mut encoded = Vec::new();
    decimal::encode32(&mut encoded, &px);
    group.bench_function("decimal32_decode", |b| {
        let mut out = vec![0u32; px.len()];
        b.iter(|| decimal::decode32(&mut out, black_box(&encoded)))
    });
    group.finish();
}

criterion_group!(benches, bench_bitpack, bench_pfor, bench_columns);
criterion_main!(benches);
