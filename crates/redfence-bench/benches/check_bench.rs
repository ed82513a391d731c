//! Hot-path micro-benchmarks: the per-access check (fast and slow path)
//! and the allocator round-trip.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redfence_core::{RuntimeConfig, Runtime};

fn bench_check_paths(c: &mut Criterion) {
    let rt = Runtime::new(RuntimeConfig::buckets()).expect("runtime");
    let alloc = rt.alloc_guarded(64).expect("alloc");
    let user = alloc.addr();

    let mut group = c.benchmark_group("check");
    group.bench_function("fast_path_in_bounds", |b| {
        b.iter(|| rt.check(black_box(user + 8), black_box(4)))
    });
    group.bench_function("slow_path_band_hit", |b| {
        b.iter(|| rt.check(black_box(user + 64), black_box(1)))
    });
    group.finish();

    let slow_only = {
        let mut config = RuntimeConfig::buckets();
        config.fast_check = false;
        Runtime::new(config).expect("runtime")
    };
    let slow_alloc = slow_only.alloc_guarded(64).expect("alloc");
    let slow_user = slow_alloc.addr();
    c.bench_function("check/slow_only_in_bounds", |b| {
        b.iter(|| slow_only.check(black_box(slow_user + 8), black_box(4)))
    });
}

fn bench_allocator_round_trip(c: &mut Criterion) {
    let rt = Runtime::new(RuntimeConfig::buckets()).expect("runtime");
    let mut group = c.benchmark_group("allocator");
    for size in [16usize, 256, 8192] {
        group.bench_function(format!("malloc_free_{size}"), |b| {
            b.iter(|| {
                let p = rt.malloc(black_box(size));
                rt.free(black_box(p));
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_check_paths, bench_allocator_round_trip);
criterion_main!(benches);
