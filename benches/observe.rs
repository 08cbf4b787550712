//! Benchmarks for spark-observe
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use spark_observe::{EffectOptions, Field, Runtime, cloned, field};

struct Cell3 {
    a: i32,
    b: i32,
    c: i32,
}

const A: Field<Cell3, i32> = field!(Cell3, a);
const B: Field<Cell3, i32> = field!(Cell3, b);
const C: Field<Cell3, i32> = field!(Cell3, c);

fn cell(rt: &Runtime) -> spark_observe::Observed<Cell3> {
    rt.observe(Cell3 { a: 0, b: 0, c: 0 })
}

// =============================================================================
// RECORD BENCHMARKS
// =============================================================================

fn bench_observe_create(c: &mut Criterion) {
    let rt = Runtime::new();
    c.bench_function("observe_create", |b| b.iter(|| black_box(cell(&rt))));
}

fn bench_untracked_get(c: &mut Criterion) {
    let rt = Runtime::new();
    let record = cell(&rt);
    c.bench_function("untracked_get", |b| b.iter(|| black_box(record.get(&A))));
}

fn bench_set_without_subscribers(c: &mut Criterion) {
    let rt = Runtime::new();
    let record = cell(&rt);
    c.bench_function("set_without_subscribers", |b| {
        b.iter(|| record.set(&A, black_box(42)))
    });
}

// =============================================================================
// EFFECT BENCHMARKS
// =============================================================================

fn bench_effect_register(c: &mut Criterion) {
    let rt = Runtime::new();
    let record = cell(&rt);
    c.bench_function("effect_register", |b| {
        b.iter(|| {
            black_box(
                rt.register_effect(cloned!(record => move || {
                    let _ = record.get(&A) + record.get(&B) + record.get(&C);
                }))
                .ok(),
            )
        })
    });
}

fn bench_write_and_flush(c: &mut Criterion) {
    let rt = Runtime::new();
    let record = cell(&rt);
    let _effect = rt
        .register_effect(cloned!(record => move || {
            black_box(record.get(&A));
        }))
        .ok();

    let mut i = 0;
    c.bench_function("write_and_flush", |b| {
        b.iter(|| {
            i += 1;
            record.set(&A, i);
            rt.tick()
        })
    });
}

fn bench_batched_writes(c: &mut Criterion) {
    let rt = Runtime::new();
    let record = cell(&rt);
    let _effect = rt
        .register_effect(cloned!(record => move || {
            black_box(record.get(&A) + record.get(&B) + record.get(&C));
        }))
        .ok();

    c.bench_function("batched_writes_one_flush", |b| {
        b.iter(|| {
            for n in 0..10 {
                record.set(&A, n);
                record.set(&B, n);
                record.set(&C, n);
            }
            rt.tick()
        })
    });
}

fn bench_dispatched_write(c: &mut Criterion) {
    let rt = Runtime::new();
    let record = cell(&rt);
    let options = EffectOptions::new().dispatch(|runnable| {
        let _ = runnable.run();
    });
    let _effect = rt
        .register_effect_with(
            cloned!(record => move || {
                black_box(record.get(&A));
            }),
            options,
        )
        .ok();

    c.bench_function("dispatched_write", |b| {
        b.iter(|| record.set(&A, black_box(1)))
    });
}

// =============================================================================
// STRESS BENCHMARKS
// =============================================================================

fn bench_many_effects(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for count in [10, 100, 1000] {
        let rt = Runtime::new();
        let record = cell(&rt);
        let effects: Vec<_> = (0..count)
            .filter_map(|_| {
                rt.register_effect(cloned!(record => move || {
                    black_box(record.get(&A));
                }))
                .ok()
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                record.update(&A, |n| *n += 1);
                rt.tick()
            })
        });
        drop(effects);
    }
    group.finish();
}

criterion_group!(
    record_benches,
    bench_observe_create,
    bench_untracked_get,
    bench_set_without_subscribers,
);

criterion_group!(
    effect_benches,
    bench_effect_register,
    bench_write_and_flush,
    bench_batched_writes,
    bench_dispatched_write,
);

criterion_group!(stress_benches, bench_many_effects);

criterion_main!(record_benches, effect_benches, stress_benches);
