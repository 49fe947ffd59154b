//! Benchmarks for tracked writes, batched delivery and reconciliation.
//!
//! Run with: cargo bench -p trellis-core --bench reactivity

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use trellis_core::reactive::{watch, watch_effect, Depend, Reactive, Ref, Value};
use trellis_core::render::{h, MemoryBackend, Reconciler, VNode};
use trellis_core::{flush_microtasks, AppOptions, WatchOptions};

fn bench_tracked_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("reactive/collect");

    for fields in [4usize, 32, 256] {
        let state = Reactive::record((0..fields).map(|i| (format!("f{i}"), Value::from(i))));
        let keys: Vec<String> = (0..fields).map(|i| format!("f{i}")).collect();
        group.throughput(Throughput::Elements(fields as u64));
        group.bench_with_input(BenchmarkId::new("reads", fields), &(), |b, _| {
            b.iter(|| {
                let ((), deps) = Depend::collect(|| {
                    for key in &keys {
                        black_box(state.get(key));
                    }
                });
                black_box(deps.len())
            })
        });
    }

    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("reactive/batched");

    for writes in [1usize, 16, 128] {
        let count = Ref::new(0);
        let calls = Rc::new(Cell::new(0u64));
        let sink = calls.clone();
        let _listener = watch(&count, move |_| sink.set(sink.get() + 1), WatchOptions::default())
            .expect("a cell is always watchable");

        group.throughput(Throughput::Elements(writes as u64));
        group.bench_with_input(BenchmarkId::new("writes_then_flush", writes), &(), |b, _| {
            let mut n = 0i64;
            b.iter(|| {
                for _ in 0..writes {
                    n += 1;
                    count.set(n);
                }
                flush_microtasks();
            })
        });
        black_box(calls.get());
    }

    group.finish();
}

fn bench_effect_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("reactive/fan_out");

    for effects in [8usize, 64] {
        let source = Ref::new(0);
        let listeners: Vec<_> = (0..effects)
            .filter_map(|_| {
                let reader = source.clone();
                watch_effect(
                    move || {
                        black_box(reader.get());
                    },
                    WatchOptions::immediate(),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("immediate_effects", effects), &(), |b, _| {
            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                source.set(n);
            })
        });
        drop(listeners);
    }

    group.finish();
}

fn row_list(rows: usize, shift: usize) -> VNode {
    h("ul").children((0..rows).map(|i| {
        h("li")
            .prop("class", if (i + shift) % 3 == 0 { "odd" } else { "even" })
            .child(format!("row {}", i + shift))
    }))
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/patch");

    for rows in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let backend = Rc::new(MemoryBackend::new());
            let root = backend.create_root();
            let mut reconciler = Reconciler::new(backend.clone(), AppOptions::default());
            let mut tree = row_list(rows, 0);
            let node = reconciler.create(&mut tree);
            backend.append_child(root, node);

            let mut shift = 0;
            let mut current = Some(tree);
            b.iter(|| {
                shift += 1;
                if let Some(old) = current.take() {
                    current = Some(reconciler.patch(old, row_list(rows, shift)));
                }
                backend.take_ops();
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tracked_reads,
    bench_batched_writes,
    bench_effect_fan_out,
    bench_reconcile,
);

criterion_main!(benches);
