//! Throughput benchmarks for `SkipMap`, in the spirit of the teacher's
//! `bin/bench_criterion.rs` timing harness but on the modern `criterion`
//! API rather than inline `rdtsc` assembly.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use epoch_reclaim::collector::Collector;
use epoch_reclaim::skiplist::SkipMap;

const COUNT: u64 = 10_000;

fn insert_sequential(c: &mut Criterion) {
    c.bench_function("skiplist insert sequential", |b| {
        b.iter(|| {
            let collector = Collector::new();
            let map = SkipMap::<u64, u64>::new(&collector);
            let handle = collector.enter();
            for i in 0..COUNT {
                map.insert(black_box(i), i, &handle);
            }
        });
    });
}

fn lookup_hit(c: &mut Criterion) {
    let collector = Collector::new();
    let map = SkipMap::<u64, u64>::new(&collector);
    {
        let handle = collector.enter();
        for i in 0..COUNT {
            map.insert(i, i, &handle);
        }
    }

    c.bench_function("skiplist lookup hit", |b| {
        let handle = collector.enter();
        b.iter(|| {
            for i in 0..COUNT {
                black_box(map.lookup(&i, &handle));
            }
        });
    });
}

fn insert_remove_churn(c: &mut Criterion) {
    c.bench_function("skiplist insert/remove churn", |b| {
        let collector = Collector::new();
        let map = SkipMap::<u64, u64>::new(&collector);
        let handle = collector.enter();
        b.iter(|| {
            for i in 0..COUNT {
                map.insert(i, i, &handle);
            }
            for i in 0..COUNT {
                black_box(map.remove(&i, &handle));
            }
        });
    });
}

criterion_group!(benches, insert_sequential, lookup_hit, insert_remove_churn);
criterion_main!(benches);
