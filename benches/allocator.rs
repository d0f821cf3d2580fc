//! Benchmarks for the free-list allocator.
//!
//! Run with: cargo bench --bench allocator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use framepool::{kb, mb, FreeListAllocator};

fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_list");

    group.bench_function("alloc_free_64b", |b| {
        let mut allocator = FreeListAllocator::with_capacity(mb(2));
        b.iter(|| {
            let alloc = allocator.allocate(64, 16).unwrap();
            black_box(alloc);
            allocator.free(alloc.offset, alloc.size);
        })
    });

    group.bench_function("alloc_100x_then_free", |b| {
        let mut allocator = FreeListAllocator::with_capacity(mb(2));
        b.iter(|| {
            let mut allocs = Vec::with_capacity(100);
            for i in 0..100u64 {
                allocs.push(allocator.allocate(64 + i * 8, 16).unwrap());
            }
            for alloc in allocs {
                allocator.free(alloc.offset, alloc.size);
            }
        })
    });

    group.finish();
}

fn bench_fragmented(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_list_fragmented");

    // Every other allocation freed: the free list holds `holes` blocks
    for holes in [16u64, 128, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(holes), &holes, |b, &holes| {
            let mut allocator = FreeListAllocator::with_capacity(holes * kb(1) * 2 + kb(64));
            let allocs: Vec<_> = (0..holes * 2).map(|_| allocator.allocate(kb(1), 16).unwrap()).collect();
            for alloc in allocs.iter().step_by(2) {
                allocator.free(alloc.offset, alloc.size);
            }

            // Too big for any hole: walks the whole list
            b.iter(|| {
                let alloc = allocator.allocate(kb(2), 16).unwrap();
                black_box(alloc);
                allocator.free(alloc.offset, alloc.size);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_alloc_free, bench_fragmented);
criterion_main!(benches);
