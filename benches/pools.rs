//! Benchmarks for the pools and the resource layer against the dummy device.
//!
//! Run with: cargo bench --bench pools

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use framepool::{
    diagnostics, BufferPool, DummyDevice, GpuDevice, ImageMemoryPool, MemoryPropertyFlags, MemoryRequirements,
    PoolConfig, RenderResources, Vertex,
};

fn bench_buffer_pool(c: &mut Criterion) {
    diagnostics::suppress_diagnostics(true);
    let device = Arc::new(DummyDevice::new());
    let mut pool = BufferPool::new(device.clone(), device.memory_properties(), BufferPool::DEFAULT_CHUNK_SIZE);

    let mut group = c.benchmark_group("buffer_pool");

    group.bench_function("allocate_free_1kb", |b| {
        b.iter(|| {
            let alloc = pool.allocate(1024, 16).unwrap();
            black_box(alloc);
            pool.free(&alloc);
        })
    });

    group.finish();
}

fn bench_image_pool(c: &mut Criterion) {
    diagnostics::suppress_diagnostics(true);
    let device = Arc::new(DummyDevice::new());
    let mut pool = ImageMemoryPool::new(
        device.clone(),
        device.memory_properties(),
        device.buffer_image_granularity(),
        ImageMemoryPool::DEFAULT_PAGE_SIZE,
    );
    let req = MemoryRequirements {
        size: 64 * 64 * 4,
        alignment: 1024,
        memory_type_bits: u32::MAX,
    };

    let mut group = c.benchmark_group("image_pool");

    group.bench_function("allocate_free_64x64", |b| {
        b.iter(|| {
            let alloc = pool.allocate(&req, MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
            black_box(alloc);
            pool.free(&alloc);
        })
    });

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    diagnostics::suppress_diagnostics(true);
    let device = Arc::new(DummyDevice::new());
    let mut resources = RenderResources::new(device, PoolConfig::default()).unwrap();
    let colour = [255, 255, 255, 255];
    let vertices: Vec<Vertex> = (0..64)
        .map(|i| Vertex::new([i as f32, 0.0], colour, [0.0, 0.0]))
        .collect();
    let indices: Vec<u32> = (0..96).map(|i| i % 64).collect();
    let pixels = vec![0x7f; 16 * 16 * 4];

    let mut group = c.benchmark_group("render_resources");

    // One UI frame: 50 geometry batches and 4 texture uploads, released and collected
    group.bench_function("frame_50_geometry_4_textures", |b| {
        b.iter(|| {
            resources.begin_frame();
            let geometry: Vec<_> = (0..50)
                .map(|_| resources.compile_geometry(&vertices, &indices).unwrap())
                .collect();
            let textures: Vec<_> = (0..4)
                .map(|_| resources.generate_texture(&pixels, 16, 16).unwrap())
                .collect();
            resources.end_frame();

            for handle in geometry {
                resources.release_geometry(handle);
            }
            for handle in textures {
                resources.release_texture(handle);
            }
            resources.collect_garbage();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_buffer_pool, bench_image_pool, bench_frame);
criterion_main!(benches);
