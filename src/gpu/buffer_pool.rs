//! Host-visible buffer pool for UI geometry.
//!
//! The pool owns a growing list of fixed-size chunks. Each chunk is one
//! device buffer (vertex + index usage) bound to its own host-visible,
//! host-coherent memory, mapped once for the chunk's whole lifetime, and
//! subdivided by a [`FreeListAllocator`].
//!
//! Chunks are created lazily, one at a time, and only destroyed at
//! [`shutdown`](BufferPool::shutdown). There is no oversized path: a request
//! larger than the chunk size fails up front.

use std::fmt;
use std::sync::Arc;

use super::error::PoolError;
use super::memory::{BufferUsage, MemoryProperties, MemoryPropertyFlags};
use super::traits::{BufferHandle, GpuDevice, MemoryHandle};
use crate::allocators::free_list::FreeListAllocator;
use crate::api::stats::PoolStats;
use crate::diagnostics::macros::fp_emit_ctx;
use crate::util::size::mb;

/// A live sub-range of a pooled buffer.
///
/// Valid from [`BufferPool::allocate`] until the matching
/// [`BufferPool::free`] or pool shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAllocation {
    /// Buffer of the owning chunk; bind it with `offset`.
    pub buffer: BufferHandle,
    /// Byte offset inside the chunk buffer.
    pub offset: u64,
    /// Requested size in bytes.
    pub size: u64,
    /// Persistently mapped address of `offset`.
    pub mapped_ptr: *mut u8,
    /// Index of the owning chunk.
    pub chunk_index: usize,
}

impl BufferAllocation {
    /// Copy `bytes` into the mapped range, starting `offset` bytes in.
    ///
    /// # Safety
    ///
    /// The allocation must not have been freed and its pool must not have
    /// been shut down. `offset + bytes.len()` must not exceed `size`.
    pub unsafe fn write_bytes(&self, offset: u64, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() as u64 <= self.size, "write past end of allocation");
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped_ptr.add(offset as usize), bytes.len());
    }
}

struct Chunk {
    buffer: BufferHandle,
    memory: MemoryHandle,
    mapped: *mut u8,
    allocator: FreeListAllocator,
}

/// Chunked pool of persistently mapped host-visible buffer memory.
pub struct BufferPool {
    device: Arc<dyn GpuDevice>,
    memory_properties: MemoryProperties,
    chunk_size: u64,
    chunks: Vec<Chunk>,
    active_allocations: usize,
}

impl BufferPool {
    /// Default chunk size (2 MB).
    pub const DEFAULT_CHUNK_SIZE: u64 = mb(2);

    const USAGE: BufferUsage = BufferUsage::VERTEX_BUFFER.union(BufferUsage::INDEX_BUFFER);
    const MEMORY_FLAGS: MemoryPropertyFlags =
        MemoryPropertyFlags::HOST_VISIBLE.union(MemoryPropertyFlags::HOST_COHERENT);

    /// Create an empty pool. No chunk is created until the first allocation.
    pub fn new(device: Arc<dyn GpuDevice>, memory_properties: MemoryProperties, chunk_size: u64) -> Self {
        Self {
            device,
            memory_properties,
            chunk_size,
            chunks: Vec::new(),
            active_allocations: 0,
        }
    }

    /// Allocate `size` bytes at a multiple of `alignment`.
    ///
    /// Tries every chunk in creation order, then creates exactly one new
    /// chunk and retries once.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Result<BufferAllocation, PoolError> {
        if size == 0 || alignment == 0 {
            return Err(PoolError::InvalidRequest);
        }

        if size > self.chunk_size {
            fp_emit_ctx!(
                FP102,
                "requested {} bytes, chunk size {} bytes, {} chunks active",
                size,
                self.chunk_size,
                self.chunks.len()
            );
            return Err(PoolError::ExceedsBlockSize {
                requested: size,
                block_size: self.chunk_size,
            });
        }

        if let Some(alloc) = (0..self.chunks.len()).find_map(|i| self.allocate_in_chunk(i, size, alignment)) {
            return Ok(alloc);
        }

        if let Err(err) = self.create_chunk() {
            fp_emit_ctx!(
                FP101,
                "requested {} bytes, {} chunks active, {} allocations: {}",
                size,
                self.chunks.len(),
                self.active_allocations,
                err
            );
            return Err(err);
        }

        let fresh = self.chunks.len() - 1;
        self.allocate_in_chunk(fresh, size, alignment).ok_or_else(|| {
            fp_emit_ctx!(
                FP101,
                "requested {} bytes (alignment {}) did not fit a fresh {} byte chunk",
                size,
                alignment,
                self.chunk_size
            );
            PoolError::ExceedsBlockSize {
                requested: size,
                block_size: self.chunk_size,
            }
        })
    }

    /// Return an allocation's range to its chunk.
    ///
    /// Allocations whose chunk no longer exists are ignored.
    pub fn free(&mut self, alloc: &BufferAllocation) {
        let Some(chunk) = self.chunks.get_mut(alloc.chunk_index) else {
            return;
        };
        if chunk.buffer != alloc.buffer {
            return;
        }
        chunk.allocator.free(alloc.offset, alloc.size);
        self.active_allocations = self.active_allocations.saturating_sub(1);
    }

    /// Unmap and destroy every chunk.
    ///
    /// Warns if allocations are still live. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.active_allocations > 0 {
            fp_emit_ctx!(
                FP103,
                "{} active allocations across {} chunks",
                self.active_allocations,
                self.chunks.len()
            );
        }

        for chunk in self.chunks.drain(..) {
            self.device.unmap_memory(chunk.memory);
            self.device.destroy_buffer(chunk.buffer);
            self.device.free_memory(chunk.memory);
        }
        self.active_allocations = 0;
    }

    /// Number of chunks created so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of live allocations.
    pub fn active_allocations(&self) -> usize {
        self.active_allocations
    }

    /// Size of every chunk.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Free-list bookkeeping of one chunk.
    pub fn chunk_allocator(&self, index: usize) -> Option<&FreeListAllocator> {
        self.chunks.get(index).map(|c| &c.allocator)
    }

    /// Snapshot of pool usage.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            block_count: self.chunks.len(),
            block_size: self.chunk_size,
            reserved_bytes: self.chunks.len() as u64 * self.chunk_size,
            free_bytes: self.chunks.iter().map(|c| c.allocator.free_space()).sum(),
            largest_free_block: self
                .chunks
                .iter()
                .map(|c| c.allocator.largest_free_block())
                .max()
                .unwrap_or(0),
            active_allocations: self.active_allocations,
            ..PoolStats::default()
        }
    }

    fn allocate_in_chunk(&mut self, index: usize, size: u64, alignment: u64) -> Option<BufferAllocation> {
        let chunk = &mut self.chunks[index];
        let alloc = chunk.allocator.allocate(size, alignment)?;
        self.active_allocations += 1;

        Some(BufferAllocation {
            buffer: chunk.buffer,
            offset: alloc.offset,
            size: alloc.size,
            mapped_ptr: chunk.mapped.wrapping_add(alloc.offset as usize),
            chunk_index: index,
        })
    }

    /// Create, back, bind and map one chunk. Partial objects are released on failure.
    fn create_chunk(&mut self) -> Result<(), PoolError> {
        let device = &*self.device;

        let buffer = device.create_buffer(self.chunk_size, Self::USAGE)?;
        let req = device.buffer_memory_requirements(buffer);

        let Some(memory_type_index) = self
            .memory_properties
            .find_memory_type(req.memory_type_bits, Self::MEMORY_FLAGS)
        else {
            device.destroy_buffer(buffer);
            return Err(PoolError::NoSuitableMemoryType {
                type_filter: req.memory_type_bits,
                required: Self::MEMORY_FLAGS,
            });
        };

        let memory = match device.allocate_memory(req.size, memory_type_index) {
            Ok(memory) => memory,
            Err(err) => {
                device.destroy_buffer(buffer);
                return Err(err.into());
            }
        };

        let mapped = device
            .bind_buffer_memory(buffer, memory, 0)
            .and_then(|()| device.map_memory(memory, 0, self.chunk_size));
        let mapped = match mapped {
            Ok(ptr) => ptr,
            Err(err) => {
                device.destroy_buffer(buffer);
                device.free_memory(memory);
                return Err(err.into());
            }
        };

        self.chunks.push(Chunk {
            buffer,
            memory,
            mapped,
            allocator: FreeListAllocator::with_capacity(self.chunk_size),
        });

        fp_emit_ctx!(
            FP110,
            "chunk {} ({} bytes)",
            self.chunks.len() - 1,
            self.chunk_size
        );
        Ok(())
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .field("active_allocations", &self.active_allocations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, SinkGuard};
    use crate::gpu::dummy::{DummyDevice, DummyOp};
    use crate::gpu::memory::MemoryType;

    fn pool_with(device: &Arc<DummyDevice>, chunk_size: u64) -> BufferPool {
        BufferPool::new(device.clone(), device.memory_properties(), chunk_size)
    }

    #[test]
    fn test_lazy_chunk_creation() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);
        assert_eq!(pool.chunk_count(), 0);
        assert!(device.live_objects().is_empty());

        let alloc = pool.allocate(64, 16).unwrap();
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(alloc.offset, 0);
        assert_eq!(alloc.size, 64);
        assert!(!alloc.mapped_ptr.is_null());
        assert_eq!(device.live_objects().buffers, 1);
        assert_eq!(device.live_objects().memories, 1);
    }

    #[test]
    fn test_two_large_requests_use_two_chunks() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);

        let a = pool.allocate(600, 4).unwrap();
        let b = pool.allocate(600, 4).unwrap();

        assert_eq!(pool.chunk_count(), 2);
        assert_ne!(a.chunk_index, b.chunk_index);
        assert_ne!(a.buffer, b.buffer);
        assert_eq!(pool.active_allocations(), 2);
    }

    #[test]
    fn test_first_fit_reuses_earlier_chunk() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);

        let a = pool.allocate(600, 4).unwrap();
        let _b = pool.allocate(600, 4).unwrap();
        pool.free(&a);

        let c = pool.allocate(100, 4).unwrap();
        assert_eq!(c.chunk_index, 0);
        assert_eq!(pool.chunk_count(), 2);
    }

    #[test]
    fn test_mapped_pointers_follow_offsets() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);

        let a = pool.allocate(10, 1).unwrap();
        let b = pool.allocate(32, 16).unwrap();

        assert_eq!(b.offset, 16);
        assert_eq!(b.mapped_ptr as usize - a.mapped_ptr as usize, 16);

        unsafe { b.write_bytes(0, &[7, 8, 9]) };
        let written = unsafe { std::slice::from_raw_parts(b.mapped_ptr, 3) };
        assert_eq!(written, &[7, 8, 9]);
    }

    #[test]
    fn test_invalid_requests_are_silent() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        assert_eq!(pool.allocate(0, 4), Err(PoolError::InvalidRequest));
        assert_eq!(pool.allocate(4, 0), Err(PoolError::InvalidRequest));
        assert_eq!(pool.chunk_count(), 0);
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn test_oversized_request_fails_without_growth() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        let err = pool.allocate(1025, 1).unwrap_err();
        assert_eq!(
            err,
            PoolError::ExceedsBlockSize {
                requested: 1025,
                block_size: 1024
            }
        );
        assert_eq!(pool.chunk_count(), 0);
        assert!(sink.contains("FP102"));

        // exactly chunk-sized still works
        assert!(pool.allocate(1024, 1).is_ok());
    }

    #[test]
    fn test_growth_failure_is_logged_and_cleaned_up() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        device.fail_next(DummyOp::MapMemory);
        let err = pool.allocate(64, 4).unwrap_err();

        assert!(matches!(err, PoolError::Device(_)));
        assert!(sink.contains("FP101"));
        assert_eq!(pool.chunk_count(), 0);
        // buffer and memory of the failed chunk were released
        assert!(device.live_objects().is_empty());

        // the next attempt grows normally
        assert!(pool.allocate(64, 4).is_ok());
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn test_no_host_visible_memory_type() {
        let props = MemoryProperties {
            memory_types: vec![MemoryType {
                property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
                heap_index: 0,
            }],
            memory_heaps: vec![mb(64)],
        };
        let device = Arc::new(DummyDevice::with_memory_properties(props.clone()));
        let mut pool = BufferPool::new(device.clone(), props, 1024);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        let err = pool.allocate(64, 4).unwrap_err();
        assert!(matches!(err, PoolError::NoSuitableMemoryType { .. }));
        assert!(sink.contains("FP101"));
        assert!(device.live_objects().is_empty());
    }

    #[test]
    fn test_free_space_accounting() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);

        let allocs: Vec<_> = (0..8).map(|_| pool.allocate(100, 4).unwrap()).collect();
        let live: u64 = allocs.iter().map(|a| a.size).sum();
        let stats = pool.stats();
        // 100 is a multiple of 4, so no padding
        assert_eq!(stats.free_bytes + live, stats.reserved_bytes);

        for alloc in &allocs {
            pool.free(alloc);
        }
        let stats = pool.stats();
        assert_eq!(stats.free_bytes, stats.reserved_bytes);
        assert_eq!(pool.active_allocations(), 0);
        assert_eq!(pool.chunk_allocator(0).unwrap().blocks().len(), 1);
    }

    #[test]
    fn test_free_of_stale_allocation_is_ignored() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);

        let alloc = pool.allocate(64, 4).unwrap();
        let stale = BufferAllocation {
            chunk_index: 5,
            ..alloc
        };
        pool.free(&stale);
        assert_eq!(pool.active_allocations(), 1);
    }

    #[test]
    fn test_shutdown_warns_and_releases_everything() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1024);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        pool.allocate(600, 4).unwrap();
        pool.allocate(600, 4).unwrap();
        pool.shutdown();

        assert!(sink.contains("FP103"));
        assert_eq!(pool.chunk_count(), 0);
        assert!(device.live_objects().is_empty());

        // second shutdown is a no-op
        sink.clear();
        pool.shutdown();
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn test_drop_releases_chunks() {
        let device = Arc::new(DummyDevice::new());
        {
            let mut pool = pool_with(&device, 1024);
            let alloc = pool.allocate(64, 4).unwrap();
            pool.free(&alloc);
        }
        assert!(device.live_objects().is_empty());
    }
}
