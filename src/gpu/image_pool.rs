//! Device-local memory pool for texture images.
//!
//! Pages are large device memory allocations of one memory type each,
//! subdivided by a [`FreeListAllocator`]. A request is served from the first
//! page of the matching memory type with room; otherwise one new page is
//! created. Requests larger than a page get a dedicated allocation that is
//! freed on its own.
//!
//! Offsets are aligned to at least the buffer-image granularity so images
//! never share a granularity page with a linear resource.

use std::fmt;
use std::sync::Arc;

use super::error::PoolError;
use super::memory::{MemoryProperties, MemoryPropertyFlags, MemoryRequirements};
use super::traits::{GpuDevice, MemoryHandle};
use crate::allocators::free_list::FreeListAllocator;
use crate::api::stats::PoolStats;
use crate::diagnostics::macros::fp_emit_ctx;
use crate::util::size::mb;

/// Image memory bound to one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMemoryAllocation {
    /// Page memory, or the dedicated memory object.
    pub memory: MemoryHandle,
    /// Offset to bind at; always 0 for dedicated allocations.
    pub offset: u64,
    /// Requested size in bytes.
    pub size: u64,
    /// Owning page; [`ImageMemoryAllocation::NO_PAGE`] when dedicated.
    pub page_index: usize,
    /// Whether this allocation owns its memory object.
    pub dedicated: bool,
}

impl ImageMemoryAllocation {
    /// Page index carried by dedicated allocations.
    pub const NO_PAGE: usize = usize::MAX;
}

#[derive(Debug)]
struct Page {
    memory: MemoryHandle,
    memory_type_index: u32,
    allocator: FreeListAllocator,
}

/// Paged pool of device-local image memory.
pub struct ImageMemoryPool {
    device: Arc<dyn GpuDevice>,
    memory_properties: MemoryProperties,
    buffer_image_granularity: u64,
    page_size: u64,
    pages: Vec<Page>,
    active_allocations: usize,
    dedicated_allocations: usize,
    dedicated_bytes: u64,
}

impl ImageMemoryPool {
    /// Default page size (16 MB).
    pub const DEFAULT_PAGE_SIZE: u64 = mb(16);

    /// Create an empty pool. Pages are created on demand.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        memory_properties: MemoryProperties,
        buffer_image_granularity: u64,
        page_size: u64,
    ) -> Self {
        Self {
            device,
            memory_properties,
            buffer_image_granularity,
            page_size,
            pages: Vec::new(),
            active_allocations: 0,
            dedicated_allocations: 0,
            dedicated_bytes: 0,
        }
    }

    /// Allocate memory for an image with requirements `req` in a memory type
    /// that has at least the `desired` properties.
    pub fn allocate(
        &mut self,
        req: &MemoryRequirements,
        desired: MemoryPropertyFlags,
    ) -> Result<ImageMemoryAllocation, PoolError> {
        let alignment = req.alignment.max(self.buffer_image_granularity);
        if req.size == 0 || alignment == 0 {
            return Err(PoolError::InvalidRequest);
        }

        let Some(memory_type_index) = self
            .memory_properties
            .find_memory_type(req.memory_type_bits, desired)
        else {
            fp_emit_ctx!(
                FP201,
                "filter=0x{:x}, props=0x{:x}",
                req.memory_type_bits,
                desired.bits()
            );
            return Err(PoolError::NoSuitableMemoryType {
                type_filter: req.memory_type_bits,
                required: desired,
            });
        };

        if req.size > self.page_size {
            return self.allocate_dedicated(req.size, memory_type_index);
        }

        for i in 0..self.pages.len() {
            if self.pages[i].memory_type_index != memory_type_index {
                continue;
            }
            if let Some(alloc) = self.allocate_in_page(i, req.size, alignment) {
                return Ok(alloc);
            }
        }

        if let Err(err) = self.create_page(memory_type_index) {
            fp_emit_ctx!(
                FP202,
                "requested {} bytes, {} pages active, {} allocations: {}",
                req.size,
                self.pages.len(),
                self.active_allocations,
                err
            );
            return Err(err);
        }

        let fresh = self.pages.len() - 1;
        self.allocate_in_page(fresh, req.size, alignment).ok_or_else(|| {
            fp_emit_ctx!(
                FP202,
                "requested {} bytes (alignment {}) did not fit a fresh {} byte page",
                req.size,
                alignment,
                self.page_size
            );
            PoolError::ExceedsBlockSize {
                requested: req.size,
                block_size: self.page_size,
            }
        })
    }

    /// Release an allocation. Dedicated memory is freed immediately.
    pub fn free(&mut self, alloc: &ImageMemoryAllocation) {
        if alloc.dedicated {
            self.device.free_memory(alloc.memory);
            self.dedicated_allocations = self.dedicated_allocations.saturating_sub(1);
            self.dedicated_bytes = self.dedicated_bytes.saturating_sub(alloc.size);
            self.active_allocations = self.active_allocations.saturating_sub(1);
            return;
        }

        let Some(page) = self.pages.get_mut(alloc.page_index) else {
            return;
        };
        if page.memory != alloc.memory {
            return;
        }
        page.allocator.free(alloc.offset, alloc.size);
        self.active_allocations = self.active_allocations.saturating_sub(1);
    }

    /// Free every page. Warns if allocations are still live.
    ///
    /// Dedicated allocations still held by callers are not tracked and stay
    /// with their owners. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.active_allocations > 0 {
            fp_emit_ctx!(
                FP204,
                "{} active allocations ({} dedicated) across {} pages",
                self.active_allocations,
                self.dedicated_allocations,
                self.pages.len()
            );
        }

        for page in self.pages.drain(..) {
            self.device.free_memory(page.memory);
        }
        self.active_allocations = 0;
        self.dedicated_allocations = 0;
        self.dedicated_bytes = 0;
    }

    /// Number of pages across all memory types.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of pages of one memory type.
    pub fn page_count_for_type(&self, memory_type_index: u32) -> usize {
        self.pages
            .iter()
            .filter(|p| p.memory_type_index == memory_type_index)
            .count()
    }

    /// Memory type of a page.
    pub fn page_memory_type(&self, page_index: usize) -> Option<u32> {
        self.pages.get(page_index).map(|p| p.memory_type_index)
    }

    /// Free-list bookkeeping of one page.
    pub fn page_allocator(&self, page_index: usize) -> Option<&FreeListAllocator> {
        self.pages.get(page_index).map(|p| &p.allocator)
    }

    /// Live allocations, dedicated ones included.
    pub fn active_allocations(&self) -> usize {
        self.active_allocations
    }

    /// Live dedicated allocations.
    pub fn dedicated_allocations(&self) -> usize {
        self.dedicated_allocations
    }

    /// Size of every page.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Snapshot of pool usage.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            block_count: self.pages.len(),
            block_size: self.page_size,
            reserved_bytes: self.pages.len() as u64 * self.page_size,
            free_bytes: self.pages.iter().map(|p| p.allocator.free_space()).sum(),
            largest_free_block: self
                .pages
                .iter()
                .map(|p| p.allocator.largest_free_block())
                .max()
                .unwrap_or(0),
            active_allocations: self.active_allocations,
            dedicated_allocations: self.dedicated_allocations,
            dedicated_bytes: self.dedicated_bytes,
        }
    }

    fn allocate_dedicated(&mut self, size: u64, memory_type_index: u32) -> Result<ImageMemoryAllocation, PoolError> {
        let memory = self.device.allocate_memory(size, memory_type_index).map_err(|err| {
            fp_emit_ctx!(FP203, "{} bytes, mem type {}: {}", size, memory_type_index, err);
            PoolError::Device(err)
        })?;

        self.active_allocations += 1;
        self.dedicated_allocations += 1;
        self.dedicated_bytes += size;
        fp_emit_ctx!(FP211, "{} bytes, mem type {}", size, memory_type_index);

        Ok(ImageMemoryAllocation {
            memory,
            offset: 0,
            size,
            page_index: ImageMemoryAllocation::NO_PAGE,
            dedicated: true,
        })
    }

    fn allocate_in_page(&mut self, index: usize, size: u64, alignment: u64) -> Option<ImageMemoryAllocation> {
        let page = &mut self.pages[index];
        let alloc = page.allocator.allocate(size, alignment)?;
        self.active_allocations += 1;

        Some(ImageMemoryAllocation {
            memory: page.memory,
            offset: alloc.offset,
            size: alloc.size,
            page_index: index,
            dedicated: false,
        })
    }

    fn create_page(&mut self, memory_type_index: u32) -> Result<(), PoolError> {
        let memory = self.device.allocate_memory(self.page_size, memory_type_index)?;
        self.pages.push(Page {
            memory,
            memory_type_index,
            allocator: FreeListAllocator::with_capacity(self.page_size),
        });

        fp_emit_ctx!(
            FP210,
            "page {} ({} bytes, mem type {})",
            self.pages.len() - 1,
            self.page_size,
            memory_type_index
        );
        Ok(())
    }
}

impl Drop for ImageMemoryPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ImageMemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageMemoryPool")
            .field("page_size", &self.page_size)
            .field("granularity", &self.buffer_image_granularity)
            .field("pages", &self.pages.len())
            .field("active_allocations", &self.active_allocations)
            .field("dedicated_allocations", &self.dedicated_allocations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, SinkGuard};
    use crate::gpu::dummy::{DummyDevice, DummyOp};
    use crate::gpu::memory::MemoryType;
    use crate::util::size::kb;

    const PAGE: u64 = 64 * 1024;

    fn pool_with(device: &Arc<DummyDevice>, granularity: u64) -> ImageMemoryPool {
        ImageMemoryPool::new(device.clone(), device.memory_properties(), granularity, PAGE)
    }

    fn req(size: u64, alignment: u64) -> MemoryRequirements {
        MemoryRequirements {
            size,
            alignment,
            memory_type_bits: u32::MAX,
        }
    }

    /// Two device-local types on separate heaps plus one host type.
    fn two_local_types() -> MemoryProperties {
        MemoryProperties {
            memory_types: vec![
                MemoryType {
                    property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 0,
                },
                MemoryType {
                    property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 1,
                },
                MemoryType {
                    property_flags: MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 2,
                },
            ],
            memory_heaps: vec![mb(64), mb(64), mb(64)],
        }
    }

    #[test]
    fn test_pooled_allocations_share_a_page() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1);

        let a = pool.allocate(&req(kb(4), 256), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        let b = pool.allocate(&req(kb(4), 256), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();

        assert_eq!(pool.page_count(), 1);
        assert_eq!(a.memory, b.memory);
        assert_eq!(b.offset, kb(4));
        assert!(!a.dedicated && !b.dedicated);
        assert_eq!(device.memory_type_of(a.memory), Some(0));
    }

    #[test]
    fn test_granularity_raises_alignment() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 4096);

        let a = pool.allocate(&req(100, 16), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        let b = pool.allocate(&req(100, 16), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();

        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 4096);
        assert_eq!(b.size, 100);
    }

    #[test]
    fn test_oversized_takes_dedicated_path() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1);

        // fill a page first so occupancy is irrelevant
        let small = pool.allocate(&req(PAGE, 1), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(pool.page_count(), 1);

        let big = pool.allocate(&req(PAGE + 1, 256), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert!(big.dedicated);
        assert_eq!(big.offset, 0);
        assert_eq!(big.page_index, ImageMemoryAllocation::NO_PAGE);
        assert_eq!(device.memory_size(big.memory), Some(PAGE + 1));
        assert_eq!(pool.page_count(), 1);
        assert_eq!(pool.dedicated_allocations(), 1);
        assert_eq!(pool.active_allocations(), 2);

        pool.free(&big);
        assert_eq!(device.memory_size(big.memory), None);
        assert_eq!(pool.dedicated_allocations(), 0);
        assert_eq!(pool.stats().dedicated_bytes, 0);

        pool.free(&small);
        assert_eq!(pool.active_allocations(), 0);
    }

    #[test]
    fn test_pages_are_segregated_by_memory_type() {
        let device = Arc::new(DummyDevice::with_memory_properties(two_local_types()));
        let mut pool = pool_with(&device, 1);

        let only_type_1 = MemoryRequirements {
            size: kb(4),
            alignment: 256,
            memory_type_bits: 0b010,
        };
        let a = pool.allocate(&req(kb(4), 256), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        let b = pool.allocate(&only_type_1, MemoryPropertyFlags::DEVICE_LOCAL).unwrap();

        // page 0 has room, but it is the wrong memory type
        assert_eq!(pool.page_count(), 2);
        assert_ne!(a.memory, b.memory);
        assert_eq!(pool.page_count_for_type(0), 1);
        assert_eq!(pool.page_count_for_type(1), 1);
        assert_eq!(pool.page_memory_type(b.page_index), Some(1));
    }

    #[test]
    fn test_no_suitable_memory_type() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        let err = pool
            .allocate(&req(kb(4), 256), MemoryPropertyFlags::LAZILY_ALLOCATED)
            .unwrap_err();
        assert!(matches!(err, PoolError::NoSuitableMemoryType { .. }));
        assert!(sink.contains("FP201"));
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_page_growth_failure() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        device.fail_next(DummyOp::AllocateMemory);
        let err = pool.allocate(&req(kb(4), 256), MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
        assert_eq!(err, PoolError::Device(crate::gpu::traits::GpuError::OutOfDeviceMemory));
        assert!(sink.contains("FP202"));
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_dedicated_failure() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        device.fail_next(DummyOp::AllocateMemory);
        assert!(pool.allocate(&req(PAGE * 2, 256), MemoryPropertyFlags::DEVICE_LOCAL).is_err());
        assert!(sink.contains("FP203"));
        assert_eq!(pool.active_allocations(), 0);
    }

    #[test]
    fn test_zero_size_is_invalid() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 0);

        assert_eq!(
            pool.allocate(&req(0, 256), MemoryPropertyFlags::DEVICE_LOCAL),
            Err(PoolError::InvalidRequest)
        );
        assert_eq!(
            pool.allocate(&req(16, 0), MemoryPropertyFlags::DEVICE_LOCAL),
            Err(PoolError::InvalidRequest)
        );
    }

    #[test]
    fn test_shutdown_frees_pages_and_warns() {
        let device = Arc::new(DummyDevice::new());
        let mut pool = pool_with(&device, 1);
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        pool.allocate(&req(kb(4), 256), MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        pool.shutdown();

        assert!(sink.contains("FP204"));
        assert!(device.live_objects().is_empty());
        pool.shutdown();
    }
}
