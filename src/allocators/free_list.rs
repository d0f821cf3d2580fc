//! First-fit free-list allocator over a single linear range.
//!
//! Pure offset/size bookkeeping: no device memory is touched here. Chunks and
//! pages in the GPU pools each own one of these to track which byte ranges of
//! their backing object are free.
//!
//! The free block list is kept sorted by offset, non-overlapping and fully
//! coalesced. Every call is O(n) in the number of free blocks, which stays
//! small for UI-sized workloads.

use crate::util::layout::align_up;

/// One contiguous free region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Byte offset of the region.
    pub offset: u64,
    /// Length of the region in bytes.
    pub size: u64,
}

impl FreeBlock {
    #[inline]
    fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Result of a successful allocation.
///
/// `size` is always the size the caller asked for. Padding inserted to satisfy
/// alignment stays in the free list and is never reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Aligned byte offset of the allocation.
    pub offset: u64,
    /// Requested size in bytes.
    pub size: u64,
}

/// First-fit allocator with coalescing frees.
#[derive(Debug, Clone, Default)]
pub struct FreeListAllocator {
    blocks: Vec<FreeBlock>,
    capacity: u64,
}

impl FreeListAllocator {
    /// Create an empty allocator with zero capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator managing `[0, capacity)`.
    pub fn with_capacity(capacity: u64) -> Self {
        let mut allocator = Self::new();
        allocator.reset(capacity);
        allocator
    }

    /// Forget all allocations and make `[0, capacity)` one free block.
    pub fn reset(&mut self, capacity: u64) {
        self.capacity = capacity;
        self.blocks.clear();
        if capacity > 0 {
            self.blocks.push(FreeBlock { offset: 0, size: capacity });
        }
    }

    /// Allocate `size` bytes at an offset that is a multiple of `alignment`.
    ///
    /// Returns `None` if no free block can hold the request, or if `size` or
    /// `alignment` is zero.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<Allocation> {
        if size == 0 || alignment == 0 {
            return None;
        }

        for i in 0..self.blocks.len() {
            let block = self.blocks[i];

            let Some(aligned) = align_up(block.offset, alignment) else {
                continue;
            };
            let padding = aligned - block.offset;
            let Some(needed) = padding.checked_add(size) else {
                continue;
            };
            if needed > block.size {
                continue;
            }

            if padding == 0 && needed == block.size {
                // exact fit
                self.blocks.remove(i);
            } else if padding == 0 {
                let block = &mut self.blocks[i];
                block.offset += size;
                block.size -= size;
            } else if needed == block.size {
                self.blocks[i].size = padding;
            } else {
                self.blocks[i].size = padding;
                self.blocks.insert(
                    i + 1,
                    FreeBlock {
                        offset: aligned + size,
                        size: block.size - needed,
                    },
                );
            }

            self.debug_validate();
            return Some(Allocation { offset: aligned, size });
        }

        None
    }

    /// Return `[offset, offset + size)` to the free list.
    ///
    /// The range must have come from [`allocate`](Self::allocate) on this
    /// allocator and must not already be free. Debug builds assert this.
    pub fn free(&mut self, offset: u64, size: u64) {
        if size == 0 {
            return;
        }

        let idx = self.blocks.partition_point(|b| b.offset < offset);

        debug_assert!(
            offset + size <= self.capacity,
            "free range [{}, {}) exceeds capacity {}",
            offset,
            offset + size,
            self.capacity
        );
        debug_assert!(
            idx == 0 || self.blocks[idx - 1].end() <= offset,
            "free range at {} overlaps a free block (double free?)",
            offset
        );
        debug_assert!(
            idx == self.blocks.len() || offset + size <= self.blocks[idx].offset,
            "free range at {} overlaps a free block (double free?)",
            offset
        );

        self.blocks.insert(idx, FreeBlock { offset, size });

        if idx + 1 < self.blocks.len() && self.blocks[idx].end() == self.blocks[idx + 1].offset {
            self.blocks[idx].size += self.blocks[idx + 1].size;
            self.blocks.remove(idx + 1);
        }

        if idx > 0 && self.blocks[idx - 1].end() == self.blocks[idx].offset {
            self.blocks[idx - 1].size += self.blocks[idx].size;
            self.blocks.remove(idx);
        }

        self.debug_validate();
    }

    /// Total managed bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Sum of all free block sizes.
    pub fn free_space(&self) -> u64 {
        self.blocks.iter().map(|b| b.size).sum()
    }

    /// Size of the largest free block, or 0 when full.
    pub fn largest_free_block(&self) -> u64 {
        self.blocks.iter().map(|b| b.size).max().unwrap_or(0)
    }

    /// The free block list, sorted by offset.
    pub fn blocks(&self) -> &[FreeBlock] {
        &self.blocks
    }

    /// Whether nothing is currently allocated.
    pub fn is_empty(&self) -> bool {
        self.free_space() == self.capacity
    }

    #[inline]
    fn debug_validate(&self) {
        #[cfg(debug_assertions)]
        self.validate();
    }

    /// Check the free list invariants, panicking on violation.
    #[cfg(debug_assertions)]
    fn validate(&self) {
        for (i, block) in self.blocks.iter().enumerate() {
            assert!(block.size > 0, "zero-sized free block at {}", block.offset);
            assert!(
                block.end() <= self.capacity,
                "free block [{}, {}) exceeds capacity {}",
                block.offset,
                block.end(),
                self.capacity
            );
            if i > 0 {
                let prev = &self.blocks[i - 1];
                assert!(prev.end() < block.offset, "free blocks unsorted, overlapping or uncoalesced at {}", block.offset);
            }
        }
    }
}
