//! Pool and resource statistics.

/// Snapshot of one pool (buffer chunks or image pages).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Number of chunks or pages.
    pub block_count: usize,

    /// Size of each chunk or page.
    pub block_size: u64,

    /// Bytes reserved from the device by chunks or pages.
    pub reserved_bytes: u64,

    /// Free bytes across all chunks or pages.
    pub free_bytes: u64,

    /// Largest single free range in any chunk or page.
    pub largest_free_block: u64,

    /// Live allocations, dedicated ones included.
    pub active_allocations: usize,

    /// Live dedicated allocations (image pool only).
    pub dedicated_allocations: usize,

    /// Bytes held by dedicated allocations (image pool only).
    pub dedicated_bytes: u64,
}

impl PoolStats {
    /// Bytes in use inside chunks or pages, alignment padding included.
    pub fn used_bytes(&self) -> u64 {
        self.reserved_bytes.saturating_sub(self.free_bytes)
    }

    /// Used fraction of the reserved bytes.
    pub fn utilization(&self) -> f64 {
        if self.reserved_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.reserved_bytes as f64
    }

    /// Fragmentation estimate: 1 - largest free range / free bytes.
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - (self.largest_free_block as f64 / self.free_bytes as f64)
    }
}

/// Snapshot of the resource layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStats {
    /// Live geometry handles.
    pub live_geometry: usize,

    /// Live texture handles, the fallback texture included.
    pub live_textures: usize,

    /// Retired resources waiting in the garbage ring.
    pub retired_pending: usize,

    /// Immediate uploads whose fence has not been observed signaled.
    pub pending_immediate_uploads: usize,

    /// Uploads staged for the next batch flush.
    pub staged_uploads: usize,

    /// Staging buffers of the last submitted batch still in flight.
    pub in_flight_batch_uploads: usize,

    /// Number of batch submissions so far.
    pub batches_submitted: u64,

    /// Geometry buffer pool.
    pub buffer_pool: PoolStats,

    /// Texture memory pool.
    pub image_pool: PoolStats,
}
