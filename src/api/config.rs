//! Pool and resource configuration.

use crate::util::size::{kb, mb};

/// Configuration for the pools and the resource layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size of each host-visible geometry chunk (default: 2 MB)
    pub buffer_chunk_size: u64,

    /// Size of each device-local image memory page (default: 16 MB)
    pub image_page_size: u64,

    /// Number of garbage slots a retired resource ages through (default: 2)
    pub garbage_slots: usize,

    /// Alignment of vertex ranges inside geometry chunks
    pub vertex_alignment: u64,

    /// Alignment of index ranges inside geometry chunks
    pub index_alignment: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buffer_chunk_size: mb(2),
            image_page_size: mb(16),
            garbage_slots: 2,
            vertex_alignment: 16,
            index_alignment: 4,
        }
    }
}

impl PoolConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            buffer_chunk_size: kb(64),
            image_page_size: kb(256),
            ..Self::default()
        }
    }

    /// Builder: set the geometry chunk size.
    pub fn with_buffer_chunk_size(mut self, size: u64) -> Self {
        self.buffer_chunk_size = size;
        self
    }

    /// Builder: set the image memory page size.
    pub fn with_image_page_size(mut self, size: u64) -> Self {
        self.image_page_size = size;
        self
    }

    /// Builder: set the number of garbage slots (clamped to at least 1).
    pub fn with_garbage_slots(mut self, slots: usize) -> Self {
        self.garbage_slots = slots.max(1);
        self
    }

    /// Builder: set vertex range alignment.
    pub fn with_vertex_alignment(mut self, alignment: u64) -> Self {
        self.vertex_alignment = alignment;
        self
    }

    /// Builder: set index range alignment.
    pub fn with_index_alignment(mut self, alignment: u64) -> Self {
        self.index_alignment = alignment;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.buffer_chunk_size, 2 * 1024 * 1024);
        assert_eq!(config.image_page_size, 16 * 1024 * 1024);
        assert_eq!(config.garbage_slots, 2);
        assert_eq!(config.vertex_alignment, 16);
        assert_eq!(config.index_alignment, 4);
    }

    #[test]
    fn test_builders() {
        let config = PoolConfig::minimal()
            .with_buffer_chunk_size(kb(4))
            .with_garbage_slots(0)
            .with_index_alignment(2);

        assert_eq!(config.buffer_chunk_size, 4096);
        assert_eq!(config.garbage_slots, 1);
        assert_eq!(config.index_alignment, 2);
        assert_eq!(config.image_page_size, kb(256));
    }
}
