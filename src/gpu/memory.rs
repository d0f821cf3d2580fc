//! Backend-neutral memory property types.
//!
//! Bit values match Vulkan so backends convert with a plain `from_bits`.

use bitflags::bitflags;

bitflags! {
    /// Properties of a device memory type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        /// Fastest for device access.
        const DEVICE_LOCAL = 0x0000_0001;
        /// Can be mapped for host access.
        const HOST_VISIBLE = 0x0000_0002;
        /// Host writes are visible without explicit flushes.
        const HOST_COHERENT = 0x0000_0004;
        /// Cached on the host.
        const HOST_CACHED = 0x0000_0008;
        /// Backing may be allocated lazily.
        const LAZILY_ALLOCATED = 0x0000_0010;
    }
}

bitflags! {
    /// How a buffer will be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0x0000_0001;
        const TRANSFER_DST = 0x0000_0002;
        const UNIFORM_BUFFER = 0x0000_0010;
        const STORAGE_BUFFER = 0x0000_0020;
        const INDEX_BUFFER = 0x0000_0040;
        const VERTEX_BUFFER = 0x0000_0080;
    }
}

/// One memory type exposed by the physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    /// Property flags of the type.
    pub property_flags: MemoryPropertyFlags,
    /// Heap the type allocates from.
    pub heap_index: u32,
}

/// Snapshot of the physical device's memory types and heaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryProperties {
    /// Memory types, indexed by memory type index.
    pub memory_types: Vec<MemoryType>,
    /// Heap sizes in bytes, indexed by heap index.
    pub memory_heaps: Vec<u64>,
}

impl MemoryProperties {
    /// A typical discrete-GPU layout: one device-local type on heap 0 and one
    /// host-visible coherent type on heap 1.
    pub fn discrete(device_heap: u64, host_heap: u64) -> Self {
        Self {
            memory_types: vec![
                MemoryType {
                    property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 0,
                },
                MemoryType {
                    property_flags: MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 1,
                },
            ],
            memory_heaps: vec![device_heap, host_heap],
        }
    }

    /// First memory type allowed by `type_filter` whose flags contain
    /// `required`.
    pub fn find_memory_type(&self, type_filter: u32, required: MemoryPropertyFlags) -> Option<u32> {
        self.memory_types
            .iter()
            .enumerate()
            .take(32)
            .find(|(index, memory_type)| {
                type_filter & (1u32 << index) != 0 && memory_type.property_flags.contains(required)
            })
            .map(|(index, _)| index as u32)
    }

    /// Size of the heap backing `memory_type_index`, or 0 if unknown.
    pub fn heap_size_for_type(&self, memory_type_index: u32) -> u64 {
        self.memory_types
            .get(memory_type_index as usize)
            .and_then(|t| self.memory_heaps.get(t.heap_index as usize))
            .copied()
            .unwrap_or(0)
    }
}

/// Size, alignment and allowed memory types of a buffer or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    /// Bytes required.
    pub size: u64,
    /// Required offset alignment.
    pub alignment: u64,
    /// Bit `i` set means memory type `i` is allowed.
    pub memory_type_bits: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_memory_type() {
        let props = MemoryProperties::discrete(1 << 30, 1 << 28);

        assert_eq!(props.find_memory_type(0b11, MemoryPropertyFlags::DEVICE_LOCAL), Some(0));
        assert_eq!(
            props.find_memory_type(
                0b11,
                MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT
            ),
            Some(1)
        );
        // filter excludes the only matching type
        assert_eq!(props.find_memory_type(0b01, MemoryPropertyFlags::HOST_VISIBLE), None);
        assert_eq!(props.find_memory_type(0b11, MemoryPropertyFlags::HOST_CACHED), None);
    }

    #[test]
    fn test_empty_flags_match_first_allowed() {
        let props = MemoryProperties::discrete(1, 1);
        assert_eq!(props.find_memory_type(0b10, MemoryPropertyFlags::empty()), Some(1));
    }

    #[test]
    fn test_heap_size_for_type() {
        let props = MemoryProperties::discrete(100, 50);
        assert_eq!(props.heap_size_for_type(0), 100);
        assert_eq!(props.heap_size_for_type(1), 50);
        assert_eq!(props.heap_size_for_type(7), 0);
    }
}
