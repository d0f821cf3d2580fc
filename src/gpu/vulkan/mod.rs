//! Vulkan backend for the device abstraction
//!
//! This module provides a Vulkan implementation of the [`GpuDevice`](super::traits::GpuDevice)
//! trait using the ash crate.

pub mod device;

pub use device::{AshDevice, VulkanContext};

use ash::vk;

use super::memory::{MemoryProperties, MemoryPropertyFlags, MemoryType};
use super::traits::GpuError;

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => GpuError::OutOfDeviceMemory,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => GpuError::OutOfHostMemory,
            vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
            vk::Result::ERROR_MEMORY_MAP_FAILED => GpuError::MapFailed,
            other => GpuError::Backend(format!("{:?}", other)),
        }
    }
}

impl MemoryProperties {
    /// Snapshot Vulkan physical device memory properties.
    pub fn from_vk(props: &vk::PhysicalDeviceMemoryProperties) -> Self {
        let type_count = (props.memory_type_count as usize).min(props.memory_types.len());
        let heap_count = (props.memory_heap_count as usize).min(props.memory_heaps.len());

        Self {
            memory_types: props.memory_types[..type_count]
                .iter()
                .map(|t| MemoryType {
                    property_flags: MemoryPropertyFlags::from_bits_truncate(t.property_flags.as_raw()),
                    heap_index: t.heap_index,
                })
                .collect(),
            memory_heaps: props.memory_heaps[..heap_count].iter().map(|h| h.size).collect(),
        }
    }
}
