//! Device abstraction traits and types
//!
//! This module defines the device interface WITHOUT pulling in any backend-specific dependencies.
//! Pools and the resource layer depend on [`GpuDevice`], not on `ash`.

use std::fmt;

use super::memory::{BufferUsage, MemoryProperties, MemoryRequirements};

/// Errors reported by a device backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Device memory exhausted
    OutOfDeviceMemory,
    /// Host memory exhausted
    OutOfHostMemory,
    /// The device was lost
    DeviceLost,
    /// Memory could not be mapped
    MapFailed,
    /// A handle did not name a live object
    InvalidHandle,
    /// Backend-specific error (opaque)
    Backend(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::OutOfDeviceMemory => write!(f, "out of device memory"),
            GpuError::OutOfHostMemory => write!(f, "out of host memory"),
            GpuError::DeviceLost => write!(f, "device lost"),
            GpuError::MapFailed => write!(f, "memory map failed"),
            GpuError::InvalidHandle => write!(f, "invalid device handle"),
            GpuError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {}

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The null handle.
            pub const NULL: Self = Self(0);

            /// Whether this is the null handle.
            pub fn is_null(self) -> bool {
                self.0 == 0
            }

            /// The raw backend value.
            pub fn as_raw(self) -> u64 {
                self.0
            }
        }
    };
}

raw_handle!(
    /// A device buffer.
    BufferHandle
);
raw_handle!(
    /// A device memory object.
    MemoryHandle
);
raw_handle!(
    /// A device image.
    ImageHandle
);
raw_handle!(
    /// A view over an image.
    ImageViewHandle
);
raw_handle!(
    /// A descriptor set binding an image view and sampler.
    DescriptorSetHandle
);
raw_handle!(
    /// A command pool.
    CommandPoolHandle
);
raw_handle!(
    /// A primary command buffer.
    CommandBufferHandle
);
raw_handle!(
    /// A fence.
    FenceHandle
);

/// Width and height of a 2D image, in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageExtent {
    pub width: u32,
    pub height: u32,
}

impl ImageExtent {
    /// Create an extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes needed for tightly packed RGBA8 texels.
    pub fn rgba8_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }
}

/// Image layout transitions recorded around a texture upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutTransition {
    /// `UNDEFINED` to `TRANSFER_DST_OPTIMAL`, before the copy.
    UndefinedToTransferDst,
    /// `TRANSFER_DST_OPTIMAL` to `SHADER_READ_ONLY_OPTIMAL`, after the copy.
    TransferDstToShaderRead,
}

/// Core device trait - every backend implements this
///
/// Methods mirror the device calls the pools and the upload pipeline need.
/// Images are always 2D RGBA8, optimal tiling, usable as a transfer
/// destination and for sampling. Destroy/free calls on null handles are
/// no-ops.
pub trait GpuDevice: Send + Sync {
    /// Memory types and heaps of the physical device
    fn memory_properties(&self) -> MemoryProperties;

    /// Minimum spacing between linear and optimal resources in one memory object
    fn buffer_image_granularity(&self) -> u64;

    // Buffers and memory

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<BufferHandle, GpuError>;

    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> MemoryRequirements;

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> Result<MemoryHandle, GpuError>;

    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: MemoryHandle, offset: u64) -> Result<(), GpuError>;

    /// Map `size` bytes of `memory` starting at `offset`
    fn map_memory(&self, memory: MemoryHandle, offset: u64, size: u64) -> Result<*mut u8, GpuError>;

    fn unmap_memory(&self, memory: MemoryHandle);

    fn destroy_buffer(&self, buffer: BufferHandle);

    fn free_memory(&self, memory: MemoryHandle);

    // Images

    fn create_image(&self, extent: ImageExtent) -> Result<ImageHandle, GpuError>;

    fn image_memory_requirements(&self, image: ImageHandle) -> MemoryRequirements;

    fn bind_image_memory(&self, image: ImageHandle, memory: MemoryHandle, offset: u64) -> Result<(), GpuError>;

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle, GpuError>;

    /// Allocate a descriptor set pointing at `view` with the backend's sampler
    fn allocate_descriptor_set(&self, view: ImageViewHandle) -> Result<DescriptorSetHandle, GpuError>;

    fn free_descriptor_set(&self, set: DescriptorSetHandle);

    fn destroy_image_view(&self, view: ImageViewHandle);

    fn destroy_image(&self, image: ImageHandle);

    // Commands

    /// Create a command pool on the graphics queue family
    ///
    /// `transient` hints that buffers are short-lived; pools are always
    /// resettable.
    fn create_command_pool(&self, transient: bool) -> Result<CommandPoolHandle, GpuError>;

    fn reset_command_pool(&self, pool: CommandPoolHandle) -> Result<(), GpuError>;

    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle, GpuError>;

    /// Begin recording for a single submission
    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<(), GpuError>;

    fn cmd_image_barrier(&self, cmd: CommandBufferHandle, image: ImageHandle, transition: LayoutTransition);

    /// Copy tightly packed texels from the start of `src` into the whole of `dst`
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: ImageHandle,
        extent: ImageExtent,
    );

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<(), GpuError>;

    /// Submit one command buffer; `fence` is signaled when it completes
    fn queue_submit(&self, cmd: CommandBufferHandle, fence: FenceHandle) -> Result<(), GpuError>;

    // Fences

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GpuError>;

    /// Non-blocking: `true` once the fence is signaled
    fn fence_status(&self, fence: FenceHandle) -> Result<bool, GpuError>;

    /// Block until the fence is signaled
    fn wait_for_fence(&self, fence: FenceHandle) -> Result<(), GpuError>;

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GpuError>;

    fn destroy_fence(&self, fence: FenceHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        assert!(BufferHandle::NULL.is_null());
        assert!(BufferHandle::default().is_null());
        assert!(!FenceHandle(7).is_null());
        assert_eq!(ImageHandle(42).as_raw(), 42);
    }

    #[test]
    fn test_extent_bytes() {
        assert_eq!(ImageExtent::new(1, 1).rgba8_bytes(), 4);
        assert_eq!(ImageExtent::new(256, 128).rgba8_bytes(), 256 * 128 * 4);
        // no u32 overflow
        assert_eq!(ImageExtent::new(u32::MAX, 2).rgba8_bytes(), u32::MAX as u64 * 8);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(GpuError::OutOfDeviceMemory.to_string(), "out of device memory");
        assert_eq!(GpuError::Backend("x".into()).to_string(), "backend error: x");
    }
}
