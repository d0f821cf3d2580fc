//! GPU memory management module
//!
//! Backend-neutral device abstraction plus the two suballocating pools built
//! on it.
//!
//! ## Backends
//! - `dummy`: in-RAM device for tests and headless runs (always available)
//! - `vulkan`: Via the `ash` crate (enable `gpu-vulkan` feature)

// Always present for API stability: traits define the interface
pub mod memory;
pub mod traits;
pub use memory::{BufferUsage, MemoryProperties, MemoryPropertyFlags, MemoryRequirements, MemoryType};
pub use traits::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorSetHandle, FenceHandle, GpuDevice, GpuError,
    ImageExtent, ImageHandle, ImageViewHandle, LayoutTransition, MemoryHandle,
};

pub mod error;
pub use error::PoolError;

pub mod buffer_pool;
pub use buffer_pool::{BufferAllocation, BufferPool};

pub mod image_pool;
pub use image_pool::{ImageMemoryAllocation, ImageMemoryPool};

// Dummy device for testing (always available)
pub mod dummy;
pub use dummy::{DummyDevice, DummyImageLayout, DummyOp, LiveObjects};

// Backend implementations are conditionally compiled
#[cfg(feature = "gpu-vulkan")]
pub mod vulkan;
