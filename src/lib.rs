//! # framepool
//!
//! GPU suballocation and deferred resource reclamation for UI renderers.
//!
//! ## Features
//!
//! - First-fit free-list allocator with alignment and coalescing
//! - Host-visible buffer pool: persistently mapped chunks for geometry
//! - Device-local image memory pool: pages segregated by memory type, with a
//!   dedicated-allocation path for oversized images
//! - N-slot garbage ring: released resources are destroyed only once no
//!   in-flight frame can reference them
//! - Fence-gated texture uploads, immediate or batched per frame
//! - Generation-checked handles for geometry and textures
//! - Coded diagnostics (`FP1xx`..`FP4xx`) with optional `log` output
//! - Backend-neutral device trait, an in-RAM dummy device, and an `ash`
//!   backend behind the `gpu-vulkan` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use framepool::{DummyDevice, PoolConfig, RenderResources, Vertex};
//!
//! let device = Arc::new(DummyDevice::new());
//! let mut resources = RenderResources::new(device, PoolConfig::default()).unwrap();
//!
//! resources.begin_frame();
//! let white = [255, 255, 255, 255];
//! let triangle = resources
//!     .compile_geometry(
//!         &[
//!             Vertex::new([0.0, 0.0], white, [0.0, 0.0]),
//!             Vertex::new([8.0, 0.0], white, [1.0, 0.0]),
//!             Vertex::new([0.0, 8.0], white, [0.0, 1.0]),
//!         ],
//!         &[0, 1, 2],
//!     )
//!     .unwrap();
//! let icon = resources.generate_texture(&[0x80; 16], 2, 2).unwrap();
//! resources.end_frame();
//!
//! // Released resources wait out the garbage ring
//! resources.release_geometry(triangle);
//! resources.release_texture(icon);
//! resources.collect_garbage();
//! resources.collect_garbage();
//!
//! resources.shutdown();
//! ```

pub mod allocators;
pub mod api;
pub mod diagnostics;
pub mod gpu;
pub mod render;

mod sync;
pub mod util;

// Re-export public API at crate root for convenience
pub use api::config::PoolConfig;
pub use api::stats::{PoolStats, ResourceStats};

// Suballocation
pub use allocators::free_list::{Allocation, FreeBlock, FreeListAllocator};
pub use allocators::handles::{Handle, SlotMap};

// Device abstraction and pools
pub use gpu::{
    BufferAllocation, BufferPool, GpuDevice, GpuError, ImageExtent, ImageMemoryAllocation, ImageMemoryPool,
    MemoryProperties, MemoryPropertyFlags, MemoryRequirements, PoolError,
};
pub use gpu::{DummyDevice, DummyOp};

// Resource layer
pub use render::{
    GarbageRing, GeometryData, GeometryHandle, RenderResources, ResourceError, ResourceState, TextureData,
    TextureHandle, UploadMode, Vertex,
};

// Diagnostics
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink, SinkGuard};

// Size helpers
pub use util::size::{format_bytes, kb, mb};
