//! Resource layer for the UI renderer.
//!
//! Builds on the pools in [`crate::gpu`]: compiled geometry, textures with
//! fence-gated uploads, and deferred destruction through a garbage ring.

pub mod error;
pub mod garbage;
pub mod resources;
pub mod upload;
pub mod vertex;

pub use error::ResourceError;
pub use garbage::{GarbageRing, DEFAULT_GARBAGE_SLOTS};
pub use resources::{
    GeometryData, GeometryHandle, RenderResources, ResourceState, TextureData, TextureHandle, Tracked,
};
pub use upload::{BatchedUploader, ImmediateUploader, StagedUpload, StagingBuffer, UploadMode};
pub use vertex::Vertex;
