//! Renderer-owned GPU resources.
//!
//! [`RenderResources`] ties the two pools, the upload paths and the garbage
//! ring together. Geometry and textures live in generation-checked slot maps;
//! releasing one flips its state to [`ResourceState::Retired`] and queues the
//! handle in the garbage ring. The resource is destroyed for real when the
//! ring comes back around to that slot.
//!
//! ```rust,ignore
//! let mut resources = RenderResources::new(device, PoolConfig::default())?;
//!
//! resources.begin_frame();
//! let quad = resources.compile_geometry(&vertices, &[0, 1, 2, 2, 3, 0])?;
//! let icon = resources.generate_texture(&pixels, 16, 16)?;
//! resources.end_frame();
//!
//! // once the frame's fence has signaled
//! resources.collect_garbage();
//! ```

use std::fmt;
use std::sync::Arc;

use crate::allocators::handles::{Handle, SlotMap};
use crate::api::config::PoolConfig;
use crate::api::stats::ResourceStats;
use crate::diagnostics::macros::fp_emit_ctx;
use crate::gpu::buffer_pool::{BufferAllocation, BufferPool};
use crate::gpu::image_pool::{ImageMemoryAllocation, ImageMemoryPool};
use crate::gpu::memory::{MemoryProperties, MemoryPropertyFlags};
use crate::gpu::traits::{DescriptorSetHandle, GpuDevice, GpuError, ImageExtent, ImageHandle, ImageViewHandle};

use super::error::ResourceError;
use super::garbage::GarbageRing;
use super::upload::{BatchedUploader, ImmediateUploader, StagingBuffer, UploadMode};
use super::vertex::Vertex;

const WHITE_PIXEL: [u8; 4] = [255, 255, 255, 255];

/// Lifecycle state of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Usable for drawing.
    Live,
    /// Released; waiting in the garbage ring.
    Retired,
}

/// A resource plus its lifecycle state.
#[derive(Debug)]
pub struct Tracked<T> {
    data: T,
    state: ResourceState,
}

impl<T> Tracked<T> {
    fn live(data: T) -> Self {
        Self {
            data,
            state: ResourceState::Live,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }
}

/// Vertex and index ranges of one compiled geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryData {
    pub vertex_alloc: BufferAllocation,
    pub index_alloc: BufferAllocation,
    pub index_count: u32,
}

/// A sampled RGBA8 texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureData {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub descriptor_set: DescriptorSetHandle,
    pub memory_alloc: ImageMemoryAllocation,
    pub extent: ImageExtent,
}

/// Handle to compiled geometry.
pub type GeometryHandle = Handle<Tracked<GeometryData>>;

/// Handle to a texture.
pub type TextureHandle = Handle<Tracked<TextureData>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetiredResource {
    Geometry(GeometryHandle),
    Texture(TextureHandle),
}

/// Owner of every GPU resource the UI renderer creates.
///
/// Single-threaded: all methods take `&mut self` and must be called from the
/// render thread.
pub struct RenderResources {
    device: Arc<dyn GpuDevice>,
    config: PoolConfig,
    memory_properties: MemoryProperties,
    buffer_pool: BufferPool,
    image_pool: ImageMemoryPool,
    immediate: ImmediateUploader,
    batch: BatchedUploader,
    garbage: GarbageRing<RetiredResource>,
    geometry: SlotMap<Tracked<GeometryData>>,
    textures: SlotMap<Tracked<TextureData>>,
    white_texture: TextureHandle,
    inside_frame: bool,
    shut_down: bool,
}

impl RenderResources {
    /// Build the pools, uploaders and garbage ring, then create the 1x1 white
    /// fallback texture.
    pub fn new(device: Arc<dyn GpuDevice>, config: PoolConfig) -> Result<Self, ResourceError> {
        let memory_properties = device.memory_properties();
        let granularity = device.buffer_image_granularity();

        let buffer_pool = BufferPool::new(device.clone(), memory_properties.clone(), config.buffer_chunk_size);
        let image_pool = ImageMemoryPool::new(
            device.clone(),
            memory_properties.clone(),
            granularity,
            config.image_page_size,
        );
        let batch = BatchedUploader::new(&*device).map_err(|err| {
            fp_emit_ctx!(FP401, "upload batch setup: {}", err);
            ResourceError::FallbackTexture(Box::new(err))
        })?;

        let mut resources = Self {
            device,
            garbage: GarbageRing::new(config.garbage_slots),
            config,
            memory_properties,
            buffer_pool,
            image_pool,
            immediate: ImmediateUploader::new(),
            batch,
            geometry: SlotMap::new(),
            textures: SlotMap::new(),
            white_texture: Handle::dangling(),
            inside_frame: false,
            shut_down: false,
        };

        match resources.create_texture(&WHITE_PIXEL, ImageExtent::new(1, 1)) {
            Ok(handle) => {
                resources.white_texture = handle;
                Ok(resources)
            }
            Err(err) => {
                fp_emit_ctx!(FP401, "{}", err);
                Err(ResourceError::FallbackTexture(Box::new(err)))
            }
        }
    }

    /// Start recording a frame. Texture uploads are batched until
    /// [`end_frame`](Self::end_frame).
    pub fn begin_frame(&mut self) {
        debug_assert!(!self.inside_frame, "begin_frame called twice");
        self.inside_frame = true;
    }

    /// Finish the frame and submit the upload batch.
    ///
    /// A failed flush has already been reported; the affected textures stay
    /// valid without pixels.
    pub fn end_frame(&mut self) {
        debug_assert!(self.inside_frame, "end_frame without begin_frame");
        self.inside_frame = false;
        let _ = self.batch.flush(&*self.device);
    }

    pub fn is_inside_frame(&self) -> bool {
        self.inside_frame
    }

    /// Upload strategy a texture generated now would take.
    pub fn upload_mode(&self) -> UploadMode {
        UploadMode::for_frame(self.inside_frame)
    }

    /// Copy vertices and indices into the geometry pool.
    pub fn compile_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<GeometryHandle, ResourceError> {
        debug_assert!(!self.shut_down, "compile_geometry after shutdown");

        let vertex_bytes = as_bytes(vertices);
        let index_bytes = as_bytes(indices);

        let vertex_alloc = self
            .buffer_pool
            .allocate(vertex_bytes.len() as u64, self.config.vertex_alignment)
            .map_err(|err| dropped_geometry(err.into(), vertices.len(), indices.len()))?;

        let index_alloc = match self
            .buffer_pool
            .allocate(index_bytes.len() as u64, self.config.index_alignment)
        {
            Ok(alloc) => alloc,
            Err(err) => {
                self.buffer_pool.free(&vertex_alloc);
                return Err(dropped_geometry(err.into(), vertices.len(), indices.len()));
            }
        };

        // SAFETY: both ranges were just allocated with exactly these sizes
        unsafe {
            vertex_alloc.write_bytes(0, vertex_bytes);
            index_alloc.write_bytes(0, index_bytes);
        }

        Ok(self.geometry.insert(Tracked::live(GeometryData {
            vertex_alloc,
            index_alloc,
            index_count: indices.len() as u32,
        })))
    }

    /// Live geometry behind `handle`.
    pub fn geometry(&self, handle: GeometryHandle) -> Option<&GeometryData> {
        live_data(self.geometry.get(handle))
    }

    /// Lifecycle state of `handle`, `None` once destroyed.
    pub fn geometry_state(&self, handle: GeometryHandle) -> Option<ResourceState> {
        self.geometry.get(handle).map(Tracked::state)
    }

    /// Retire geometry. Returns `false` if the handle is not live.
    pub fn release_geometry(&mut self, handle: GeometryHandle) -> bool {
        match self.geometry.get_mut(handle) {
            Some(tracked) if tracked.state == ResourceState::Live => {
                tracked.state = ResourceState::Retired;
                self.garbage.push(RetiredResource::Geometry(handle));
                true
            }
            _ => false,
        }
    }

    /// Create a texture from tightly packed RGBA8 pixels.
    ///
    /// Inside a frame the upload is staged for the end-of-frame batch;
    /// outside it is submitted immediately.
    pub fn generate_texture(&mut self, data: &[u8], width: u32, height: u32) -> Result<TextureHandle, ResourceError> {
        debug_assert!(!self.shut_down, "generate_texture after shutdown");

        self.create_texture(data, ImageExtent::new(width, height))
            .map_err(|err| {
                if !err.is_invalid_input() {
                    fp_emit_ctx!(FP403, "{}x{} texture: {}", width, height, err);
                }
                err
            })
    }

    fn create_texture(&mut self, data: &[u8], extent: ImageExtent) -> Result<TextureHandle, ResourceError> {
        if extent.width == 0 || extent.height == 0 {
            return Err(ResourceError::InvalidDimensions);
        }
        let expected = extent.rgba8_bytes();
        if data.len() as u64 != expected {
            return Err(ResourceError::DataSizeMismatch {
                expected,
                actual: data.len() as u64,
            });
        }

        let staging = StagingBuffer::create(&*self.device, &self.memory_properties, data)?;
        let texture = match self.create_texture_objects(extent) {
            Ok(texture) => texture,
            Err(err) => {
                staging.destroy(&*self.device);
                return Err(err);
            }
        };

        match self.upload_mode() {
            UploadMode::Batched => self.batch.stage(staging, texture.image, extent),
            UploadMode::Immediate => {
                if let Err(err) = self.immediate.upload(&*self.device, staging, texture.image, extent) {
                    self.destroy_texture_data(&texture);
                    return Err(err);
                }
            }
        }

        Ok(self.textures.insert(Tracked::live(texture)))
    }

    fn create_texture_objects(&mut self, extent: ImageExtent) -> Result<TextureData, ResourceError> {
        let image = self.device.create_image(extent)?;
        let requirements = self.device.image_memory_requirements(image);
        let memory_alloc = match self
            .image_pool
            .allocate(&requirements, MemoryPropertyFlags::DEVICE_LOCAL)
        {
            Ok(alloc) => alloc,
            Err(err) => {
                self.device.destroy_image(image);
                return Err(err.into());
            }
        };

        let mut texture = TextureData {
            image,
            view: ImageViewHandle::NULL,
            descriptor_set: DescriptorSetHandle::NULL,
            memory_alloc,
            extent,
        };
        if let Err(err) = self.bind_texture_objects(&mut texture) {
            self.destroy_texture_data(&texture);
            return Err(err.into());
        }
        Ok(texture)
    }

    fn bind_texture_objects(&self, texture: &mut TextureData) -> Result<(), GpuError> {
        self.device
            .bind_image_memory(texture.image, texture.memory_alloc.memory, texture.memory_alloc.offset)?;
        texture.view = self.device.create_image_view(texture.image)?;
        texture.descriptor_set = self.device.allocate_descriptor_set(texture.view)?;
        Ok(())
    }

    /// Live texture behind `handle`.
    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureData> {
        live_data(self.textures.get(handle))
    }

    /// Lifecycle state of `handle`, `None` once destroyed.
    pub fn texture_state(&self, handle: TextureHandle) -> Option<ResourceState> {
        self.textures.get(handle).map(Tracked::state)
    }

    /// Retire a texture. The fallback texture is never released.
    pub fn release_texture(&mut self, handle: TextureHandle) -> bool {
        if handle == self.white_texture {
            return false;
        }
        match self.textures.get_mut(handle) {
            Some(tracked) if tracked.state == ResourceState::Live => {
                tracked.state = ResourceState::Retired;
                self.garbage.push(RetiredResource::Texture(handle));
                true
            }
            _ => false,
        }
    }

    /// Handle of the 1x1 white fallback texture.
    pub fn white_texture(&self) -> TextureHandle {
        self.white_texture
    }

    /// Texture to bind for a draw: `handle` if it is live, the fallback otherwise.
    ///
    /// Only `None` after shutdown.
    pub fn resolve_texture(&self, handle: Option<TextureHandle>) -> Option<&TextureData> {
        handle
            .and_then(|handle| self.texture(handle))
            .or_else(|| self.texture(self.white_texture))
    }

    /// Submit staged uploads now instead of at the end of the frame.
    pub fn flush_pending_uploads(&mut self) -> Result<usize, ResourceError> {
        self.batch.flush(&*self.device)
    }

    /// Per-frame reclamation.
    ///
    /// Call once per rendered frame, after that frame's fence is known to be
    /// signaled. Never blocks.
    pub fn collect_garbage(&mut self) {
        self.batch.poll(&*self.device);
        self.immediate.poll(&*self.device);

        for retired in self.garbage.advance() {
            self.destroy_retired(retired);
        }
    }

    fn destroy_retired(&mut self, retired: RetiredResource) {
        match retired {
            RetiredResource::Geometry(handle) => {
                if let Some(tracked) = self.geometry.remove(handle) {
                    self.destroy_geometry_data(&tracked.data);
                }
            }
            RetiredResource::Texture(handle) => {
                if let Some(tracked) = self.textures.remove(handle) {
                    self.destroy_texture_data(&tracked.data);
                }
            }
        }
    }

    fn destroy_geometry_data(&mut self, geometry: &GeometryData) {
        self.buffer_pool.free(&geometry.vertex_alloc);
        self.buffer_pool.free(&geometry.index_alloc);
    }

    fn destroy_texture_data(&mut self, texture: &TextureData) {
        self.batch.discard_staged_for(&*self.device, texture.image);
        if !texture.descriptor_set.is_null() {
            self.device.free_descriptor_set(texture.descriptor_set);
        }
        if !texture.view.is_null() {
            self.device.destroy_image_view(texture.view);
        }
        self.device.destroy_image(texture.image);
        self.image_pool.free(&texture.memory_alloc);
    }

    /// Index of the garbage slot releases currently go to.
    pub fn current_garbage_slot(&self) -> usize {
        self.garbage.current_slot()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn image_pool(&self) -> &ImageMemoryPool {
        &self.image_pool
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            live_geometry: count_live(&self.geometry),
            live_textures: count_live(&self.textures),
            retired_pending: self.garbage.pending(),
            pending_immediate_uploads: self.immediate.pending(),
            staged_uploads: self.batch.staged_count(),
            in_flight_batch_uploads: self.batch.in_flight_count(),
            batches_submitted: self.batch.batches_submitted(),
            buffer_pool: self.buffer_pool.stats(),
            image_pool: self.image_pool.stats(),
        }
    }

    /// Destroy everything. The caller must have idled the device.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.inside_frame = false;

        self.immediate.destroy_all(&*self.device);
        self.batch.destroy_all(&*self.device);

        // retired handles are still in the maps, so draining the maps covers them
        self.garbage.drain_all();
        for (_, tracked) in self.geometry.drain() {
            self.destroy_geometry_data(&tracked.data);
        }
        for (_, tracked) in self.textures.drain() {
            self.destroy_texture_data(&tracked.data);
        }
        self.white_texture = Handle::dangling();

        self.buffer_pool.shutdown();
        self.image_pool.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for RenderResources {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RenderResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderResources")
            .field("config", &self.config)
            .field("geometry", &self.geometry.len())
            .field("textures", &self.textures.len())
            .field("garbage_pending", &self.garbage.pending())
            .field("inside_frame", &self.inside_frame)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

fn dropped_geometry(err: ResourceError, vertices: usize, indices: usize) -> ResourceError {
    if !err.is_invalid_input() {
        fp_emit_ctx!(FP402, "{} vertices, {} indices: {}", vertices, indices, err);
    }
    err
}

fn live_data<T>(tracked: Option<&Tracked<T>>) -> Option<&T> {
    tracked
        .filter(|tracked| tracked.state == ResourceState::Live)
        .map(Tracked::data)
}

fn count_live<T>(map: &SlotMap<Tracked<T>>) -> usize {
    map.iter()
        .filter(|(_, tracked)| tracked.state == ResourceState::Live)
        .count()
}

/// View a slice of padding-free plain data as bytes.
fn as_bytes<T: Copy>(values: &[T]) -> &[u8] {
    // SAFETY: only used with `u32` and `Vertex`, which is `repr(C)` without padding
    unsafe { std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), std::mem::size_of_val(values)) }
}
