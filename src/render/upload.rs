//! Texture upload pipeline.
//!
//! Pixels reach an image through a host-visible staging buffer and a
//! buffer-to-image copy bracketed by two layout transitions. Two strategies
//! exist:
//!
//! - [`ImmediateUploader`]: one transient command pool, command buffer and
//!   fence per upload, submitted right away. Used outside a frame.
//! - [`BatchedUploader`]: uploads staged during a frame are recorded into one
//!   persistent command buffer and submitted once per flush, guarded by a
//!   single fence.
//!
//! Staging memory is only released after the fence of the submission that
//! reads it has been observed signaled.

use crate::diagnostics::macros::fp_emit_ctx;
use crate::gpu::memory::{BufferUsage, MemoryProperties, MemoryPropertyFlags};
use crate::gpu::traits::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, FenceHandle, GpuDevice, GpuError, ImageExtent,
    ImageHandle, LayoutTransition, MemoryHandle,
};
use crate::gpu::PoolError;

use super::error::ResourceError;

/// Which upload strategy a texture takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Submit now with a dedicated fence.
    Immediate,
    /// Stage until the next flush.
    Batched,
}

impl UploadMode {
    /// Batched inside a frame, immediate outside.
    pub fn for_frame(inside_frame: bool) -> Self {
        if inside_frame {
            UploadMode::Batched
        } else {
            UploadMode::Immediate
        }
    }
}

/// A transfer-source buffer holding one texture's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingBuffer {
    pub buffer: BufferHandle,
    pub memory: MemoryHandle,
    pub size: u64,
}

impl StagingBuffer {
    const MEMORY_FLAGS: MemoryPropertyFlags =
        MemoryPropertyFlags::HOST_VISIBLE.union(MemoryPropertyFlags::HOST_COHERENT);

    /// Create a staging buffer and fill it with `data` through a temporary mapping.
    pub fn create(
        device: &dyn GpuDevice,
        memory_properties: &MemoryProperties,
        data: &[u8],
    ) -> Result<Self, ResourceError> {
        let size = data.len() as u64;
        Self::create_inner(device, memory_properties, data).map_err(|err| {
            fp_emit_ctx!(FP303, "{} bytes: {}", size, err);
            err
        })
    }

    fn create_inner(
        device: &dyn GpuDevice,
        memory_properties: &MemoryProperties,
        data: &[u8],
    ) -> Result<Self, ResourceError> {
        let size = data.len() as u64;
        let buffer = device.create_buffer(size, BufferUsage::TRANSFER_SRC)?;
        let req = device.buffer_memory_requirements(buffer);

        let Some(memory_type_index) = memory_properties.find_memory_type(req.memory_type_bits, Self::MEMORY_FLAGS)
        else {
            device.destroy_buffer(buffer);
            return Err(PoolError::NoSuitableMemoryType {
                type_filter: req.memory_type_bits,
                required: Self::MEMORY_FLAGS,
            }
            .into());
        };

        let memory = match device.allocate_memory(req.size, memory_type_index) {
            Ok(memory) => memory,
            Err(err) => {
                device.destroy_buffer(buffer);
                return Err(err.into());
            }
        };

        let staging = Self { buffer, memory, size };
        let filled = device
            .bind_buffer_memory(buffer, memory, 0)
            .and_then(|()| device.map_memory(memory, 0, size));
        match filled {
            Ok(ptr) => {
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
                device.unmap_memory(memory);
                Ok(staging)
            }
            Err(err) => {
                staging.destroy(device);
                Err(err.into())
            }
        }
    }

    /// Destroy the buffer and free its memory.
    pub fn destroy(self, device: &dyn GpuDevice) {
        device.destroy_buffer(self.buffer);
        device.free_memory(self.memory);
    }
}

fn record_upload(
    device: &dyn GpuDevice,
    cmd: CommandBufferHandle,
    staging: BufferHandle,
    image: ImageHandle,
    extent: ImageExtent,
) {
    device.cmd_image_barrier(cmd, image, LayoutTransition::UndefinedToTransferDst);
    device.cmd_copy_buffer_to_image(cmd, staging, image, extent);
    device.cmd_image_barrier(cmd, image, LayoutTransition::TransferDstToShaderRead);
}

/// An immediate upload whose fence has not been observed signaled.
#[derive(Debug)]
pub struct PendingUpload {
    staging: StagingBuffer,
    command_pool: CommandPoolHandle,
    fence: FenceHandle,
}

impl PendingUpload {
    fn destroy(self, device: &dyn GpuDevice) {
        device.destroy_fence(self.fence);
        device.destroy_command_pool(self.command_pool);
        self.staging.destroy(device);
    }
}

/// Per-upload submission with its own command pool and fence.
#[derive(Debug, Default)]
pub struct ImmediateUploader {
    pending: Vec<PendingUpload>,
}

impl ImmediateUploader {
    /// Create an uploader with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and submit the copy of `staging` into `image`.
    ///
    /// Takes ownership of `staging`. On failure every object created here,
    /// staging included, is released and the image keeps no pixels; the
    /// caller decides what to do with it.
    pub fn upload(
        &mut self,
        device: &dyn GpuDevice,
        staging: StagingBuffer,
        image: ImageHandle,
        extent: ImageExtent,
    ) -> Result<(), ResourceError> {
        let command_pool = match device.create_command_pool(true) {
            Ok(pool) => pool,
            Err(err) => {
                staging.destroy(device);
                fp_emit_ctx!(FP302, "command pool creation: {}", err);
                return Err(err.into());
            }
        };

        let mut fence = FenceHandle::NULL;
        let submitted = (|| -> Result<(), GpuError> {
            let cmd = device.allocate_command_buffer(command_pool)?;
            device.begin_command_buffer(cmd)?;
            record_upload(device, cmd, staging.buffer, image, extent);
            device.end_command_buffer(cmd)?;
            fence = device.create_fence(false)?;
            device.queue_submit(cmd, fence)
        })();

        match submitted {
            Ok(()) => {
                self.pending.push(PendingUpload {
                    staging,
                    command_pool,
                    fence,
                });
                Ok(())
            }
            Err(err) => {
                fp_emit_ctx!(FP302, "{}x{} texture: {}", extent.width, extent.height, err);
                PendingUpload {
                    staging,
                    command_pool,
                    fence,
                }
                .destroy(device);
                Err(err.into())
            }
        }
    }

    /// Release every upload whose fence is signaled. Returns how many completed.
    pub fn poll(&mut self, device: &dyn GpuDevice) -> usize {
        let before = self.pending.len();
        let (done, still_pending): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|upload| matches!(device.fence_status(upload.fence), Ok(true)));
        self.pending = still_pending;
        for upload in done {
            upload.destroy(device);
        }
        before - self.pending.len()
    }

    /// Uploads not yet observed complete.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Release everything. The device must be idle.
    pub fn destroy_all(&mut self, device: &dyn GpuDevice) {
        for upload in self.pending.drain(..) {
            upload.destroy(device);
        }
    }
}

/// An upload waiting for the next batch flush.
#[derive(Debug, Clone, Copy)]
pub struct StagedUpload {
    pub staging: StagingBuffer,
    pub image: ImageHandle,
    pub extent: ImageExtent,
}

/// One command buffer, one submission per flush.
#[derive(Debug)]
pub struct BatchedUploader {
    command_pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
    fence: FenceHandle,
    fence_pending: bool,
    staged: Vec<StagedUpload>,
    previous_batch: Vec<StagingBuffer>,
    batches_submitted: u64,
}

impl BatchedUploader {
    /// Create the persistent command pool, command buffer and fence.
    pub fn new(device: &dyn GpuDevice) -> Result<Self, ResourceError> {
        let command_pool = device.create_command_pool(false)?;
        let created = device
            .allocate_command_buffer(command_pool)
            .and_then(|cmd| device.create_fence(false).map(|fence| (cmd, fence)));

        match created {
            Ok((command_buffer, fence)) => Ok(Self {
                command_pool,
                command_buffer,
                fence,
                fence_pending: false,
                staged: Vec::new(),
                previous_batch: Vec::new(),
                batches_submitted: 0,
            }),
            Err(err) => {
                device.destroy_command_pool(command_pool);
                Err(err.into())
            }
        }
    }

    /// Queue an upload for the next flush.
    pub fn stage(&mut self, staging: StagingBuffer, image: ImageHandle, extent: ImageExtent) {
        self.staged.push(StagedUpload { staging, image, extent });
    }

    /// Drop staged uploads targeting `image`, releasing their staging.
    ///
    /// Used when an image is destroyed before its batch was flushed.
    pub fn discard_staged_for(&mut self, device: &dyn GpuDevice, image: ImageHandle) {
        self.staged.retain(|upload| {
            if upload.image == image {
                upload.staging.destroy(device);
                false
            } else {
                true
            }
        });
    }

    /// Record and submit every staged upload. Returns how many were submitted.
    ///
    /// Blocks only when the previous batch is still in flight. On failure the
    /// staged uploads are dropped: their images keep views and descriptors
    /// but no pixels.
    pub fn flush(&mut self, device: &dyn GpuDevice) -> Result<usize, ResourceError> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        match self.submit_staged(device) {
            Ok(()) => {
                let count = self.staged.len();
                self.previous_batch
                    .extend(self.staged.drain(..).map(|upload| upload.staging));
                self.fence_pending = true;
                self.batches_submitted += 1;
                Ok(count)
            }
            Err(err) => {
                fp_emit_ctx!(FP301, "{} staged uploads: {}", self.staged.len(), err);
                for upload in self.staged.drain(..) {
                    upload.staging.destroy(device);
                }
                Err(err.into())
            }
        }
    }

    fn submit_staged(&mut self, device: &dyn GpuDevice) -> Result<(), GpuError> {
        if self.fence_pending {
            device.wait_for_fence(self.fence)?;
            self.release_previous_batch(device);
        }

        device.reset_fence(self.fence)?;
        device.reset_command_pool(self.command_pool)?;
        device.begin_command_buffer(self.command_buffer)?;
        for upload in &self.staged {
            record_upload(
                device,
                self.command_buffer,
                upload.staging.buffer,
                upload.image,
                upload.extent,
            );
        }
        device.end_command_buffer(self.command_buffer)?;
        device.queue_submit(self.command_buffer, self.fence)
    }

    /// Release the previous batch's staging if its fence is signaled.
    ///
    /// Returns `true` if a batch completed.
    pub fn poll(&mut self, device: &dyn GpuDevice) -> bool {
        if self.fence_pending && matches!(device.fence_status(self.fence), Ok(true)) {
            self.release_previous_batch(device);
            return true;
        }
        false
    }

    fn release_previous_batch(&mut self, device: &dyn GpuDevice) {
        for staging in self.previous_batch.drain(..) {
            staging.destroy(device);
        }
        self.fence_pending = false;
    }

    /// Uploads waiting for the next flush.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Staging buffers of the submitted batch still in flight.
    pub fn in_flight_count(&self) -> usize {
        self.previous_batch.len()
    }

    /// Whether the last submitted batch has not been observed complete.
    pub fn is_fence_pending(&self) -> bool {
        self.fence_pending
    }

    /// Number of successful flushes.
    pub fn batches_submitted(&self) -> u64 {
        self.batches_submitted
    }

    /// Release everything, including the command pool and fence.
    ///
    /// The device must be idle. Safe to call more than once.
    pub fn destroy_all(&mut self, device: &dyn GpuDevice) {
        for upload in self.staged.drain(..) {
            upload.staging.destroy(device);
        }
        self.release_previous_batch(device);

        if !self.fence.is_null() {
            device.destroy_fence(self.fence);
            self.fence = FenceHandle::NULL;
        }
        if !self.command_pool.is_null() {
            device.destroy_command_pool(self.command_pool);
            self.command_pool = CommandPoolHandle::NULL;
            self.command_buffer = CommandBufferHandle::NULL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, SinkGuard};
    use crate::gpu::dummy::{DummyDevice, DummyImageLayout, DummyOp};
    use std::sync::Arc;

    fn staged_image(device: &DummyDevice, pixels: &[u8], extent: ImageExtent) -> (StagingBuffer, ImageHandle) {
        let staging = StagingBuffer::create(device, &device.memory_properties(), pixels).unwrap();
        let image = device.create_image(extent).unwrap();
        (staging, image)
    }

    #[test]
    fn test_upload_mode_selection() {
        assert_eq!(UploadMode::for_frame(true), UploadMode::Batched);
        assert_eq!(UploadMode::for_frame(false), UploadMode::Immediate);
    }

    #[test]
    fn test_staging_buffer_holds_data() {
        let device = DummyDevice::new();
        let staging = StagingBuffer::create(&device, &device.memory_properties(), &[1, 2, 3, 4]).unwrap();

        assert_eq!(device.read_memory(staging.memory, 0, 4), Some(vec![1, 2, 3, 4]));
        assert!(!device.is_mapped(staging.memory));

        staging.destroy(&device);
        assert!(device.live_objects().is_empty());
    }

    #[test]
    fn test_staging_failure_cleans_up() {
        let device = DummyDevice::new();
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());

        device.fail_next(DummyOp::MapMemory);
        assert!(StagingBuffer::create(&device, &device.memory_properties(), &[0; 16]).is_err());
        assert!(sink.contains("FP303"));
        assert!(device.live_objects().is_empty());
    }

    #[test]
    fn test_immediate_upload_lifecycle() {
        let device = DummyDevice::new();
        device.set_auto_signal(false);
        let extent = ImageExtent::new(1, 1);
        let (staging, image) = staged_image(&device, &[9, 8, 7, 6], extent);

        let mut uploader = ImmediateUploader::new();
        uploader.upload(&device, staging, image, extent).unwrap();

        assert_eq!(device.submit_count(), 1);
        assert_eq!(device.image_contents(image), Some(vec![9, 8, 7, 6]));
        assert_eq!(device.image_layout(image), Some(DummyImageLayout::ShaderReadOnly));

        // not signaled yet: staging, pool and fence stay alive
        assert_eq!(uploader.poll(&device), 0);
        assert_eq!(uploader.pending(), 1);

        device.signal_all_fences();
        assert_eq!(uploader.poll(&device), 1);
        assert_eq!(uploader.pending(), 0);

        device.destroy_image(image);
        assert!(device.live_objects().is_empty());
    }

    #[test]
    fn test_immediate_submit_failure_releases_everything() {
        let device = DummyDevice::new();
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());
        let extent = ImageExtent::new(1, 1);
        let (staging, image) = staged_image(&device, &[0; 4], extent);

        device.fail_next(DummyOp::QueueSubmit);
        let mut uploader = ImmediateUploader::new();
        assert!(uploader.upload(&device, staging, image, extent).is_err());

        assert!(sink.contains("FP302"));
        assert_eq!(uploader.pending(), 0);
        device.destroy_image(image);
        assert!(device.live_objects().is_empty());
    }

    #[test]
    fn test_batch_submits_once_per_flush() {
        let device = DummyDevice::new();
        let extent = ImageExtent::new(1, 1);
        let mut batch = BatchedUploader::new(&device).unwrap();

        let mut images = Vec::new();
        for i in 0..3u8 {
            let (staging, image) = staged_image(&device, &[i; 4], extent);
            batch.stage(staging, image, extent);
            images.push(image);
        }
        assert_eq!(device.submit_count(), 0);
        assert_eq!(batch.staged_count(), 3);

        assert_eq!(batch.flush(&device).unwrap(), 3);
        assert_eq!(device.submit_count(), 1);
        assert_eq!(batch.in_flight_count(), 3);
        assert!(batch.is_fence_pending());
        for (i, image) in images.iter().enumerate() {
            assert_eq!(device.image_contents(*image), Some(vec![i as u8; 4]));
        }

        // empty flush is a no-op
        assert_eq!(batch.flush(&device).unwrap(), 0);
        assert_eq!(device.submit_count(), 1);
    }

    #[test]
    fn test_flush_waits_for_previous_batch() {
        let device = DummyDevice::new();
        device.set_auto_signal(false);
        let extent = ImageExtent::new(1, 1);
        let mut batch = BatchedUploader::new(&device).unwrap();

        let (staging, image) = staged_image(&device, &[1; 4], extent);
        batch.stage(staging, image, extent);
        batch.flush(&device).unwrap();
        assert!(!batch.poll(&device));
        assert_eq!(device.wait_count(), 0);

        let (staging, image) = staged_image(&device, &[2; 4], extent);
        batch.stage(staging, image, extent);
        batch.flush(&device).unwrap();

        // back-pressure: the second flush waited and freed the first batch
        assert_eq!(device.wait_count(), 1);
        assert_eq!(batch.in_flight_count(), 1);
        assert_eq!(device.submit_count(), 2);
    }

    #[test]
    fn test_poll_releases_signaled_batch_without_waiting() {
        let device = DummyDevice::new();
        let extent = ImageExtent::new(1, 1);
        let mut batch = BatchedUploader::new(&device).unwrap();

        let (staging, image) = staged_image(&device, &[1; 4], extent);
        batch.stage(staging, image, extent);
        batch.flush(&device).unwrap();

        assert!(batch.poll(&device));
        assert!(!batch.is_fence_pending());
        assert_eq!(batch.in_flight_count(), 0);

        let (staging, image) = staged_image(&device, &[2; 4], extent);
        batch.stage(staging, image, extent);
        batch.flush(&device).unwrap();
        assert_eq!(device.wait_count(), 0);
    }

    #[test]
    fn test_flush_failure_drops_batch_without_pending_fence() {
        let device = DummyDevice::new();
        let sink = Arc::new(CollectingSink::new());
        let _guard = SinkGuard::install(sink.clone());
        let extent = ImageExtent::new(1, 1);
        let mut batch = BatchedUploader::new(&device).unwrap();

        let (staging, image) = staged_image(&device, &[5; 4], extent);
        batch.stage(staging, image, extent);

        device.fail_next(DummyOp::QueueSubmit);
        assert!(batch.flush(&device).is_err());

        assert!(sink.contains("FP301"));
        assert!(!batch.is_fence_pending());
        assert_eq!(batch.staged_count(), 0);
        assert_eq!(batch.in_flight_count(), 0);
        assert_eq!(device.live_objects().buffers, 0);
        // image survives without pixels
        assert_eq!(device.image_contents(image), Some(Vec::new()));

        // the next batch goes through without waiting on the failed one
        let (staging, image) = staged_image(&device, &[6; 4], extent);
        batch.stage(staging, image, extent);
        batch.flush(&device).unwrap();
        assert_eq!(device.wait_count(), 0);
        assert_eq!(device.image_contents(image), Some(vec![6; 4]));
    }

    #[test]
    fn test_discard_staged_for_image() {
        let device = DummyDevice::new();
        let extent = ImageExtent::new(1, 1);
        let mut batch = BatchedUploader::new(&device).unwrap();

        let (staging_a, image_a) = staged_image(&device, &[1; 4], extent);
        let (staging_b, image_b) = staged_image(&device, &[2; 4], extent);
        batch.stage(staging_a, image_a, extent);
        batch.stage(staging_b, image_b, extent);

        batch.discard_staged_for(&device, image_a);
        assert_eq!(batch.staged_count(), 1);
        assert_eq!(device.live_objects().buffers, 1);
    }

    #[test]
    fn test_destroy_all_is_idempotent() {
        let device = DummyDevice::new();
        let extent = ImageExtent::new(1, 1);
        let mut batch = BatchedUploader::new(&device).unwrap();

        let (staging, image) = staged_image(&device, &[1; 4], extent);
        batch.stage(staging, image, extent);
        batch.flush(&device).unwrap();
        let (staging, _) = staged_image(&device, &[1; 4], extent);
        batch.stage(staging, image, extent);

        batch.destroy_all(&device);
        batch.destroy_all(&device);

        let live = device.live_objects();
        assert_eq!(live.buffers, 0);
        assert_eq!(live.memories, 0);
        assert_eq!(live.command_pools, 0);
        assert_eq!(live.fences, 0);
    }
}
