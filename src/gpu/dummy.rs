//! Dummy device implementation for testing
//!
//! This device keeps every object as plain bookkeeping and doesn't require actual GPU hardware.
//! Host-visible memory objects are backed by `Vec<u8>` storage, so mapped
//! pointers are real and writes through them can be inspected. Submitted
//! command buffers execute their barriers and copies at submit time.
//!
//! Tests use the extra controls on [`DummyDevice`]: live object counts,
//! submit and wait counters, manual fence signaling and failure injection.

use std::collections::{HashMap, HashSet};

use super::memory::{BufferUsage, MemoryProperties, MemoryPropertyFlags, MemoryRequirements};
use super::traits::*;
use crate::sync::mutex::Mutex;
use crate::util::layout::align_up;
use crate::util::size::mb;

/// Device operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DummyOp {
    CreateBuffer,
    AllocateMemory,
    BindBufferMemory,
    MapMemory,
    CreateImage,
    BindImageMemory,
    CreateImageView,
    AllocateDescriptorSet,
    CreateCommandPool,
    ResetCommandPool,
    AllocateCommandBuffer,
    BeginCommandBuffer,
    EndCommandBuffer,
    QueueSubmit,
    CreateFence,
    WaitForFence,
    ResetFence,
}

impl DummyOp {
    fn default_error(self) -> GpuError {
        match self {
            DummyOp::AllocateMemory | DummyOp::CreateImage | DummyOp::CreateBuffer => GpuError::OutOfDeviceMemory,
            DummyOp::MapMemory => GpuError::MapFailed,
            DummyOp::QueueSubmit | DummyOp::WaitForFence => GpuError::DeviceLost,
            _ => GpuError::OutOfHostMemory,
        }
    }
}

/// Layout an image was last transitioned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyImageLayout {
    Undefined,
    TransferDst,
    ShaderReadOnly,
}

/// Counts of live objects on a [`DummyDevice`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveObjects {
    pub buffers: usize,
    pub memories: usize,
    pub images: usize,
    pub image_views: usize,
    pub descriptor_sets: usize,
    pub command_pools: usize,
    pub fences: usize,
}

impl LiveObjects {
    /// Sum of all counts.
    pub fn total(&self) -> usize {
        self.buffers
            + self.memories
            + self.images
            + self.image_views
            + self.descriptor_sets
            + self.command_pools
            + self.fences
    }

    /// Whether nothing is alive.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug)]
struct DummyMemory {
    /// Empty for memory that is not host-visible
    data: Vec<u8>,
    size: u64,
    memory_type_index: u32,
    mapped: bool,
}

#[derive(Debug)]
struct DummyBuffer {
    size: u64,
    #[allow(dead_code)]
    usage: BufferUsage,
    binding: Option<(MemoryHandle, u64)>,
}

#[derive(Debug)]
struct DummyImage {
    extent: ImageExtent,
    binding: Option<(MemoryHandle, u64)>,
    layout: DummyImageLayout,
    contents: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Recorded {
    Barrier {
        image: ImageHandle,
        transition: LayoutTransition,
    },
    Copy {
        src: BufferHandle,
        dst: ImageHandle,
        extent: ImageExtent,
    },
}

#[derive(Debug)]
struct DummyCommandBuffer {
    pool: CommandPoolHandle,
    commands: Vec<Recorded>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    memory_properties: MemoryProperties,
    granularity: u64,
    buffer_alignment: u64,
    image_alignment: u64,
    image_type_bits: Option<u32>,
    memory_budget: Option<u64>,
    memory_in_use: u64,

    buffers: HashMap<u64, DummyBuffer>,
    memories: HashMap<u64, DummyMemory>,
    images: HashMap<u64, DummyImage>,
    views: HashMap<u64, ImageHandle>,
    descriptor_sets: HashMap<u64, ImageViewHandle>,
    command_pools: HashSet<u64>,
    command_buffers: HashMap<u64, DummyCommandBuffer>,
    /// Fence id to signaled state
    fences: HashMap<u64, bool>,

    auto_signal: bool,
    failures: Vec<(DummyOp, GpuError)>,

    submit_count: usize,
    wait_count: usize,
    memory_allocation_count: usize,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_failure(&mut self, op: DummyOp) -> Result<(), GpuError> {
        match self.failures.iter().position(|(o, _)| *o == op) {
            Some(index) => Err(self.failures.remove(index).1),
            None => Ok(()),
        }
    }

    fn all_types_mask(&self) -> u32 {
        let count = self.memory_properties.memory_types.len();
        if count >= 32 {
            u32::MAX
        } else {
            (1u32 << count) - 1
        }
    }

    fn memory_bytes(&self, memory: MemoryHandle, offset: u64, len: u64) -> Option<&[u8]> {
        let memory = self.memories.get(&memory.0)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        memory.data.get(start..end)
    }

    fn execute(&mut self, commands: &[Recorded]) {
        for command in commands {
            match *command {
                Recorded::Barrier { image, transition } => {
                    if let Some(image) = self.images.get_mut(&image.0) {
                        image.layout = match transition {
                            LayoutTransition::UndefinedToTransferDst => DummyImageLayout::TransferDst,
                            LayoutTransition::TransferDstToShaderRead => DummyImageLayout::ShaderReadOnly,
                        };
                    }
                }
                Recorded::Copy { src, dst, extent } => {
                    let Some((memory, offset)) = self.buffers.get(&src.0).and_then(|b| b.binding) else {
                        continue;
                    };
                    let bytes = self
                        .memory_bytes(memory, offset, extent.rgba8_bytes())
                        .map(<[u8]>::to_vec);
                    if let (Some(bytes), Some(image)) = (bytes, self.images.get_mut(&dst.0)) {
                        image.contents = bytes;
                    }
                }
            }
        }
    }
}

/// Dummy device for testing
#[derive(Debug)]
pub struct DummyDevice {
    state: Mutex<State>,
}

impl DummyDevice {
    /// Create a device with a discrete-GPU memory layout (256 MiB per heap).
    pub fn new() -> Self {
        Self::with_memory_properties(MemoryProperties::discrete(mb(256), mb(256)))
    }

    /// Create a device exposing `memory_properties`.
    pub fn with_memory_properties(memory_properties: MemoryProperties) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 0,
                memory_properties,
                granularity: 1024,
                buffer_alignment: 256,
                image_alignment: 1024,
                image_type_bits: None,
                memory_budget: None,
                memory_in_use: 0,
                buffers: HashMap::new(),
                memories: HashMap::new(),
                images: HashMap::new(),
                views: HashMap::new(),
                descriptor_sets: HashMap::new(),
                command_pools: HashSet::new(),
                command_buffers: HashMap::new(),
                fences: HashMap::new(),
                auto_signal: true,
                failures: Vec::new(),
                submit_count: 0,
                wait_count: 0,
                memory_allocation_count: 0,
            }),
        }
    }

    /// Set the reported buffer-image granularity.
    pub fn with_buffer_image_granularity(self, granularity: u64) -> Self {
        self.state.lock().granularity = granularity;
        self
    }

    /// Set the alignment reported in image memory requirements.
    pub fn with_image_alignment(self, alignment: u64) -> Self {
        self.state.lock().image_alignment = alignment;
        self
    }

    /// Restrict the memory types images may use.
    pub fn with_image_memory_type_bits(self, bits: u32) -> Self {
        self.state.lock().image_type_bits = Some(bits);
        self
    }

    /// Fail memory allocations once `bytes` are in use.
    pub fn with_memory_budget(self, bytes: u64) -> Self {
        self.state.lock().memory_budget = Some(bytes);
        self
    }

    /// When enabled (the default), fences signal as soon as work is submitted.
    pub fn set_auto_signal(&self, auto_signal: bool) {
        self.state.lock().auto_signal = auto_signal;
    }

    /// Signal every fence, completing all submitted work.
    pub fn signal_all_fences(&self) {
        for signaled in self.state.lock().fences.values_mut() {
            *signaled = true;
        }
    }

    /// Make the next `op` fail with its default error.
    pub fn fail_next(&self, op: DummyOp) {
        self.fail_next_with(op, op.default_error());
    }

    /// Make the next `op` fail with `error`.
    pub fn fail_next_with(&self, op: DummyOp, error: GpuError) {
        self.state.lock().failures.push((op, error));
    }

    /// Drop every queued failure.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Count of live objects by kind.
    pub fn live_objects(&self) -> LiveObjects {
        let state = self.state.lock();
        LiveObjects {
            buffers: state.buffers.len(),
            memories: state.memories.len(),
            images: state.images.len(),
            image_views: state.views.len(),
            descriptor_sets: state.descriptor_sets.len(),
            command_pools: state.command_pools.len(),
            fences: state.fences.len(),
        }
    }

    /// Number of successful queue submissions.
    pub fn submit_count(&self) -> usize {
        self.state.lock().submit_count
    }

    /// Number of blocking fence waits.
    pub fn wait_count(&self) -> usize {
        self.state.lock().wait_count
    }

    /// Number of successful memory allocations so far.
    pub fn memory_allocation_count(&self) -> usize {
        self.state.lock().memory_allocation_count
    }

    /// Bytes of device memory currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().memory_in_use
    }

    /// Memory type of a live memory object.
    pub fn memory_type_of(&self, memory: MemoryHandle) -> Option<u32> {
        self.state.lock().memories.get(&memory.0).map(|m| m.memory_type_index)
    }

    /// Size of a live memory object.
    pub fn memory_size(&self, memory: MemoryHandle) -> Option<u64> {
        self.state.lock().memories.get(&memory.0).map(|m| m.size)
    }

    /// Whether a live memory object is mapped.
    pub fn is_mapped(&self, memory: MemoryHandle) -> bool {
        self.state.lock().memories.get(&memory.0).map_or(false, |m| m.mapped)
    }

    /// Copy of host-visible memory contents.
    pub fn read_memory(&self, memory: MemoryHandle, offset: u64, len: u64) -> Option<Vec<u8>> {
        self.state.lock().memory_bytes(memory, offset, len).map(<[u8]>::to_vec)
    }

    /// Texels copied into an image by executed transfers.
    pub fn image_contents(&self, image: ImageHandle) -> Option<Vec<u8>> {
        self.state.lock().images.get(&image.0).map(|i| i.contents.clone())
    }

    /// Current layout of an image.
    pub fn image_layout(&self, image: ImageHandle) -> Option<DummyImageLayout> {
        self.state.lock().images.get(&image.0).map(|i| i.layout)
    }

    /// Memory binding of an image.
    pub fn image_binding(&self, image: ImageHandle) -> Option<(MemoryHandle, u64)> {
        self.state.lock().images.get(&image.0).and_then(|i| i.binding)
    }

    /// Whether a fence exists and is signaled.
    pub fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state.lock().fences.get(&fence.0).copied().unwrap_or(false)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn memory_properties(&self) -> MemoryProperties {
        self.state.lock().memory_properties.clone()
    }

    fn buffer_image_granularity(&self) -> u64 {
        self.state.lock().granularity
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<BufferHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::CreateBuffer)?;
        if size == 0 {
            return Err(GpuError::Backend("zero-sized buffer".to_string()));
        }
        let id = state.next_id();
        state.buffers.insert(
            id,
            DummyBuffer {
                size,
                usage,
                binding: None,
            },
        );
        Ok(BufferHandle(id))
    }

    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> MemoryRequirements {
        let state = self.state.lock();
        let size = state.buffers.get(&buffer.0).map_or(0, |b| b.size);
        MemoryRequirements {
            size: align_up(size, state.buffer_alignment).unwrap_or(size),
            alignment: state.buffer_alignment,
            memory_type_bits: state.all_types_mask(),
        }
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> Result<MemoryHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::AllocateMemory)?;

        let memory_type = state
            .memory_properties
            .memory_types
            .get(memory_type_index as usize)
            .copied()
            .ok_or_else(|| GpuError::Backend(format!("invalid memory type index {}", memory_type_index)))?;

        if let Some(budget) = state.memory_budget {
            if state.memory_in_use.saturating_add(size) > budget {
                return Err(GpuError::OutOfDeviceMemory);
            }
        }

        let data = if memory_type.property_flags.contains(MemoryPropertyFlags::HOST_VISIBLE) {
            let len = usize::try_from(size).map_err(|_| GpuError::OutOfHostMemory)?;
            vec![0u8; len]
        } else {
            Vec::new()
        };

        let id = state.next_id();
        state.memories.insert(
            id,
            DummyMemory {
                data,
                size,
                memory_type_index,
                mapped: false,
            },
        );
        state.memory_in_use += size;
        state.memory_allocation_count += 1;
        Ok(MemoryHandle(id))
    }

    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: MemoryHandle, offset: u64) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::BindBufferMemory)?;
        if !state.memories.contains_key(&memory.0) {
            return Err(GpuError::InvalidHandle);
        }
        let buffer = state.buffers.get_mut(&buffer.0).ok_or(GpuError::InvalidHandle)?;
        buffer.binding = Some((memory, offset));
        Ok(())
    }

    fn map_memory(&self, memory: MemoryHandle, offset: u64, size: u64) -> Result<*mut u8, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::MapMemory)?;
        let memory = state.memories.get_mut(&memory.0).ok_or(GpuError::InvalidHandle)?;
        if memory.mapped || memory.data.is_empty() {
            return Err(GpuError::MapFailed);
        }
        let in_range = offset.checked_add(size).map_or(false, |end| end <= memory.size);
        if !in_range {
            return Err(GpuError::MapFailed);
        }
        memory.mapped = true;
        // Vec storage never reallocates after creation, so the pointer stays valid until free
        Ok(memory.data[offset as usize..].as_mut_ptr())
    }

    fn unmap_memory(&self, memory: MemoryHandle) {
        if let Some(memory) = self.state.lock().memories.get_mut(&memory.0) {
            memory.mapped = false;
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state.lock().buffers.remove(&buffer.0);
    }

    fn free_memory(&self, memory: MemoryHandle) {
        let mut state = self.state.lock();
        if let Some(freed) = state.memories.remove(&memory.0) {
            state.memory_in_use -= freed.size;
        }
    }

    fn create_image(&self, extent: ImageExtent) -> Result<ImageHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::CreateImage)?;
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::Backend("zero-sized image".to_string()));
        }
        let id = state.next_id();
        state.images.insert(
            id,
            DummyImage {
                extent,
                binding: None,
                layout: DummyImageLayout::Undefined,
                contents: Vec::new(),
            },
        );
        Ok(ImageHandle(id))
    }

    fn image_memory_requirements(&self, image: ImageHandle) -> MemoryRequirements {
        let state = self.state.lock();
        let bytes = state.images.get(&image.0).map_or(0, |i| i.extent.rgba8_bytes());
        MemoryRequirements {
            size: align_up(bytes, state.image_alignment).unwrap_or(bytes),
            alignment: state.image_alignment,
            memory_type_bits: state.image_type_bits.unwrap_or_else(|| state.all_types_mask()),
        }
    }

    fn bind_image_memory(&self, image: ImageHandle, memory: MemoryHandle, offset: u64) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::BindImageMemory)?;
        if !state.memories.contains_key(&memory.0) {
            return Err(GpuError::InvalidHandle);
        }
        let image = state.images.get_mut(&image.0).ok_or(GpuError::InvalidHandle)?;
        image.binding = Some((memory, offset));
        Ok(())
    }

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::CreateImageView)?;
        if !state.images.contains_key(&image.0) {
            return Err(GpuError::InvalidHandle);
        }
        let id = state.next_id();
        state.views.insert(id, image);
        Ok(ImageViewHandle(id))
    }

    fn allocate_descriptor_set(&self, view: ImageViewHandle) -> Result<DescriptorSetHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::AllocateDescriptorSet)?;
        if !state.views.contains_key(&view.0) {
            return Err(GpuError::InvalidHandle);
        }
        let id = state.next_id();
        state.descriptor_sets.insert(id, view);
        Ok(DescriptorSetHandle(id))
    }

    fn free_descriptor_set(&self, set: DescriptorSetHandle) {
        self.state.lock().descriptor_sets.remove(&set.0);
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        self.state.lock().views.remove(&view.0);
    }

    fn destroy_image(&self, image: ImageHandle) {
        self.state.lock().images.remove(&image.0);
    }

    fn create_command_pool(&self, _transient: bool) -> Result<CommandPoolHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::CreateCommandPool)?;
        let id = state.next_id();
        state.command_pools.insert(id);
        Ok(CommandPoolHandle(id))
    }

    fn reset_command_pool(&self, pool: CommandPoolHandle) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::ResetCommandPool)?;
        if !state.command_pools.contains(&pool.0) {
            return Err(GpuError::InvalidHandle);
        }
        for cmd in state.command_buffers.values_mut().filter(|c| c.pool == pool) {
            cmd.commands.clear();
        }
        Ok(())
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.state.lock();
        if state.command_pools.remove(&pool.0) {
            state.command_buffers.retain(|_, c| c.pool != pool);
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::AllocateCommandBuffer)?;
        if !state.command_pools.contains(&pool.0) {
            return Err(GpuError::InvalidHandle);
        }
        let id = state.next_id();
        state.command_buffers.insert(
            id,
            DummyCommandBuffer {
                pool,
                commands: Vec::new(),
            },
        );
        Ok(CommandBufferHandle(id))
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::BeginCommandBuffer)?;
        let cmd = state.command_buffers.get_mut(&cmd.0).ok_or(GpuError::InvalidHandle)?;
        cmd.commands.clear();
        Ok(())
    }

    fn cmd_image_barrier(&self, cmd: CommandBufferHandle, image: ImageHandle, transition: LayoutTransition) {
        if let Some(cmd) = self.state.lock().command_buffers.get_mut(&cmd.0) {
            cmd.commands.push(Recorded::Barrier { image, transition });
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: ImageHandle,
        extent: ImageExtent,
    ) {
        if let Some(cmd) = self.state.lock().command_buffers.get_mut(&cmd.0) {
            cmd.commands.push(Recorded::Copy { src, dst, extent });
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::EndCommandBuffer)?;
        if !state.command_buffers.contains_key(&cmd.0) {
            return Err(GpuError::InvalidHandle);
        }
        Ok(())
    }

    fn queue_submit(&self, cmd: CommandBufferHandle, fence: FenceHandle) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::QueueSubmit)?;

        let commands = state
            .command_buffers
            .get(&cmd.0)
            .map(|c| c.commands.clone())
            .ok_or(GpuError::InvalidHandle)?;

        if !fence.is_null() {
            match state.fences.get(&fence.0) {
                None => return Err(GpuError::InvalidHandle),
                Some(true) => return Err(GpuError::Backend("submitted with a signaled fence".to_string())),
                Some(false) => {}
            }
        }

        state.execute(&commands);
        state.submit_count += 1;

        if !fence.is_null() && state.auto_signal {
            state.fences.insert(fence.0, true);
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::CreateFence)?;
        let id = state.next_id();
        state.fences.insert(id, signaled);
        Ok(FenceHandle(id))
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<bool, GpuError> {
        self.state
            .lock()
            .fences
            .get(&fence.0)
            .copied()
            .ok_or(GpuError::InvalidHandle)
    }

    fn wait_for_fence(&self, fence: FenceHandle) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::WaitForFence)?;
        let signaled = state.fences.get_mut(&fence.0).ok_or(GpuError::InvalidHandle)?;
        // The dummy "GPU" finishes the work the moment someone waits for it
        *signaled = true;
        state.wait_count += 1;
        Ok(())
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.take_failure(DummyOp::ResetFence)?;
        let signaled = state.fences.get_mut(&fence.0).ok_or(GpuError::InvalidHandle)?;
        *signaled = false;
        Ok(())
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.state.lock().fences.remove(&fence.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_visible_memory_maps() {
        let device = DummyDevice::new();
        let props = device.memory_properties();
        let host = props
            .find_memory_type(u32::MAX, MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap();

        let memory = device.allocate_memory(64, host).unwrap();
        let ptr = device.map_memory(memory, 0, 64).unwrap();
        unsafe { *ptr.add(3) = 0xAB };
        assert!(device.is_mapped(memory));
        assert_eq!(device.read_memory(memory, 3, 1), Some(vec![0xAB]));

        // mapping twice is an error, like in Vulkan
        assert_eq!(device.map_memory(memory, 0, 64), Err(GpuError::MapFailed));

        device.unmap_memory(memory);
        device.free_memory(memory);
        assert!(device.live_objects().is_empty());
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_device_local_memory_cannot_map() {
        let device = DummyDevice::new();
        let memory = device.allocate_memory(64, 0).unwrap();
        assert_eq!(device.map_memory(memory, 0, 64), Err(GpuError::MapFailed));
    }

    #[test]
    fn test_failure_injection_is_one_shot() {
        let device = DummyDevice::new();
        device.fail_next(DummyOp::AllocateMemory);

        assert_eq!(device.allocate_memory(16, 0), Err(GpuError::OutOfDeviceMemory));
        assert!(device.allocate_memory(16, 0).is_ok());
        assert_eq!(device.memory_allocation_count(), 1);
    }

    #[test]
    fn test_memory_budget() {
        let device = DummyDevice::new().with_memory_budget(100);
        let a = device.allocate_memory(60, 0).unwrap();
        assert_eq!(device.allocate_memory(60, 0), Err(GpuError::OutOfDeviceMemory));
        device.free_memory(a);
        assert!(device.allocate_memory(60, 0).is_ok());
    }

    #[test]
    fn test_submit_executes_copy_and_barriers() {
        let device = DummyDevice::new();
        let extent = ImageExtent::new(1, 1);

        let staging = device.create_buffer(4, BufferUsage::TRANSFER_SRC).unwrap();
        let memory = device.allocate_memory(4, 1).unwrap();
        device.bind_buffer_memory(staging, memory, 0).unwrap();
        let ptr = device.map_memory(memory, 0, 4).unwrap();
        unsafe { std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr, 4) };
        device.unmap_memory(memory);

        let image = device.create_image(extent).unwrap();
        let pool = device.create_command_pool(true).unwrap();
        let cmd = device.allocate_command_buffer(pool).unwrap();
        let fence = device.create_fence(false).unwrap();

        device.begin_command_buffer(cmd).unwrap();
        device.cmd_image_barrier(cmd, image, LayoutTransition::UndefinedToTransferDst);
        device.cmd_copy_buffer_to_image(cmd, staging, image, extent);
        device.cmd_image_barrier(cmd, image, LayoutTransition::TransferDstToShaderRead);
        device.end_command_buffer(cmd).unwrap();

        assert_eq!(device.image_layout(image), Some(DummyImageLayout::Undefined));
        device.queue_submit(cmd, fence).unwrap();

        assert_eq!(device.image_contents(image), Some(vec![1, 2, 3, 4]));
        assert_eq!(device.image_layout(image), Some(DummyImageLayout::ShaderReadOnly));
        assert!(device.fence_status(fence).unwrap());
        assert_eq!(device.submit_count(), 1);
    }

    #[test]
    fn test_manual_fence_signaling() {
        let device = DummyDevice::new();
        device.set_auto_signal(false);

        let pool = device.create_command_pool(false).unwrap();
        let cmd = device.allocate_command_buffer(pool).unwrap();
        let fence = device.create_fence(false).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device.queue_submit(cmd, fence).unwrap();

        assert!(!device.fence_status(fence).unwrap());
        // resubmitting while signaled is rejected, unsignaled is fine
        device.signal_all_fences();
        assert!(device.fence_status(fence).unwrap());
        assert!(device.queue_submit(cmd, fence).is_err());

        device.reset_fence(fence).unwrap();
        device.wait_for_fence(fence).unwrap();
        assert!(device.fence_status(fence).unwrap());
        assert_eq!(device.wait_count(), 1);
    }

    #[test]
    fn test_destroying_pool_frees_command_buffers() {
        let device = DummyDevice::new();
        let pool = device.create_command_pool(true).unwrap();
        let cmd = device.allocate_command_buffer(pool).unwrap();
        device.destroy_command_pool(pool);

        assert_eq!(device.begin_command_buffer(cmd), Err(GpuError::InvalidHandle));
        assert!(device.live_objects().is_empty());
    }
}
