//! `ash`-backed device

use ash::vk;
use ash::vk::Handle;

use crate::gpu::memory::{BufferUsage, MemoryProperties, MemoryRequirements};
use crate::gpu::traits::*;
use crate::sync::mutex::Mutex;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Objects the host renderer already owns and lends to the device wrapper
///
/// None of these are destroyed by [`AshDevice`].
pub struct VulkanContext {
    pub device: ash::Device,
    /// Graphics queue used for uploads
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    /// Must be created with `FREE_DESCRIPTOR_SET`
    pub descriptor_pool: vk::DescriptorPool,
    /// Layout with one combined image sampler at binding 0
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub sampler: vk::Sampler,
}

/// Vulkan implementation of [`GpuDevice`]
pub struct AshDevice {
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    queue_family_index: u32,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set_layout: vk::DescriptorSetLayout,
    sampler: vk::Sampler,
    memory_properties: MemoryProperties,
    buffer_image_granularity: u64,
}

impl AshDevice {
    /// Wrap a host device, snapshotting the physical device's memory layout.
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice, context: VulkanContext) -> Self {
        let (memory_properties, limits) = unsafe {
            (
                instance.get_physical_device_memory_properties(physical_device),
                instance.get_physical_device_properties(physical_device).limits,
            )
        };

        Self {
            device: context.device,
            queue: Mutex::new(context.queue),
            queue_family_index: context.queue_family_index,
            descriptor_pool: context.descriptor_pool,
            descriptor_set_layout: context.descriptor_set_layout,
            sampler: context.sampler,
            memory_properties: MemoryProperties::from_vk(&memory_properties),
            buffer_image_granularity: limits.buffer_image_granularity,
        }
    }

    /// The wrapped `ash` device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn requirements(req: vk::MemoryRequirements) -> MemoryRequirements {
    MemoryRequirements {
        size: req.size,
        alignment: req.alignment,
        memory_type_bits: req.memory_type_bits,
    }
}

impl GpuDevice for AshDevice {
    fn memory_properties(&self) -> MemoryProperties {
        self.memory_properties.clone()
    }

    fn buffer_image_granularity(&self) -> u64 {
        self.buffer_image_granularity
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<BufferHandle, GpuError> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::from_raw(usage.bits()))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&info, None)? };
        Ok(BufferHandle(buffer.as_raw()))
    }

    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> MemoryRequirements {
        requirements(unsafe {
            self.device
                .get_buffer_memory_requirements(vk::Buffer::from_raw(buffer.0))
        })
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> Result<MemoryHandle, GpuError> {
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { self.device.allocate_memory(&info, None)? };
        Ok(MemoryHandle(memory.as_raw()))
    }

    fn bind_buffer_memory(&self, buffer: BufferHandle, memory: MemoryHandle, offset: u64) -> Result<(), GpuError> {
        unsafe {
            self.device.bind_buffer_memory(
                vk::Buffer::from_raw(buffer.0),
                vk::DeviceMemory::from_raw(memory.0),
                offset,
            )?;
        }
        Ok(())
    }

    fn map_memory(&self, memory: MemoryHandle, offset: u64, size: u64) -> Result<*mut u8, GpuError> {
        let ptr = unsafe {
            self.device.map_memory(
                vk::DeviceMemory::from_raw(memory.0),
                offset,
                size,
                vk::MemoryMapFlags::empty(),
            )?
        };
        Ok(ptr as *mut u8)
    }

    fn unmap_memory(&self, memory: MemoryHandle) {
        unsafe { self.device.unmap_memory(vk::DeviceMemory::from_raw(memory.0)) }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        unsafe { self.device.destroy_buffer(vk::Buffer::from_raw(buffer.0), None) }
    }

    fn free_memory(&self, memory: MemoryHandle) {
        unsafe { self.device.free_memory(vk::DeviceMemory::from_raw(memory.0), None) }
    }

    fn create_image(&self, extent: ImageExtent) -> Result<ImageHandle, GpuError> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&info, None)? };
        Ok(ImageHandle(image.as_raw()))
    }

    fn image_memory_requirements(&self, image: ImageHandle) -> MemoryRequirements {
        requirements(unsafe {
            self.device
                .get_image_memory_requirements(vk::Image::from_raw(image.0))
        })
    }

    fn bind_image_memory(&self, image: ImageHandle, memory: MemoryHandle, offset: u64) -> Result<(), GpuError> {
        unsafe {
            self.device.bind_image_memory(
                vk::Image::from_raw(image.0),
                vk::DeviceMemory::from_raw(memory.0),
                offset,
            )?;
        }
        Ok(())
    }

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle, GpuError> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(vk::Image::from_raw(image.0))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(color_subresource_range());

        let view = unsafe { self.device.create_image_view(&info, None)? };
        Ok(ImageViewHandle(view.as_raw()))
    }

    fn allocate_descriptor_set(&self, view: ImageViewHandle) -> Result<DescriptorSetHandle, GpuError> {
        let layouts = [self.descriptor_set_layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);

        let set = unsafe { self.device.allocate_descriptor_sets(&info)? }
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Backend("no descriptor set returned".to_string()))?;

        let image_info = [vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: vk::ImageView::from_raw(view.0),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(DescriptorSetHandle(set.as_raw()))
    }

    fn free_descriptor_set(&self, set: DescriptorSetHandle) {
        if set.is_null() {
            return;
        }
        let sets = [vk::DescriptorSet::from_raw(set.0)];
        // Only fails on invalid usage; nothing to recover
        let _ = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &sets) };
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe { self.device.destroy_image_view(vk::ImageView::from_raw(view.0), None) }
    }

    fn destroy_image(&self, image: ImageHandle) {
        unsafe { self.device.destroy_image(vk::Image::from_raw(image.0), None) }
    }

    fn create_command_pool(&self, transient: bool) -> Result<CommandPoolHandle, GpuError> {
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.queue_family_index)
            .flags(flags);

        let pool = unsafe { self.device.create_command_pool(&info, None)? };
        Ok(CommandPoolHandle(pool.as_raw()))
    }

    fn reset_command_pool(&self, pool: CommandPoolHandle) -> Result<(), GpuError> {
        unsafe {
            self.device.reset_command_pool(
                vk::CommandPool::from_raw(pool.0),
                vk::CommandPoolResetFlags::empty(),
            )?;
        }
        Ok(())
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.device
                .destroy_command_pool(vk::CommandPool::from_raw(pool.0), None)
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle, GpuError> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(vk::CommandPool::from_raw(pool.0))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { self.device.allocate_command_buffers(&info)? }
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Backend("no command buffer returned".to_string()))?;
        Ok(CommandBufferHandle(cmd.as_raw()))
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<(), GpuError> {
        let info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(vk::CommandBuffer::from_raw(cmd.0), &info)?;
        }
        Ok(())
    }

    fn cmd_image_barrier(&self, cmd: CommandBufferHandle, image: ImageHandle, transition: LayoutTransition) {
        let (old_layout, new_layout, src_access, dst_access, src_stage, dst_stage) = match transition {
            LayoutTransition::UndefinedToTransferDst => (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            LayoutTransition::TransferDstToShaderRead => (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
        };

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(vk::Image::from_raw(image.0))
            .subresource_range(color_subresource_range())
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                vk::CommandBuffer::from_raw(cmd.0),
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: CommandBufferHandle,
        src: BufferHandle,
        dst: ImageHandle,
        extent: ImageExtent,
    ) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Buffer::from_raw(src.0),
                vk::Image::from_raw(dst.0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<(), GpuError> {
        unsafe {
            self.device
                .end_command_buffer(vk::CommandBuffer::from_raw(cmd.0))?;
        }
        Ok(())
    }

    fn queue_submit(&self, cmd: CommandBufferHandle, fence: FenceHandle) -> Result<(), GpuError> {
        let command_buffers = [vk::CommandBuffer::from_raw(cmd.0)];
        let submit = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        let queue = self.queue.lock();
        unsafe {
            self.device
                .queue_submit(*queue, &[submit], vk::Fence::from_raw(fence.0))?;
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GpuError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { self.device.create_fence(&info, None)? };
        Ok(FenceHandle(fence.as_raw()))
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<bool, GpuError> {
        Ok(unsafe { self.device.get_fence_status(vk::Fence::from_raw(fence.0))? })
    }

    fn wait_for_fence(&self, fence: FenceHandle) -> Result<(), GpuError> {
        unsafe {
            self.device
                .wait_for_fences(&[vk::Fence::from_raw(fence.0)], true, u64::MAX)?;
        }
        Ok(())
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GpuError> {
        unsafe { self.device.reset_fences(&[vk::Fence::from_raw(fence.0)])? };
        Ok(())
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(vk::Fence::from_raw(fence.0), None) }
    }
}
