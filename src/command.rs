//! Implements command pools and command buffers.

use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{EmberError, Result};

/// A wrapped command pool.
#[derive(Debug)]
pub(crate) struct CommandPool {
    raw: vk::CommandPool,
    context: Arc<Context>,
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_command_pool(Some(self.raw), None);
        };
    }
}

impl CommandPool {
    /// Creates a new command pool for transient command buffers.
    pub(crate) fn new(context: Arc<Context>, family_index: u32, name: &str) -> Result<Self> {
        let info = vk::CommandPoolCreateInfoBuilder::new()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(family_index);

        let raw = unsafe { context.device.create_command_pool(&info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a command pool: {}", err);
                EmberError::VkResult(err)
            })?;

        let pool = Self { raw, context };
        pool.context.set_object_name(
            &format!("{} Command Pool", name),
            vk::ObjectType::COMMAND_POOL,
            pool.raw.0,
        )?;

        Ok(pool)
    }

    /// Creates a new primary command buffer. It is freed together with the pool.
    pub(crate) fn create_command_buffer(&self) -> Result<CommandBuffer> {
        let info = vk::CommandBufferAllocateInfoBuilder::new()
            .command_pool(self.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe { self.context.device.allocate_command_buffers(&info) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to allocate a command buffer: {}", err);
                EmberError::VkResult(err)
            })?;

        Ok(CommandBuffer {
            raw: command_buffers[0],
            context: self.context.clone(),
        })
    }
}

/// A wrapped command buffer.
#[derive(Debug)]
pub(crate) struct CommandBuffer {
    pub(crate) raw: vk::CommandBuffer,
    context: Arc<Context>,
}

impl CommandBuffer {
    /// Records the command buffer actions with the help of an encoder.
    pub(crate) fn record<F>(&self, exec: F) -> Result<()>
    where
        F: FnOnce(&CommandEncoder) -> Result<()>,
    {
        let encoder = CommandEncoder {
            context: &self.context,
            buffer: self.raw,
        };

        encoder.begin()?;
        exec(&encoder)?;
        encoder.end()?;

        Ok(())
    }
}

/// Records commands into a command buffer.
pub(crate) struct CommandEncoder<'a> {
    context: &'a Context,
    buffer: vk::CommandBuffer,
}

impl<'a> CommandEncoder<'a> {
    fn begin(&self) -> Result<()> {
        let info = vk::CommandBufferBeginInfoBuilder::new()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.context.device.begin_command_buffer(self.buffer, &info) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to begin a command buffer: {}", err);
                EmberError::VkResult(err)
            })
    }

    fn end(&self) -> Result<()> {
        unsafe { self.context.device.end_command_buffer(self.buffer) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to end a command buffer: {}", err);
                EmberError::VkResult(err)
            })
    }

    /// Copy data between buffers.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdCopyBuffer.html)"]
    pub(crate) fn copy_buffer(
        &self,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let region = vk::BufferCopyBuilder::new()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe {
            self.context
                .device
                .cmd_copy_buffer(self.buffer, src_buffer, dst_buffer, &[region])
        };
    }

    /// Build acceleration structures.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCmdBuildAccelerationStructuresKHR.html)"]
    pub(crate) fn build_acceleration_structures(
        &self,
        infos: &[vk::AccelerationStructureBuildGeometryInfoKHRBuilder],
        build_range_infos: &[Vec<vk::AccelerationStructureBuildRangeInfoKHR>],
    ) {
        let build_range_infos: Vec<*const vk::AccelerationStructureBuildRangeInfoKHR> =
            build_range_infos.iter().map(|ranges| ranges.as_ptr()).collect();

        unsafe {
            self.context.device.cmd_build_acceleration_structures_khr(
                self.buffer,
                infos,
                &build_range_infos,
            )
        };
    }
}
