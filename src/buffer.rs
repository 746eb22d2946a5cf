use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::{context::Context, memory_allocator::MemoryAllocator, EmberError, Lifetime, Result};

/// Wraps a buffer.
///
/// Buffers created with an explicit address alignment are over-allocated. Their usable range
/// starts at [`offset`](Self::offset).
#[derive(Debug)]
pub struct Buffer<LT: Lifetime> {
    raw: vk::Buffer,
    allocation: vk_alloc::Allocation<LT>,
    offset: u64,
    size: u64,
    memory_allocator: Arc<MemoryAllocator<LT>>,
    context: Arc<Context>,
}

impl<LT: Lifetime> Drop for Buffer<LT> {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_buffer(Some(self.raw), None);
        };
        self.memory_allocator.free(&self.allocation);
    }
}

impl<LT: Lifetime> Buffer<LT> {
    pub(crate) fn new(
        raw: vk::Buffer,
        allocation: vk_alloc::Allocation<LT>,
        offset: u64,
        size: u64,
        memory_allocator: Arc<MemoryAllocator<LT>>,
        context: Arc<Context>,
    ) -> Self {
        Self {
            raw,
            allocation,
            offset,
            size,
            memory_allocator,
            context,
        }
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// The raw Vulkan buffer handle.
    #[inline]
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    /// Byte offset of the usable range inside the Vulkan buffer.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the usable range.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns a valid mapped mutable slice if the buffer memory is host visible, otherwise it will return None.
    #[inline]
    pub unsafe fn mapped_slice_mut(&mut self) -> Result<Option<&mut [u8]>> {
        let slice = self.allocation.mapped_slice_mut()?;
        Ok(slice)
    }

    /// Flush the mapped memory of the buffer. Used for CPU->GPU transfers.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkFlushMappedMemoryRanges.html)"]
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn flush(&self) -> Result<()> {
        let ranges = [vk::MappedMemoryRangeBuilder::new()
            .memory(self.allocation.device_memory())
            .size(self.allocation.size())
            .offset(self.allocation.offset())];
        self.context
            .device
            .flush_mapped_memory_ranges(&ranges)
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to flush a mapped memory range: {}", err);
                EmberError::VkResult(err)
            })
    }

    /// Query the address of the usable range of the buffer.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetBufferDeviceAddress.html)"]
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfoBuilder::new().buffer(self.raw);
        unsafe { self.context.device.get_buffer_device_address(&info) + self.offset }
    }
}
