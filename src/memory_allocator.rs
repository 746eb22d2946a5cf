use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::{context::Context, EmberError, Lifetime, Result};

/// Owns the vk-alloc allocator. Buffers keep an Arc on it, so it is cleaned up after the last buffer.
#[derive(Debug)]
pub(crate) struct MemoryAllocator<LT: Lifetime> {
    allocator: vk_alloc::Allocator<LT>,
    context: Arc<Context>,
}

impl<LT: Lifetime> Drop for MemoryAllocator<LT> {
    fn drop(&mut self) {
        unsafe {
            self.allocator.cleanup(&self.context.device);
        }
    }
}

impl<LT: Lifetime> MemoryAllocator<LT> {
    pub(crate) fn new(allocator: vk_alloc::Allocator<LT>, context: Arc<Context>) -> Self {
        Self { allocator, context }
    }

    /// Allocates memory for a buffer and binds it.
    pub(crate) fn allocate_buffer(
        &self,
        buffer: vk::Buffer,
        location: vk_alloc::MemoryLocation,
        lifetime: LT,
    ) -> Result<vk_alloc::Allocation<LT>> {
        let allocation = unsafe {
            self.allocator.allocate_memory_for_buffer(
                &self.context.device,
                buffer,
                location,
                lifetime,
            )?
        };

        let bound = unsafe {
            self.context.device.bind_buffer_memory(
                buffer,
                allocation.device_memory(),
                allocation.offset(),
            )
        }
        .result();

        if let Err(err) = bound {
            #[cfg(feature = "tracing")]
            error!("Unable to bind buffer memory: {}", err);
            self.free(&allocation);
            return Err(EmberError::VkResult(err));
        }

        Ok(allocation)
    }

    /// Returns the memory of an allocation to the allocator.
    pub(crate) fn free(&self, allocation: &vk_alloc::Allocation<LT>) {
        if let Err(_err) = unsafe { self.allocator.deallocate(&self.context.device, allocation) } {
            #[cfg(feature = "tracing")]
            error!("Unable to free a buffer allocation: {}", _err);
        }
    }
}
