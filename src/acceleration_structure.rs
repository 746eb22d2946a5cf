use std::sync::Arc;

use erupt::vk;

use crate::{context::Context, Buffer, Lifetime};

/// Wraps an acceleration structure together with the buffer that stores it.
#[derive(Debug)]
pub struct AccelerationStructure<LT: Lifetime> {
    raw: vk::AccelerationStructureKHR,
    buffer: Buffer<LT>,
    context: Arc<Context>,
}

impl<LT: Lifetime> Drop for AccelerationStructure<LT> {
    fn drop(&mut self) {
        // The buffer field is dropped after the structure is gone.
        unsafe {
            self.context
                .device
                .destroy_acceleration_structure_khr(Some(self.raw), None);
        };
    }
}

impl<LT: Lifetime> AccelerationStructure<LT> {
    pub(crate) fn new(
        raw: vk::AccelerationStructureKHR,
        buffer: Buffer<LT>,
        context: Arc<Context>,
    ) -> Self {
        Self {
            raw,
            buffer,
            context,
        }
    }

    /// The raw Vulkan acceleration structure handle.
    #[inline]
    pub fn raw(&self) -> vk::AccelerationStructureKHR {
        self.raw
    }

    /// The backing buffer.
    #[inline]
    pub fn buffer(&self) -> &Buffer<LT> {
        &self.buffer
    }

    /// Query the address of the acceleration structure.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetAccelerationStructureDeviceAddressKHR.html)"]
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::AccelerationStructureDeviceAddressInfoKHRBuilder::new()
            .acceleration_structure(self.raw);
        unsafe {
            self.context
                .device
                .get_acceleration_structure_device_address_khr(&info)
        }
    }
}
