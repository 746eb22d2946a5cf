//! Implements the device context.

use std::fmt::Formatter;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::{EmberError, Result};

/// The logical device shared by all wrapped Vulkan objects.
pub(crate) struct Context {
    pub(crate) device: erupt::DeviceLoader,
    pub(crate) physical_device: vk::PhysicalDevice,
    debug_utils: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("physical_device", &self.physical_device)
            .field("debug_utils", &self.debug_utils)
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            if let Err(_err) = self.device.device_wait_idle().result() {
                #[cfg(feature = "tracing")]
                error!("Unable to wait for the device to become idle: {}", _err);
            }
            self.device.destroy_device(None);
        };
    }
}

impl Context {
    pub(crate) fn new(
        device: erupt::DeviceLoader,
        physical_device: vk::PhysicalDevice,
        debug_utils: bool,
    ) -> Self {
        Self {
            device,
            physical_device,
            debug_utils,
        }
    }

    /// Sets a debug name for an object.
    #[cfg(debug_assertions)]
    pub(crate) fn set_object_name(
        &self,
        name: &str,
        object_type: vk::ObjectType,
        object_handle: u64,
    ) -> Result<()> {
        if !self.debug_utils {
            return Ok(());
        }

        let name = std::ffi::CString::new(name.to_owned())?;
        let info = vk::DebugUtilsObjectNameInfoEXTBuilder::new()
            .object_name(&name)
            .object_type(object_type)
            .object_handle(object_handle);

        unsafe { self.device.set_debug_utils_object_name_ext(&info) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to set the object name of {}: {}", object_handle, err);
                EmberError::VkResult(err)
            })
    }

    /// Sets a debug name for an object.
    #[cfg(not(debug_assertions))]
    pub(crate) fn set_object_name(
        &self,
        _name: &str,
        _object_type: vk::ObjectType,
        _object_handle: u64,
    ) -> Result<()> {
        Ok(())
    }
}
