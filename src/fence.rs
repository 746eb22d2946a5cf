use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::context::Context;
use crate::{EmberError, Result};

/// A fence.
#[derive(Debug)]
pub(crate) struct Fence {
    pub(crate) raw: vk::Fence,
    context: Arc<Context>,
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_fence(Some(self.raw), None);
        };
    }
}

impl Fence {
    /// Creates a new, unsignaled fence.
    pub(crate) fn new(context: Arc<Context>, name: &str) -> Result<Self> {
        let info = vk::FenceCreateInfoBuilder::new();
        let raw = unsafe { context.device.create_fence(&info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a fence: {}", err);
                EmberError::VkResult(err)
            })?;

        let fence = Self { raw, context };
        fence
            .context
            .set_object_name(name, vk::ObjectType::FENCE, fence.raw.0)?;

        Ok(fence)
    }

    /// Wait for the fence.
    pub(crate) fn wait(&self) -> Result<()> {
        unsafe {
            self.context
                .device
                .wait_for_fences(&[self.raw], true, u64::MAX)
                .result()
                .map_err(|err| {
                    #[cfg(feature = "tracing")]
                    error!("Unable to wait for a fence: {}", err);
                    EmberError::VkResult(err)
                })
        }
    }

    /// Returns true if the fence is signaled.
    pub(crate) fn is_signaled(&self) -> Result<bool> {
        let status = unsafe { self.context.device.get_fence_status(self.raw) };
        match status.raw {
            vk::Result::SUCCESS => Ok(true),
            vk::Result::NOT_READY => Ok(false),
            err => {
                #[cfg(feature = "tracing")]
                error!("Unable to query the status of a fence: {}", err);
                Err(EmberError::VkResult(err))
            }
        }
    }
}
