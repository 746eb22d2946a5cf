use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::error;

use crate::command::{CommandBuffer, CommandPool};
use crate::context::Context;
use crate::fence::Fence;
use crate::{EmberError, Result, Submission};

/// The queue that executes uploads and acceleration structure builds.
#[derive(Debug)]
pub(crate) struct Queue {
    raw: vk::Queue,
    pub(crate) family_index: u32,
    context: Arc<Context>,
}

impl Drop for Queue {
    fn drop(&mut self) {
        if let Err(_err) = unsafe { self.context.device.queue_wait_idle(self.raw) }.result() {
            #[cfg(feature = "tracing")]
            error!("Unable to wait for the queue to become idle: {}", _err);
        }
    }
}

impl Queue {
    pub(crate) fn new(context: Arc<Context>, family_index: u32, queue: vk::Queue) -> Self {
        Self {
            raw: queue,
            family_index,
            context,
        }
    }

    /// Submits a command buffer. The fence is signaled once it finished executing.
    pub(crate) fn submit(&self, command_buffer: &CommandBuffer, fence: &Fence) -> Result<()> {
        let command_buffers = [command_buffer.raw];
        let submit_info = vk::SubmitInfoBuilder::new().command_buffers(&command_buffers);

        unsafe {
            self.context
                .device
                .queue_submit(self.raw, &[submit_info], Some(fence.raw))
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to submit a command buffer: {}", err);
            EmberError::VkResult(err)
        })
    }
}

/// A one-time command buffer in flight, together with the pool it was allocated from.
///
/// Dropping it waits for the GPU before the pool is destroyed.
#[derive(Debug)]
pub struct QueueSubmission {
    fence: Fence,
    _command_buffer: CommandBuffer,
    _command_pool: CommandPool,
}

impl QueueSubmission {
    pub(crate) fn new(fence: Fence, command_buffer: CommandBuffer, command_pool: CommandPool) -> Self {
        Self {
            fence,
            _command_buffer: command_buffer,
            _command_pool: command_pool,
        }
    }
}

impl Drop for QueueSubmission {
    fn drop(&mut self) {
        if let Err(_err) = self.fence.wait() {
            #[cfg(feature = "tracing")]
            error!("Unable to wait for a submission before releasing it: {}", _err);
        }
    }
}

impl Submission for QueueSubmission {
    fn is_complete(&self) -> Result<bool> {
        self.fence.is_signaled()
    }

    fn wait(&self) -> Result<()> {
        self.fence.wait()
    }
}
