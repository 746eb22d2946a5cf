use std::sync::Arc;

use erupt::vk;

use crate::context::Context;
use crate::ShaderGroupInfo;

/// Describes a ray tracing pipeline.
#[derive(Clone, Debug)]
pub struct RayTracingPipelineDescriptor<'a> {
    /// Name of the pipeline.
    pub name: &'a str,
    /// The shader stages. Shader groups reference them by index.
    pub stages: &'a [vk::PipelineShaderStageCreateInfoBuilder<'a>],
    /// The shader groups, usually [`ShaderTablesDescription::pipeline_groups`](crate::ShaderTablesDescription::pipeline_groups).
    pub groups: &'a [ShaderGroupInfo],
    /// The pipeline layout.
    pub layout: vk::PipelineLayout,
    /// Maximal recursion depth of `traceRayEXT` calls.
    pub max_recursion_depth: u32,
}

/// Wraps a ray tracing pipeline.
#[derive(Debug)]
pub struct RayTracingPipeline {
    raw: vk::Pipeline,
    context: Arc<Context>,
}

impl Drop for RayTracingPipeline {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_pipeline(Some(self.raw), None);
        };
    }
}

impl RayTracingPipeline {
    pub(crate) fn new(raw: vk::Pipeline, context: Arc<Context>) -> Self {
        Self { raw, context }
    }

    /// The raw Vulkan pipeline handle.
    #[inline]
    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }
}
