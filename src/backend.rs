//! The seam between the acceleration structure / shader table logic and the device that executes it.

use erupt::{vk, ExtendableFromMut};

use crate::{BuildRange, Geometry, Result};

/// Alignment constants of the ray tracing implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RayTracingProperties {
    /// Size in bytes of a shader group handle.
    pub shader_group_handle_size: u32,
    /// Required alignment of a shader group handle inside a shader binding table record.
    pub shader_group_handle_alignment: u32,
    /// Required alignment of the base address of a shader binding table.
    pub shader_group_base_alignment: u32,
    /// Required alignment of scratch buffer addresses.
    pub min_scratch_offset_alignment: u32,
}

impl RayTracingProperties {
    /// Creates the properties out of the Vulkan property structs.
    pub fn from_vk(
        pipeline: &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR,
        acceleration_structure: &vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
    ) -> Self {
        Self {
            shader_group_handle_size: pipeline.shader_group_handle_size,
            shader_group_handle_alignment: pipeline.shader_group_handle_alignment,
            shader_group_base_alignment: pipeline.shader_group_base_alignment,
            min_scratch_offset_alignment: acceleration_structure
                .min_acceleration_structure_scratch_offset_alignment,
        }
    }

    /// Queries the properties of a physical device.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkGetPhysicalDeviceProperties2.html)"]
    pub unsafe fn query(instance: &erupt::InstanceLoader, physical_device: vk::PhysicalDevice) -> Self {
        let mut pipeline_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHRBuilder::new();
        let mut acceleration_structure_properties =
            vk::PhysicalDeviceAccelerationStructurePropertiesKHRBuilder::new();
        let properties = vk::PhysicalDeviceProperties2Builder::new()
            .extend_from(&mut pipeline_properties)
            .extend_from(&mut acceleration_structure_properties);

        // The extension structs are filled through the p_next chain.
        instance.get_physical_device_properties2(physical_device, Some(properties.build()));

        Self::from_vk(
            &pipeline_properties.build(),
            &acceleration_structure_properties.build(),
        )
    }

    /// The shader group handle size rounded up to the handle alignment.
    pub fn handle_size_aligned(&self) -> u64 {
        crate::align_up(
            u64::from(self.shader_group_handle_size),
            u64::from(self.shader_group_handle_alignment),
        )
    }
}

/// Describes a buffer.
#[derive(Clone, Debug)]
pub struct BufferDescriptor<'a> {
    /// Name of the buffer.
    pub name: &'a str,
    /// Buffer usage flags.
    pub usage: vk::BufferUsageFlags,
    /// The memory location.
    pub memory_location: vk_alloc::MemoryLocation,
    /// The size of the buffer.
    pub size: u64,
    /// Required alignment of the device address of the buffer, if stricter than the
    /// alignment of the memory allocation.
    pub alignment: Option<u64>,
}

/// The level of an acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccelerationStructureLevel {
    /// A bottom level acceleration structure over geometry.
    Bottom,
    /// A top level acceleration structure over instances.
    Top,
}

impl From<AccelerationStructureLevel> for vk::AccelerationStructureTypeKHR {
    fn from(level: AccelerationStructureLevel) -> Self {
        match level {
            AccelerationStructureLevel::Bottom => {
                vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL_KHR
            }
            AccelerationStructureLevel::Top => vk::AccelerationStructureTypeKHR::TOP_LEVEL_KHR,
        }
    }
}

/// Whether a build creates a new acceleration structure or refits an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildMode {
    /// Builds the acceleration structure from scratch.
    Build,
    /// Updates the acceleration structure in place. Source and destination are the same.
    Update,
}

impl From<BuildMode> for vk::BuildAccelerationStructureModeKHR {
    fn from(mode: BuildMode) -> Self {
        match mode {
            BuildMode::Build => vk::BuildAccelerationStructureModeKHR::BUILD_KHR,
            BuildMode::Update => vk::BuildAccelerationStructureModeKHR::UPDATE_KHR,
        }
    }
}

/// The geometry part of an acceleration structure build.
#[derive(Clone, Copy, Debug)]
pub struct BuildGeometryInfo<'a> {
    /// The level of the acceleration structure.
    pub level: AccelerationStructureLevel,
    /// Build flags.
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
    /// The geometries.
    pub geometries: &'a [Geometry],
}

/// Memory requirements of an acceleration structure build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildSizes {
    /// Size of the acceleration structure.
    pub acceleration_structure_size: u64,
    /// Size of the scratch buffer for a build.
    pub build_scratch_size: u64,
    /// Size of the scratch buffer for an update.
    pub update_scratch_size: u64,
}

impl From<vk::AccelerationStructureBuildSizesInfoKHR> for BuildSizes {
    fn from(sizes: vk::AccelerationStructureBuildSizesInfoKHR) -> Self {
        Self {
            acceleration_structure_size: sizes.acceleration_structure_size,
            build_scratch_size: sizes.build_scratch_size,
            update_scratch_size: sizes.update_scratch_size,
        }
    }
}

/// A single acceleration structure build inside a submission.
#[derive(Debug)]
pub struct BuildCommand<'a, A> {
    /// The geometry to build.
    pub info: BuildGeometryInfo<'a>,
    /// Build or update.
    pub mode: BuildMode,
    /// One range per geometry.
    pub ranges: &'a [BuildRange],
    /// The acceleration structure to build into. Also the source of an update.
    pub destination: &'a A,
    /// Device address of the scratch memory, aligned to the minimal scratch offset alignment.
    pub scratch_address: vk::DeviceAddress,
}

/// GPU work that was submitted and may still be executing.
pub trait Submission {
    /// Returns true once the GPU finished the submitted work.
    fn is_complete(&self) -> Result<bool>;

    /// Blocks until the GPU finished the submitted work.
    fn wait(&self) -> Result<()>;
}

/// The device operations needed to build acceleration structures and shader binding tables.
pub trait RayTracingDevice {
    /// A buffer owning its memory.
    type Buffer;
    /// An acceleration structure owning its backing buffer.
    type AccelerationStructure;
    /// A ray tracing pipeline.
    type Pipeline;
    /// Submitted GPU work.
    type Submission: Submission;

    /// The alignment constants of the ray tracing implementation.
    fn properties(&self) -> RayTracingProperties;

    /// Creates a new, uninitialized buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Self::Buffer>;

    /// Creates a new buffer and uploads the data into it. Returns once the upload finished.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<Self::Buffer>;

    /// Returns the device address of a buffer.
    fn buffer_device_address(&self, buffer: &Self::Buffer) -> vk::DeviceAddress;

    /// Queries the memory requirements of an acceleration structure build.
    fn build_sizes(
        &self,
        info: &BuildGeometryInfo,
        max_primitive_counts: &[u32],
    ) -> Result<BuildSizes>;

    /// Creates an acceleration structure together with its backing buffer.
    fn create_acceleration_structure(
        &self,
        name: &str,
        level: AccelerationStructureLevel,
        size: u64,
    ) -> Result<Self::AccelerationStructure>;

    /// Returns the device address of an acceleration structure. Only valid after its build finished.
    fn acceleration_structure_device_address(
        &self,
        acceleration_structure: &Self::AccelerationStructure,
    ) -> vk::DeviceAddress;

    /// Records all builds into one command buffer and submits it.
    fn submit_builds(
        &self,
        builds: &[BuildCommand<Self::AccelerationStructure>],
    ) -> Result<Self::Submission>;

    /// Returns the shader group handles of `count` groups starting at `first`.
    fn shader_group_handles(
        &self,
        pipeline: &Self::Pipeline,
        first: u32,
        count: u32,
    ) -> Result<Vec<u8>>;
}
