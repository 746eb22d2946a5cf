//! The erupt implementation of [`RayTracingDevice`].

use std::ffi::c_void;
use std::sync::Arc;

use erupt::vk;
use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing1::{debug, error};

use crate::command::{CommandEncoder, CommandPool};
use crate::context::Context;
use crate::fence::Fence;
use crate::memory_allocator::MemoryAllocator;
use crate::queue::{Queue, QueueSubmission};
use crate::{
    align_up, AccelerationStructure, AccelerationStructureLevel, Buffer, BufferDescriptor,
    BuildCommand, BuildGeometryInfo, BuildMode, BuildSizes, EmberError, Geometry, Lifetime,
    RayTracingDevice, RayTracingPipeline, RayTracingPipelineDescriptor, RayTracingProperties,
    Result, Submission,
};

/// Describes how to create a device.
///
/// The logical device must have been created with the acceleration structure, ray tracing
/// pipeline and buffer device address features enabled.
pub struct DeviceDescriptor<'a, LT: Lifetime> {
    /// The instance the physical device belongs to. Used to query the ray tracing properties.
    pub instance: &'a erupt::InstanceLoader,
    /// The logical device. It is destroyed together with the [`Device`].
    pub device: erupt::DeviceLoader,
    /// The physical device of the logical device.
    pub physical_device: vk::PhysicalDevice,
    /// The queue used for uploads and builds. Must support compute.
    pub queue: vk::Queue,
    /// The queue family of the queue.
    pub queue_family_index: u32,
    /// The memory allocator.
    pub allocator: vk_alloc::Allocator<LT>,
    /// The lifetime of all allocations made by the device.
    pub lifetime: LT,
    /// Whether `VK_EXT_debug_utils` is loaded, so objects can be named.
    pub debug_utils: bool,
}

/// A Vulkan device that builds acceleration structures and shader binding tables.
#[derive(Debug)]
pub struct Device<LT: Lifetime> {
    queue: Mutex<Queue>,
    memory_allocator: Arc<MemoryAllocator<LT>>,
    context: Arc<Context>,
    lifetime: LT,
    properties: RayTracingProperties,
}

impl<LT: Lifetime> Device<LT> {
    /// Takes ownership of a logical device.
    ///
    /// # Safety
    /// The handles of the descriptor must be valid and belong to the logical device.
    pub unsafe fn new(descriptor: DeviceDescriptor<'_, LT>) -> Self {
        let context = Arc::new(Context::new(
            descriptor.device,
            descriptor.physical_device,
            descriptor.debug_utils,
        ));
        let properties = RayTracingProperties::query(descriptor.instance, context.physical_device);
        let memory_allocator = Arc::new(MemoryAllocator::new(
            descriptor.allocator,
            context.clone(),
        ));
        let queue = Queue::new(
            context.clone(),
            descriptor.queue_family_index,
            descriptor.queue,
        );

        #[cfg(feature = "tracing")]
        debug!("Ray tracing properties: {:?}", properties);

        Self {
            queue: Mutex::new(queue),
            memory_allocator,
            context,
            lifetime: descriptor.lifetime,
            properties,
        }
    }

    /// The raw logical device.
    pub fn raw(&self) -> &erupt::DeviceLoader {
        &self.context.device
    }

    /// Creates a new buffer.
    ///
    /// With an explicit alignment the buffer is over-allocated and its usable range starts at
    /// the first aligned device address.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Buffer<LT>> {
        let alignment = descriptor.alignment.unwrap_or(0);
        let usage = if alignment > 0 {
            descriptor.usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        } else {
            descriptor.usage
        };

        let info = vk::BufferCreateInfoBuilder::new()
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .size(descriptor.size + alignment);

        let raw = unsafe { self.context.device.create_buffer(&info, None) }
            .result()
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to create a buffer: {}", err);
                EmberError::VkResult(err)
            })?;

        let allocation = match self.memory_allocator.allocate_buffer(
            raw,
            descriptor.memory_location,
            self.lifetime,
        ) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.context.device.destroy_buffer(Some(raw), None) };
                return Err(err);
            }
        };

        let mut buffer = Buffer::new(
            raw,
            allocation,
            0,
            descriptor.size,
            self.memory_allocator.clone(),
            self.context.clone(),
        );
        self.context
            .set_object_name(descriptor.name, vk::ObjectType::BUFFER, raw.0)?;

        if alignment > 0 {
            let address = buffer.device_address();
            buffer.set_offset(align_up(address, alignment) - address);
        }

        Ok(buffer)
    }

    /// Creates a new buffer and uploads the data through a staging buffer. Blocks until the upload finished.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<Buffer<LT>> {
        #[allow(clippy::as_conversions)]
        let size = data.len() as u64;

        let mut staging_buffer = self.create_buffer(&BufferDescriptor {
            name: "Staging Buffer",
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            memory_location: vk_alloc::MemoryLocation::CpuToGpu,
            size,
            alignment: None,
        })?;

        unsafe {
            let slice = staging_buffer
                .mapped_slice_mut()?
                .ok_or(EmberError::HostMemoryNotMapped)?;
            slice[..data.len()].copy_from_slice(data);
            staging_buffer.flush()?;
        }

        let buffer = self.create_buffer(&BufferDescriptor {
            usage: descriptor.usage | vk::BufferUsageFlags::TRANSFER_DST,
            ..descriptor.clone()
        })?;

        let submission = self.submit("Upload", |encoder| {
            encoder.copy_buffer(
                staging_buffer.raw(),
                buffer.raw(),
                0,
                buffer.offset(),
                size,
            );
            Ok(())
        })?;
        submission.wait()?;

        Ok(buffer)
    }

    /// Creates a ray tracing pipeline.
    #[doc = "[Vulkan Manual Page](https://www.khronos.org/registry/vulkan/specs/1.2-extensions/man/html/vkCreateRayTracingPipelinesKHR.html)"]
    pub fn create_ray_tracing_pipeline(
        &self,
        descriptor: &RayTracingPipelineDescriptor,
    ) -> Result<RayTracingPipeline> {
        let groups: Vec<vk::RayTracingShaderGroupCreateInfoKHRBuilder> =
            descriptor.groups.iter().map(|group| group.to_vk()).collect();

        let info = vk::RayTracingPipelineCreateInfoKHRBuilder::new()
            .stages(descriptor.stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(descriptor.max_recursion_depth)
            .layout(descriptor.layout);

        let raw = unsafe {
            self.context
                .device
                .create_ray_tracing_pipelines_khr(None, None, &[info], None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create a ray tracing pipeline: {}", err);
            EmberError::VkResult(err)
        })?[0];

        self.context
            .set_object_name(descriptor.name, vk::ObjectType::PIPELINE, raw.0)?;

        Ok(RayTracingPipeline::new(raw, self.context.clone()))
    }

    /// Records a one-time command buffer and submits it.
    fn submit<F>(&self, name: &str, exec: F) -> Result<QueueSubmission>
    where
        F: FnOnce(&CommandEncoder) -> Result<()>,
    {
        let queue = self.queue.lock();

        let command_pool = CommandPool::new(self.context.clone(), queue.family_index, name)?;
        let command_buffer = command_pool.create_command_buffer()?;
        command_buffer.record(exec)?;

        let fence = Fence::new(self.context.clone(), name)?;
        queue.submit(&command_buffer, &fence)?;

        Ok(QueueSubmission::new(fence, command_buffer, command_pool))
    }
}

impl<LT: Lifetime> RayTracingDevice for Device<LT> {
    type Buffer = Buffer<LT>;
    type AccelerationStructure = AccelerationStructure<LT>;
    type Pipeline = RayTracingPipeline;
    type Submission = QueueSubmission;

    fn properties(&self) -> RayTracingProperties {
        self.properties
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Self::Buffer> {
        Device::create_buffer(self, descriptor)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<Self::Buffer> {
        Device::create_buffer_with_data(self, descriptor, data)
    }

    fn buffer_device_address(&self, buffer: &Self::Buffer) -> vk::DeviceAddress {
        buffer.device_address()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn build_sizes(
        &self,
        info: &BuildGeometryInfo,
        max_primitive_counts: &[u32],
    ) -> Result<BuildSizes> {
        let geometries: Vec<vk::AccelerationStructureGeometryKHRBuilder> =
            info.geometries.iter().map(geometry_to_vk).collect();
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHRBuilder::new()
            ._type(info.level.into())
            .flags(info.flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD_KHR)
            .geometries(&geometries);

        let sizes = unsafe {
            self.context.device.get_acceleration_structure_build_sizes_khr(
                vk::AccelerationStructureBuildTypeKHR::DEVICE_KHR,
                &build_info,
                max_primitive_counts,
            )
        };

        Ok(sizes.into())
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn create_acceleration_structure(
        &self,
        name: &str,
        level: AccelerationStructureLevel,
        size: u64,
    ) -> Result<Self::AccelerationStructure> {
        let buffer = Device::create_buffer(
            self,
            &BufferDescriptor {
                name,
                usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                memory_location: vk_alloc::MemoryLocation::GpuOnly,
                size,
                alignment: None,
            },
        )?;

        let info = vk::AccelerationStructureCreateInfoKHRBuilder::new()
            .buffer(buffer.raw())
            .offset(0)
            .size(size)
            ._type(level.into());

        let raw = unsafe {
            self.context
                .device
                .create_acceleration_structure_khr(&info, None)
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to create an acceleration structure: {}", err);
            EmberError::VkResult(err)
        })?;

        let acceleration_structure = AccelerationStructure::new(raw, buffer, self.context.clone());
        self.context.set_object_name(
            name,
            vk::ObjectType::ACCELERATION_STRUCTURE_KHR,
            raw.0,
        )?;

        Ok(acceleration_structure)
    }

    fn acceleration_structure_device_address(
        &self,
        acceleration_structure: &Self::AccelerationStructure,
    ) -> vk::DeviceAddress {
        acceleration_structure.device_address()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn submit_builds(
        &self,
        builds: &[BuildCommand<Self::AccelerationStructure>],
    ) -> Result<Self::Submission> {
        let geometries: Vec<Vec<vk::AccelerationStructureGeometryKHRBuilder>> = builds
            .iter()
            .map(|build| build.info.geometries.iter().map(geometry_to_vk).collect())
            .collect();
        let ranges: Vec<Vec<vk::AccelerationStructureBuildRangeInfoKHR>> = builds
            .iter()
            .map(|build| build.ranges.iter().map(|range| (*range).into()).collect())
            .collect();

        let infos: Vec<vk::AccelerationStructureBuildGeometryInfoKHRBuilder> = builds
            .iter()
            .zip(geometries.iter())
            .map(|(build, geometries)| {
                let destination = build.destination.raw();
                let info = vk::AccelerationStructureBuildGeometryInfoKHRBuilder::new()
                    ._type(build.info.level.into())
                    .flags(build.info.flags)
                    .mode(build.mode.into())
                    .dst_acceleration_structure(destination)
                    .geometries(geometries)
                    .scratch_data(vk::DeviceOrHostAddressKHR {
                        device_address: build.scratch_address,
                    });
                match build.mode {
                    BuildMode::Build => info,
                    BuildMode::Update => info.src_acceleration_structure(destination),
                }
            })
            .collect();

        self.submit("Acceleration Structure Build", |encoder| {
            encoder.build_acceleration_structures(&infos, &ranges);
            Ok(())
        })
    }

    fn shader_group_handles(
        &self,
        pipeline: &Self::Pipeline,
        first: u32,
        count: u32,
    ) -> Result<Vec<u8>> {
        #[allow(clippy::as_conversions)]
        let size = self.properties.shader_group_handle_size as usize * count as usize;
        let mut data = vec![0u8; size];
        #[allow(clippy::as_conversions)]
        let data_ptr = data.as_mut_ptr() as *mut c_void;

        unsafe {
            self.context.device.get_ray_tracing_shader_group_handles_khr(
                pipeline.raw(),
                first,
                count,
                size,
                data_ptr,
            )
        }
        .result()
        .map_err(|err| {
            #[cfg(feature = "tracing")]
            error!("Unable to query the shader group handles: {}", err);
            EmberError::VkResult(err)
        })?;

        Ok(data)
    }
}

fn geometry_to_vk(geometry: &Geometry) -> vk::AccelerationStructureGeometryKHRBuilder<'static> {
    match geometry {
        Geometry::Triangles(triangles) => {
            let data = vk::AccelerationStructureGeometryDataKHR {
                triangles: *vk::AccelerationStructureGeometryTrianglesDataKHRBuilder::new()
                    .vertex_format(triangles.vertex_format)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: triangles.vertex_address,
                    })
                    .vertex_stride(triangles.vertex_stride)
                    .max_vertex(triangles.max_vertex)
                    .index_type(triangles.index_type)
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: triangles.index_address,
                    })
                    .transform_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: triangles.transform_address.unwrap_or(0),
                    }),
            };
            vk::AccelerationStructureGeometryKHRBuilder::new()
                .geometry_type(vk::GeometryTypeKHR::TRIANGLES_KHR)
                .geometry(data)
                .flags(triangles.flags)
        }
        Geometry::Aabbs(aabbs) => {
            let data = vk::AccelerationStructureGeometryDataKHR {
                aabbs: *vk::AccelerationStructureGeometryAabbsDataKHRBuilder::new()
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: aabbs.address,
                    })
                    .stride(aabbs.stride),
            };
            vk::AccelerationStructureGeometryKHRBuilder::new()
                .geometry_type(vk::GeometryTypeKHR::AABBS_KHR)
                .geometry(data)
                .flags(aabbs.flags)
        }
        Geometry::Instances { address, flags } => {
            let data = vk::AccelerationStructureGeometryDataKHR {
                instances: *vk::AccelerationStructureGeometryInstancesDataKHRBuilder::new()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: *address,
                    }),
            };
            vk::AccelerationStructureGeometryKHRBuilder::new()
                .geometry_type(vk::GeometryTypeKHR::INSTANCES_KHR)
                .geometry(data)
                .flags(*flags)
        }
    }
}
