//! Builds and owns the bottom level acceleration structures and the top level acceleration structure of a scene.

use std::sync::Arc;

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::{debug, error};

use crate::{
    align_up, AccelerationStructureLevel, BlasId, BlasInput, BufferDescriptor, BuildCommand,
    BuildGeometryInfo, BuildMode, BuildRange, EmberError, Geometry, ImplicitObject,
    ImplicitShapes, Instance, InstanceGroup, InstanceRecord, MeshObject, ObjectInstance,
    RayTracingDevice, Result, SceneObject, Submission,
};

/// The default flags of a top level acceleration structure build.
pub const DEFAULT_TLAS_FLAGS: vk::BuildAccelerationStructureFlagsKHR =
    vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE_KHR;

/// A built bottom level acceleration structure.
pub struct BlasEntry<D: RayTracingDevice> {
    input: BlasInput,
    acceleration_structure: D::AccelerationStructure,
    device_address: vk::DeviceAddress,
    flags: vk::BuildAccelerationStructureFlagsKHR,
    _geometry_buffer: Option<D::Buffer>,
}

impl<D: RayTracingDevice> BlasEntry<D> {
    /// The geometry the structure was built from.
    pub fn input(&self) -> &BlasInput {
        &self.input
    }

    /// The acceleration structure.
    pub fn acceleration_structure(&self) -> &D::AccelerationStructure {
        &self.acceleration_structure
    }

    /// The device address of the acceleration structure.
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    /// The build flags.
    pub fn flags(&self) -> vk::BuildAccelerationStructureFlagsKHR {
        self.flags
    }
}

/// The top level acceleration structure.
pub struct Tlas<D: RayTracingDevice> {
    acceleration_structure: D::AccelerationStructure,
    device_address: vk::DeviceAddress,
    instance_buffer: D::Buffer,
    flags: vk::BuildAccelerationStructureFlagsKHR,
    blas_ids: Vec<BlasId>,
    update_scratch_size: u64,
}

impl<D: RayTracingDevice> Tlas<D> {
    /// The acceleration structure.
    pub fn acceleration_structure(&self) -> &D::AccelerationStructure {
        &self.acceleration_structure
    }

    /// The device address of the acceleration structure.
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    /// The buffer holding the instance records of the last build or update.
    pub fn instance_buffer(&self) -> &D::Buffer {
        &self.instance_buffer
    }

    /// The build flags.
    pub fn flags(&self) -> vk::BuildAccelerationStructureFlagsKHR {
        self.flags
    }

    /// Number of instances.
    pub fn instance_count(&self) -> usize {
        self.blas_ids.len()
    }
}

struct PendingBlas<D: RayTracingDevice> {
    input: BlasInput,
    acceleration_structure: D::AccelerationStructure,
    flags: vk::BuildAccelerationStructureFlagsKHR,
    geometry_buffer: Option<D::Buffer>,
}

enum PendingWork<D: RayTracingDevice> {
    Blas(Vec<PendingBlas<D>>),
    Tlas {
        tlas: Tlas<D>,
        instances: Vec<Instance>,
    },
    TlasUpdate {
        instance_buffer: D::Buffer,
        instances: Vec<Instance>,
    },
}

struct PendingBuild<D: RayTracingDevice> {
    submission: D::Submission,
    work: PendingWork<D>,
    // Scratch buffers, kept alive until the GPU is done.
    _buffers: Vec<D::Buffer>,
}

/// Builds and owns the acceleration structures of a scene.
///
/// Bottom level acceleration structures are kept in an append-only table and referenced by
/// [`BlasId`]. There is exactly one top level acceleration structure, which is either rebuilt
/// or refitted. Builds are submitted without blocking with the `submit_*` methods and become
/// visible after [`poll`](Self::poll) or [`wait`](Self::wait) observed their completion. The
/// `build_*` and `update_tlas` methods are the blocking variants.
///
/// A build that fails, either on submission or while waiting for it, publishes nothing: the
/// resident instance list and the current structures stay as they were.
pub struct AccelerationStructureBuilder<D: RayTracingDevice> {
    device: Arc<D>,
    blas: Vec<BlasEntry<D>>,
    tlas: Option<Tlas<D>>,
    instances: Vec<Instance>,
    hit_group_count: Option<u32>,
    object_instances: Vec<ObjectInstance>,
    next_object_id: u32,
    pending: Option<PendingBuild<D>>,
}

impl<D: RayTracingDevice> Drop for AccelerationStructureBuilder<D> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            if let Err(_err) = pending.submission.wait() {
                #[cfg(feature = "tracing")]
                error!("Unable to wait for a pending acceleration structure build: {}", _err);
            }
        }
    }
}

impl<D: RayTracingDevice> AccelerationStructureBuilder<D> {
    /// Creates an empty builder.
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            blas: Vec::new(),
            tlas: None,
            instances: Vec::new(),
            hit_group_count: None,
            object_instances: Vec::new(),
            next_object_id: 0,
            pending: None,
        }
    }

    /// The device the structures are built on.
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Builds one bottom level acceleration structure per input and waits for the build to finish.
    ///
    /// Returns one id per input, in input order. Ids of earlier builds stay valid.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build_blas(
        &mut self,
        inputs: Vec<BlasInput>,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<Vec<BlasId>> {
        let ids = self.submit_blas(inputs, flags)?;
        self.wait()?;
        Ok(ids)
    }

    /// Submits the build of one bottom level acceleration structure per input.
    ///
    /// The returned ids resolve once the build completed. A failed build publishes none of them.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn submit_blas(
        &mut self,
        inputs: Vec<BlasInput>,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<Vec<BlasId>> {
        self.submit_blas_with_buffers(inputs.into_iter().map(|input| (input, None)).collect(), flags)
    }

    fn submit_blas_with_buffers(
        &mut self,
        inputs: Vec<(BlasInput, Option<D::Buffer>)>,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<Vec<BlasId>> {
        self.wait()?;

        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        for (index, (input, _)) in inputs.iter().enumerate() {
            input.validate(index)?;
        }

        let first_id = self.blas.len();
        let mut entries = Vec::with_capacity(inputs.len());
        let mut scratch_buffers = Vec::with_capacity(inputs.len());
        let mut scratch_addresses = Vec::with_capacity(inputs.len());

        for (index, (input, geometry_buffer)) in inputs.into_iter().enumerate() {
            let info = BuildGeometryInfo {
                level: AccelerationStructureLevel::Bottom,
                flags,
                geometries: input.geometries(),
            };
            let sizes = self
                .device
                .build_sizes(&info, &input.max_primitive_counts())?;

            #[cfg(feature = "tracing")]
            debug!(
                "BLAS {}: size {} bytes, scratch {} bytes",
                first_id + index,
                sizes.acceleration_structure_size,
                sizes.build_scratch_size
            );

            let acceleration_structure = self.device.create_acceleration_structure(
                &format!("BLAS {}", first_id + index),
                AccelerationStructureLevel::Bottom,
                sizes.acceleration_structure_size,
            )?;
            let (scratch_buffer, scratch_address) =
                create_scratch_buffer(&*self.device, sizes.build_scratch_size)?;

            scratch_buffers.push(scratch_buffer);
            scratch_addresses.push(scratch_address);
            entries.push(PendingBlas {
                input,
                acceleration_structure,
                flags,
                geometry_buffer,
            });
        }

        let submission = {
            let builds: Vec<BuildCommand<D::AccelerationStructure>> = entries
                .iter()
                .zip(scratch_addresses.iter())
                .map(|(entry, scratch_address)| BuildCommand {
                    info: BuildGeometryInfo {
                        level: AccelerationStructureLevel::Bottom,
                        flags,
                        geometries: entry.input.geometries(),
                    },
                    mode: BuildMode::Build,
                    ranges: entry.input.ranges(),
                    destination: &entry.acceleration_structure,
                    scratch_address: *scratch_address,
                })
                .collect();
            self.device.submit_builds(&builds)?
        };

        let ids = (first_id..first_id + entries.len()).map(BlasId::new).collect();

        self.pending = Some(PendingBuild {
            submission,
            work: PendingWork::Blas(entries),
            _buffers: scratch_buffers,
        });

        Ok(ids)
    }

    /// Builds the top level acceleration structure over `instances` and waits for the build to finish.
    ///
    /// Replaces the resident instance list and returns the previous one.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build_tlas(
        &mut self,
        instances: Vec<Instance>,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<Vec<Instance>> {
        self.submit_tlas(instances, flags)?;
        Ok(self.finish()?.unwrap_or_default())
    }

    /// Rebuilds the top level acceleration structure over the resident instance list.
    pub fn rebuild_tlas(&mut self, flags: vk::BuildAccelerationStructureFlagsKHR) -> Result<()> {
        self.wait()?;
        let instances = self.instances.clone();
        self.build_tlas(instances, flags)?;
        Ok(())
    }

    /// Submits a full build of the top level acceleration structure.
    ///
    /// The new structure and instance list replace the current ones once the build completed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn submit_tlas(
        &mut self,
        instances: Vec<Instance>,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<()> {
        self.wait()?;

        if instances.is_empty() {
            return Err(EmberError::EmptyInstanceList);
        }

        let records = encode_instances(&self.blas, &instances, self.hit_group_count)?;
        let instance_buffer = upload_instances(&*self.device, &records)?;
        let geometries = [Geometry::Instances {
            address: self.device.buffer_device_address(&instance_buffer),
            flags: vk::GeometryFlagsKHR::OPAQUE_KHR,
        }];
        let info = BuildGeometryInfo {
            level: AccelerationStructureLevel::Top,
            flags,
            geometries: &geometries,
        };

        #[allow(clippy::as_conversions)]
        let instance_count = records.len() as u32;
        let sizes = self.device.build_sizes(&info, &[instance_count])?;

        #[cfg(feature = "tracing")]
        debug!(
            "TLAS with {} instances: size {} bytes, scratch {} bytes",
            instance_count, sizes.acceleration_structure_size, sizes.build_scratch_size
        );

        let acceleration_structure = self.device.create_acceleration_structure(
            "TLAS",
            AccelerationStructureLevel::Top,
            sizes.acceleration_structure_size,
        )?;
        let (scratch_buffer, scratch_address) =
            create_scratch_buffer(&*self.device, sizes.build_scratch_size)?;

        let ranges = [BuildRange::with_count(instance_count)];
        let submission = self.device.submit_builds(&[BuildCommand {
            info,
            mode: BuildMode::Build,
            ranges: &ranges,
            destination: &acceleration_structure,
            scratch_address,
        }])?;

        let tlas = Tlas {
            acceleration_structure,
            device_address: 0,
            instance_buffer,
            flags,
            blas_ids: instances.iter().map(|instance| instance.blas_id).collect(),
            update_scratch_size: sizes.update_scratch_size,
        };

        self.pending = Some(PendingBuild {
            submission,
            work: PendingWork::Tlas { tlas, instances },
            _buffers: vec![scratch_buffer],
        });

        Ok(())
    }

    /// Refits the top level acceleration structure to the new instance list and waits for the update to finish.
    ///
    /// The instance count and the referenced bottom level acceleration structures must match the
    /// last full build and the structure must have been built with `ALLOW_UPDATE`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn update_tlas(&mut self, instances: Vec<Instance>) -> Result<Vec<Instance>> {
        self.submit_tlas_update(instances)?;
        Ok(self.finish()?.unwrap_or_default())
    }

    /// Submits a refit of the top level acceleration structure. The structure keeps its handle and address.
    ///
    /// The instance list replaces the resident one once the update completed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn submit_tlas_update(&mut self, instances: Vec<Instance>) -> Result<()> {
        self.wait()?;

        if instances.is_empty() {
            return Err(EmberError::EmptyInstanceList);
        }

        let tlas = self.tlas.as_ref().ok_or(EmberError::TlasNotBuilt)?;
        if !tlas
            .flags
            .contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE_KHR)
        {
            return Err(EmberError::TlasNotUpdatable);
        }
        if tlas.blas_ids.len() != instances.len()
            || tlas
                .blas_ids
                .iter()
                .zip(instances.iter())
                .any(|(blas_id, instance)| *blas_id != instance.blas_id)
        {
            return Err(EmberError::TlasTopologyChanged);
        }

        let records = encode_instances(&self.blas, &instances, self.hit_group_count)?;
        let instance_buffer = upload_instances(&*self.device, &records)?;
        let geometries = [Geometry::Instances {
            address: self.device.buffer_device_address(&instance_buffer),
            flags: vk::GeometryFlagsKHR::OPAQUE_KHR,
        }];
        let (scratch_buffer, scratch_address) =
            create_scratch_buffer(&*self.device, tlas.update_scratch_size)?;

        #[allow(clippy::as_conversions)]
        let ranges = [BuildRange::with_count(records.len() as u32)];
        let submission = self.device.submit_builds(&[BuildCommand {
            info: BuildGeometryInfo {
                level: AccelerationStructureLevel::Top,
                flags: tlas.flags,
                geometries: &geometries,
            },
            mode: BuildMode::Update,
            ranges: &ranges,
            destination: &tlas.acceleration_structure,
            scratch_address,
        }])?;

        self.pending = Some(PendingBuild {
            submission,
            work: PendingWork::TlasUpdate {
                instance_buffer,
                instances,
            },
            _buffers: vec![scratch_buffer],
        });

        Ok(())
    }

    /// Returns true if no build is in flight. Publishes the results of a finished build.
    pub fn poll(&mut self) -> Result<bool> {
        match &self.pending {
            None => return Ok(true),
            Some(pending) => {
                if !pending.submission.is_complete()? {
                    return Ok(false);
                }
            }
        }
        self.wait()?;
        Ok(true)
    }

    /// Blocks until the build in flight finished and publishes its results.
    ///
    /// If the build failed its results are dropped.
    pub fn wait(&mut self) -> Result<()> {
        self.finish()?;
        Ok(())
    }

    /// Waits for the build in flight. Returns the replaced instance list of a TLAS build or update.
    fn finish(&mut self) -> Result<Option<Vec<Instance>>> {
        match self.pending.take() {
            Some(pending) => {
                pending.submission.wait()?;
                Ok(self.publish(pending.work))
            }
            None => Ok(None),
        }
    }

    fn publish(&mut self, work: PendingWork<D>) -> Option<Vec<Instance>> {
        match work {
            PendingWork::Blas(entries) => {
                for entry in entries {
                    let device_address = self
                        .device
                        .acceleration_structure_device_address(&entry.acceleration_structure);
                    self.blas.push(BlasEntry {
                        input: entry.input,
                        acceleration_structure: entry.acceleration_structure,
                        device_address,
                        flags: entry.flags,
                        _geometry_buffer: entry.geometry_buffer,
                    });
                }
                None
            }
            PendingWork::Tlas {
                mut tlas,
                instances,
            } => {
                tlas.device_address = self
                    .device
                    .acceleration_structure_device_address(&tlas.acceleration_structure);
                self.tlas = Some(tlas);
                Some(std::mem::replace(&mut self.instances, instances))
            }
            PendingWork::TlasUpdate {
                instance_buffer,
                instances,
            } => {
                if let Some(tlas) = self.tlas.as_mut() {
                    // The replaced buffer was only read by the previous build, which retired.
                    tlas.instance_buffer = instance_buffer;
                }
                Some(std::mem::replace(&mut self.instances, instances))
            }
        }
    }

    /// Adds an instance to the resident instance list. Takes effect with the next TLAS build.
    ///
    /// Completes a build in flight first, so a finishing TLAS build can't replace the list.
    pub fn add_instance(&mut self, instance: Instance) -> Result<()> {
        self.wait()?;
        self.instances.push(instance);
        Ok(())
    }

    /// Limits the hit group ids of instances to the hit groups of a shader binding table.
    ///
    /// TLAS builds and updates reject instances with a `hit_group_id` at or above the limit.
    /// `None` only checks the 24 bit limit of the instance format.
    pub fn set_hit_group_count(&mut self, hit_group_count: Option<u32>) {
        self.hit_group_count = hit_group_count;
    }

    /// The hit group limit of instances.
    pub fn hit_group_count(&self) -> Option<u32> {
        self.hit_group_count
    }

    /// Places drawables into the scene.
    ///
    /// Every distinct drawable gets one bottom level acceleration structure per sub-mesh, shared
    /// by all objects using it. Every object gets an [`InstanceGroup`] with one instance per
    /// sub-mesh. Named sub-meshes can be looked up in the group.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn add_mesh_objects(
        &mut self,
        objects: &[MeshObject],
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<Vec<InstanceGroup>> {
        let mut drawables: Vec<&MeshObject> = Vec::new();
        let mut drawable_indices = Vec::with_capacity(objects.len());
        for object in objects {
            let index = match drawables
                .iter()
                .position(|known| Arc::ptr_eq(&known.drawable, &object.drawable))
            {
                Some(index) => index,
                None => {
                    drawables.push(object);
                    drawables.len() - 1
                }
            };
            drawable_indices.push(index);
        }

        let mut offsets = Vec::with_capacity(drawables.len());
        let mut inputs = Vec::new();
        for object in drawables.iter() {
            offsets.push(inputs.len());
            inputs.extend(
                (0..object.drawable.meshes.len())
                    .filter_map(|mesh_index| BlasInput::from_mesh(&object.drawable, mesh_index)),
            );
        }

        #[cfg(feature = "tracing")]
        debug!(
            "Adding {} mesh objects with {} distinct drawables",
            objects.len(),
            drawables.len()
        );

        let blas_ids = self.build_blas(inputs, flags)?;

        let mut groups = Vec::with_capacity(objects.len());
        for (object, drawable_index) in objects.iter().zip(drawable_indices) {
            let mut group =
                InstanceGroup::new(SceneObject::Mesh(object.clone()), self.next_object_id());
            let offset = offsets[drawable_index];
            for (mesh_index, mesh) in object.drawable.meshes.iter().enumerate() {
                let instance = Instance {
                    blas_id: blas_ids[offset + mesh_index],
                    custom_id: self.next_custom_id(),
                    hit_group_id: object.hit_group_id,
                    mask: object.mask,
                    flags: vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE_KHR,
                    transform: object.transform,
                };
                self.push_instance(&mut group, instance, mesh.name.as_deref());
            }
            groups.push(group);
        }

        Ok(groups)
    }

    /// Places a batch of implicit shapes into the scene.
    ///
    /// The shape bounds are uploaded into an AABB buffer owned by the new bottom level
    /// acceleration structure. The batch gets one instance with an identity transform.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn add_implicit_objects(
        &mut self,
        shapes: &ImplicitShapes,
        hit_group_id: u32,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<InstanceGroup> {
        let aabbs = shapes.aabbs();
        if aabbs.is_empty() {
            return Err(EmberError::EmptyGeometryInput(0));
        }

        let data: &[u8] = bytemuck::cast_slice(&aabbs);
        #[allow(clippy::as_conversions)]
        let size = data.len() as u64;
        let aabb_buffer = self.device.create_buffer_with_data(
            &BufferDescriptor {
                name: "Implicit AABB Buffer",
                usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                    | vk::BufferUsageFlags::STORAGE_BUFFER,
                memory_location: vk_alloc::MemoryLocation::GpuOnly,
                size,
                alignment: Some(8),
            },
            data,
        )?;

        #[allow(clippy::as_conversions)]
        let count = aabbs.len() as u32;
        let input = BlasInput::from_aabbs(self.device.buffer_device_address(&aabb_buffer), count);
        let blas_ids = self.submit_blas_with_buffers(vec![(input, Some(aabb_buffer))], flags)?;
        self.wait()?;
        let blas_id = blas_ids[0];

        let object = ImplicitObject {
            kind: shapes.kind(),
            count,
            blas_id,
            hit_group_id,
        };
        let mut group = InstanceGroup::new(SceneObject::Implicit(object), self.next_object_id());
        let instance = Instance {
            custom_id: self.next_custom_id(),
            hit_group_id,
            ..Instance::new(blas_id)
        };
        self.push_instance(&mut group, instance, None);

        Ok(group)
    }

    fn next_object_id(&mut self) -> u32 {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    fn next_custom_id(&self) -> u32 {
        #[allow(clippy::as_conversions)]
        let id = self.object_instances.len() as u32;
        id
    }

    fn push_instance(&mut self, group: &mut InstanceGroup, instance: Instance, name: Option<&str>) {
        let object_instance = match name {
            Some(name) => group.add_named(name, instance),
            None => group.add(instance),
        };
        self.object_instances.push(object_instance);
        self.instances.push(instance);
    }

    /// The scene description rows of all objects added through the builder, indexed by custom id.
    pub fn object_instances(&self) -> &[ObjectInstance] {
        &self.object_instances
    }

    /// Uploads the scene description into a storage buffer.
    pub fn upload_object_instances(&self) -> Result<D::Buffer> {
        if self.object_instances.is_empty() {
            return Err(EmberError::EmptyInstanceList);
        }

        let data: &[u8] = bytemuck::cast_slice(&self.object_instances);
        #[allow(clippy::as_conversions)]
        let size = data.len() as u64;
        self.device.create_buffer_with_data(
            &BufferDescriptor {
                name: "Scene Description Buffer",
                usage: vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                memory_location: vk_alloc::MemoryLocation::GpuOnly,
                size,
                alignment: None,
            },
            data,
        )
    }

    /// Number of built bottom level acceleration structures.
    pub fn blas_count(&self) -> usize {
        self.blas.len()
    }

    /// A built bottom level acceleration structure.
    pub fn blas(&self, id: BlasId) -> Option<&BlasEntry<D>> {
        self.blas.get(id.index())
    }

    /// The device address of a built bottom level acceleration structure.
    pub fn blas_device_address(&self, id: BlasId) -> Option<vk::DeviceAddress> {
        self.blas(id).map(BlasEntry::device_address)
    }

    /// The top level acceleration structure, once built.
    pub fn tlas(&self) -> Option<&Tlas<D>> {
        self.tlas.as_ref()
    }

    /// The resident instance list.
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }
}

fn encode_instances<D: RayTracingDevice>(
    blas: &[BlasEntry<D>],
    instances: &[Instance],
    hit_group_count: Option<u32>,
) -> Result<Vec<InstanceRecord>> {
    instances
        .iter()
        .map(|instance| {
            if let Some(hit_group_count) = hit_group_count {
                if instance.hit_group_id >= hit_group_count {
                    return Err(EmberError::HitGroupOutOfRange {
                        hit_group_id: instance.hit_group_id,
                        hit_group_count,
                    });
                }
            }
            let entry = blas
                .get(instance.blas_id.index())
                .ok_or(EmberError::UnknownBlas(instance.blas_id))?;
            InstanceRecord::new(instance, entry.device_address)
        })
        .collect()
}

fn upload_instances<D: RayTracingDevice>(
    device: &D,
    records: &[InstanceRecord],
) -> Result<D::Buffer> {
    let data: &[u8] = bytemuck::cast_slice(records);
    #[allow(clippy::as_conversions)]
    let size = data.len() as u64;
    device.create_buffer_with_data(
        &BufferDescriptor {
            name: "TLAS Instance Buffer",
            usage: vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            memory_location: vk_alloc::MemoryLocation::GpuOnly,
            size,
            alignment: Some(16),
        },
        data,
    )
}

fn create_scratch_buffer<D: RayTracingDevice>(
    device: &D,
    size: u64,
) -> Result<(D::Buffer, vk::DeviceAddress)> {
    let alignment = u64::from(device.properties().min_scratch_offset_alignment);
    let buffer = device.create_buffer(&BufferDescriptor {
        name: "Scratch Buffer",
        usage: vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        memory_location: vk_alloc::MemoryLocation::GpuOnly,
        size: size + alignment,
        alignment: None,
    })?;
    let address = align_up(device.buffer_device_address(&buffer), alignment);
    Ok((buffer, address))
}
