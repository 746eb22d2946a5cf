//! Shader binding tables.

use bytemuck::Pod;
use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::{debug, warn};

use crate::{align_up, BufferDescriptor, EmberError, RayTracingDevice, RayTracingProperties, Result};

/// The type of a shader group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderGroupType {
    /// A ray generation, miss or callable shader.
    General,
    /// A hit group for triangle geometry.
    TrianglesHitGroup,
    /// A hit group with an intersection shader for procedural geometry.
    ProceduralHitGroup,
}

impl From<ShaderGroupType> for vk::RayTracingShaderGroupTypeKHR {
    fn from(ty: ShaderGroupType) -> Self {
        match ty {
            ShaderGroupType::General => vk::RayTracingShaderGroupTypeKHR::GENERAL_KHR,
            ShaderGroupType::TrianglesHitGroup => {
                vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP_KHR
            }
            ShaderGroupType::ProceduralHitGroup => {
                vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP_KHR
            }
        }
    }
}

/// A shader group of a ray tracing pipeline. Shaders are indices into the pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderGroupInfo {
    /// The type of the group.
    pub ty: ShaderGroupType,
    /// The general shader.
    pub general_shader: Option<u32>,
    /// The closest hit shader.
    pub closest_hit_shader: Option<u32>,
    /// The any hit shader.
    pub any_hit_shader: Option<u32>,
    /// The intersection shader.
    pub intersection_shader: Option<u32>,
}

impl ShaderGroupInfo {
    fn general(shader: u32) -> Self {
        Self {
            ty: ShaderGroupType::General,
            general_shader: Some(shader),
            closest_hit_shader: None,
            any_hit_shader: None,
            intersection_shader: None,
        }
    }

    /// The Vulkan create info of the group.
    pub fn to_vk(&self) -> vk::RayTracingShaderGroupCreateInfoKHRBuilder<'static> {
        vk::RayTracingShaderGroupCreateInfoKHRBuilder::new()
            ._type(self.ty.into())
            .general_shader(self.general_shader.unwrap_or(vk::SHADER_UNUSED_KHR))
            .closest_hit_shader(self.closest_hit_shader.unwrap_or(vk::SHADER_UNUSED_KHR))
            .any_hit_shader(self.any_hit_shader.unwrap_or(vk::SHADER_UNUSED_KHR))
            .intersection_shader(self.intersection_shader.unwrap_or(vk::SHADER_UNUSED_KHR))
    }
}

/// The four tables of a shader binding table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderTableKind {
    /// Ray generation groups.
    RayGen,
    /// Miss groups.
    Miss,
    /// Hit groups.
    Hit,
    /// Callable groups.
    Callable,
}

/// A group inside a shader table with its appended shader record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderGroup {
    pipeline_index: u32,
    record: Vec<u8>,
}

impl ShaderGroup {
    /// Index of the group inside the pipeline.
    pub fn pipeline_index(&self) -> u32 {
        self.pipeline_index
    }

    /// The shader record bytes appended after the handle.
    pub fn record(&self) -> &[u8] {
        &self.record
    }
}

/// The groups of one shader table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderGroupTable {
    groups: Vec<ShaderGroup>,
}

impl ShaderGroupTable {
    /// The groups.
    pub fn groups(&self) -> &[ShaderGroup] {
        &self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if the table has no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The largest shader record of the table.
    pub fn max_record_size(&self) -> u64 {
        #[allow(clippy::as_conversions)]
        let max = self
            .groups
            .iter()
            .map(|group| group.record.len() as u64)
            .max()
            .unwrap_or(0);
        max
    }

    /// The stride shared by every record of the table.
    pub fn stride(&self, handle_size_aligned: u64, base_alignment: u64) -> u64 {
        align_up(handle_size_aligned + self.max_record_size(), base_alignment)
    }

    /// Lays out the table: every group gets a slot of `stride` bytes holding its handle
    /// followed by its record.
    pub fn stage(
        &self,
        handles: &[u8],
        handle_size: usize,
        handle_size_aligned: usize,
        stride: usize,
    ) -> Vec<u8> {
        let mut data = vec![0; stride * self.groups.len()];
        for (slot, group) in data.chunks_exact_mut(stride).zip(self.groups.iter()) {
            #[allow(clippy::as_conversions)]
            let handle_offset = group.pipeline_index as usize * handle_size;
            slot[..handle_size].copy_from_slice(&handles[handle_offset..handle_offset + handle_size]);
            slot[handle_size_aligned..handle_size_aligned + group.record.len()]
                .copy_from_slice(&group.record);
        }
        data
    }

    fn push(&mut self, pipeline_index: u32) {
        self.groups.push(ShaderGroup {
            pipeline_index,
            record: Vec::new(),
        });
    }
}

/// Stride and size of one compiled table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableLayout {
    /// Number of groups.
    pub group_count: u64,
    /// Stride between two records.
    pub stride: u64,
    /// Size of the table.
    pub size: u64,
}

/// Stride and size of all four tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderTablesLayout {
    /// The handle size rounded up to the handle alignment.
    pub handle_size_aligned: u64,
    /// The ray generation table.
    pub ray_gen: TableLayout,
    /// The miss table.
    pub miss: TableLayout,
    /// The hit table.
    pub hit: TableLayout,
    /// The callable table.
    pub callable: TableLayout,
}

/// Collects the shader groups of a ray tracing pipeline and compiles them into shader binding tables.
///
/// Every `*_group` method returns the group to append to the pipeline's group list, so the
/// pipeline groups and the tables stay in the same order. Compiling consumes the collected
/// groups and leaves the description empty.
#[derive(Clone, Debug, Default)]
pub struct ShaderTablesDescription {
    ray_gen: ShaderGroupTable,
    miss: ShaderGroupTable,
    hit: ShaderGroupTable,
    callable: ShaderGroupTable,
    pipeline_groups: Vec<ShaderGroupInfo>,
}

impl ShaderTablesDescription {
    /// Creates an empty description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ray generation group.
    pub fn ray_gen_group(&mut self, shader: u32) -> ShaderGroupInfo {
        self.add_group(ShaderTableKind::RayGen, ShaderGroupInfo::general(shader))
    }

    /// Adds a miss group.
    pub fn add_miss_group(&mut self, shader: u32) -> ShaderGroupInfo {
        self.add_group(ShaderTableKind::Miss, ShaderGroupInfo::general(shader))
    }

    /// Adds a hit group.
    pub fn add_hit_group(
        &mut self,
        closest_hit_shader: Option<u32>,
        intersection_shader: Option<u32>,
        any_hit_shader: Option<u32>,
        ty: ShaderGroupType,
    ) -> ShaderGroupInfo {
        self.add_group(
            ShaderTableKind::Hit,
            ShaderGroupInfo {
                ty,
                general_shader: None,
                closest_hit_shader,
                any_hit_shader,
                intersection_shader,
            },
        )
    }

    /// Adds a callable group.
    pub fn add_callable_group(&mut self, shader: u32) -> ShaderGroupInfo {
        self.add_group(ShaderTableKind::Callable, ShaderGroupInfo::general(shader))
    }

    fn add_group(&mut self, kind: ShaderTableKind, info: ShaderGroupInfo) -> ShaderGroupInfo {
        #[allow(clippy::as_conversions)]
        let pipeline_index = self.pipeline_groups.len() as u32;
        self.table_mut(kind).push(pipeline_index);
        self.pipeline_groups.push(info);
        info
    }

    /// Appends `record` to the shader record of the `group_index`-th group of a table.
    pub fn add_record<T: Pod>(
        &mut self,
        kind: ShaderTableKind,
        group_index: usize,
        record: &T,
    ) -> Result<()> {
        let group = self
            .table_mut(kind)
            .groups
            .get_mut(group_index)
            .ok_or(EmberError::UnknownShaderGroup(group_index))?;
        group.record.extend_from_slice(bytemuck::bytes_of(record));
        Ok(())
    }

    /// Appends `record` to the shader record of a hit group.
    pub fn add_hit_record<T: Pod>(&mut self, group_index: usize, record: &T) -> Result<()> {
        self.add_record(ShaderTableKind::Hit, group_index, record)
    }

    /// A table.
    pub fn table(&self, kind: ShaderTableKind) -> &ShaderGroupTable {
        match kind {
            ShaderTableKind::RayGen => &self.ray_gen,
            ShaderTableKind::Miss => &self.miss,
            ShaderTableKind::Hit => &self.hit,
            ShaderTableKind::Callable => &self.callable,
        }
    }

    fn table_mut(&mut self, kind: ShaderTableKind) -> &mut ShaderGroupTable {
        match kind {
            ShaderTableKind::RayGen => &mut self.ray_gen,
            ShaderTableKind::Miss => &mut self.miss,
            ShaderTableKind::Hit => &mut self.hit,
            ShaderTableKind::Callable => &mut self.callable,
        }
    }

    /// The groups to create the pipeline with, in the order they were added.
    pub fn pipeline_groups(&self) -> &[ShaderGroupInfo] {
        &self.pipeline_groups
    }

    /// Total number of groups.
    pub fn group_count(&self) -> u32 {
        #[allow(clippy::as_conversions)]
        let count = self.pipeline_groups.len() as u32;
        count
    }

    /// Number of hit groups. Instance hit group ids must be below this.
    ///
    /// The count is gone after [`compile`](Self::compile), the compiled tables keep it in
    /// [`ShaderBindingTables::hit_group_count`].
    pub fn hit_group_count(&self) -> usize {
        self.hit.len()
    }

    /// Computes the strides and sizes of the four tables.
    pub fn layout(&self, properties: &RayTracingProperties) -> ShaderTablesLayout {
        let handle_size_aligned = properties.handle_size_aligned();
        let base_alignment = u64::from(properties.shader_group_base_alignment);
        let table_layout = |table: &ShaderGroupTable| {
            #[allow(clippy::as_conversions)]
            let group_count = table.len() as u64;
            let stride = table.stride(handle_size_aligned, base_alignment);
            TableLayout {
                group_count,
                stride,
                size: stride * group_count,
            }
        };

        ShaderTablesLayout {
            handle_size_aligned,
            ray_gen: table_layout(&self.ray_gen),
            miss: table_layout(&self.miss),
            hit: table_layout(&self.hit),
            callable: table_layout(&self.callable),
        }
    }

    /// Builds the shader binding tables of `pipeline` and clears the description.
    ///
    /// The pipeline must have been created with [`pipeline_groups`](Self::pipeline_groups).
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile<D: RayTracingDevice>(
        &mut self,
        device: &D,
        pipeline: &D::Pipeline,
    ) -> Result<ShaderBindingTables<D>> {
        let properties = device.properties();
        let layout = self.layout(&properties);
        let group_count = self.group_count();

        if group_count == 0 {
            #[cfg(feature = "tracing")]
            warn!("Compiling shader binding tables without any shader groups");
            return Ok(ShaderBindingTables {
                ray_gen: ShaderBindingTable::empty(),
                miss: ShaderBindingTable::empty(),
                hit: ShaderBindingTable::empty(),
                callable: ShaderBindingTable::empty(),
            });
        }

        #[allow(clippy::as_conversions)]
        let handle_size = properties.shader_group_handle_size as usize;
        let handles = device.shader_group_handles(pipeline, 0, group_count)?;
        #[allow(clippy::as_conversions)]
        let expected = handle_size * group_count as usize;
        if handles.len() != expected {
            return Err(EmberError::ShaderGroupHandleSize {
                expected,
                actual: handles.len(),
            });
        }

        #[cfg(feature = "tracing")]
        debug!(
            "Shader group handle size {}, aligned {}, table sizes {} {} {} {}",
            handle_size,
            layout.handle_size_aligned,
            layout.ray_gen.size,
            layout.miss.size,
            layout.hit.size,
            layout.callable.size
        );

        #[allow(clippy::as_conversions)]
        let handle_size_aligned = layout.handle_size_aligned as usize;
        let stage = TableStaging {
            device,
            handles: &handles,
            handle_size,
            handle_size_aligned,
            base_alignment: u64::from(properties.shader_group_base_alignment),
        };
        let tables = ShaderBindingTables {
            ray_gen: stage.upload("Ray Gen Shader Binding Table", &self.ray_gen, &layout.ray_gen)?,
            miss: stage.upload("Miss Shader Binding Table", &self.miss, &layout.miss)?,
            hit: stage.upload("Hit Shader Binding Table", &self.hit, &layout.hit)?,
            callable: stage.upload(
                "Callable Shader Binding Table",
                &self.callable,
                &layout.callable,
            )?,
        };

        self.clear();

        Ok(tables)
    }

    /// Removes all groups.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

struct TableStaging<'a, D: RayTracingDevice> {
    device: &'a D,
    handles: &'a [u8],
    handle_size: usize,
    handle_size_aligned: usize,
    base_alignment: u64,
}

impl<'a, D: RayTracingDevice> TableStaging<'a, D> {
    fn upload(
        &self,
        name: &str,
        table: &ShaderGroupTable,
        layout: &TableLayout,
    ) -> Result<ShaderBindingTable<D>> {
        if table.is_empty() {
            return Ok(ShaderBindingTable::empty());
        }

        #[allow(clippy::as_conversions)]
        let data = table.stage(
            self.handles,
            self.handle_size,
            self.handle_size_aligned,
            layout.stride as usize,
        );
        let buffer = self.device.create_buffer_with_data(
            &BufferDescriptor {
                name,
                usage: vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                    | vk::BufferUsageFlags::TRANSFER_DST,
                memory_location: vk_alloc::MemoryLocation::GpuOnly,
                size: layout.size,
                alignment: Some(self.base_alignment),
            },
            &data,
        )?;

        let region = StridedRegion {
            device_address: self.device.buffer_device_address(&buffer),
            stride: layout.stride,
            size: layout.size,
        };

        Ok(ShaderBindingTable {
            buffer: Some(buffer),
            region,
        })
    }
}

/// A strided device address region of a shader binding table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StridedRegion {
    /// Device address of the first record.
    pub device_address: vk::DeviceAddress,
    /// Stride between two records.
    pub stride: u64,
    /// Size of the table.
    pub size: u64,
}

impl StridedRegion {
    /// The region as passed to `vkCmdTraceRaysKHR`.
    pub fn to_vk(&self) -> vk::StridedDeviceAddressRegionKHR {
        vk::StridedDeviceAddressRegionKHR {
            device_address: self.device_address,
            stride: self.stride,
            size: self.size,
        }
    }
}

/// A compiled shader table. Empty tables have no buffer and a zeroed region.
pub struct ShaderBindingTable<D: RayTracingDevice> {
    buffer: Option<D::Buffer>,
    region: StridedRegion,
}

impl<D: RayTracingDevice> ShaderBindingTable<D> {
    fn empty() -> Self {
        Self {
            buffer: None,
            region: StridedRegion::default(),
        }
    }

    /// The buffer holding the records.
    pub fn buffer(&self) -> Option<&D::Buffer> {
        self.buffer.as_ref()
    }

    /// The region to bind at ray dispatch.
    pub fn region(&self) -> StridedRegion {
        self.region
    }
}

/// The compiled shader binding tables of a pipeline.
pub struct ShaderBindingTables<D: RayTracingDevice> {
    /// Ray generation table.
    pub ray_gen: ShaderBindingTable<D>,
    /// Miss table.
    pub miss: ShaderBindingTable<D>,
    /// Hit table.
    pub hit: ShaderBindingTable<D>,
    /// Callable table.
    pub callable: ShaderBindingTable<D>,
}

impl<D: RayTracingDevice> ShaderBindingTables<D> {
    /// Number of hit groups in the hit table.
    ///
    /// Pass it to [`AccelerationStructureBuilder::set_hit_group_count`](crate::AccelerationStructureBuilder::set_hit_group_count)
    /// so instances can't reference records past the end of the table.
    pub fn hit_group_count(&self) -> u32 {
        let region = self.hit.region;
        if region.stride == 0 {
            return 0;
        }
        #[allow(clippy::as_conversions)]
        let count = (region.size / region.stride) as u32;
        count
    }

    /// The regions in the argument order of `vkCmdTraceRaysKHR`.
    pub fn regions(&self) -> [vk::StridedDeviceAddressRegionKHR; 4] {
        [
            self.ray_gen.region.to_vk(),
            self.miss.region.to_vk(),
            self.hit.region.to_vk(),
            self.callable.region.to_vk(),
        ]
    }
}
