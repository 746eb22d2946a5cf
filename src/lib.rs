#![warn(missing_docs)]
//! Builds Vulkan ray tracing acceleration structures and shader binding tables on top of erupt.
//!
//! The [`AccelerationStructureBuilder`] owns the bottom level acceleration structures of a scene
//! and its top level acceleration structure. [`ShaderTablesDescription`] collects the shader
//! groups of a ray tracing pipeline and compiles them into strided shader binding tables.
//!
//! Both are generic over [`RayTracingDevice`]. [`Device`] implements it for a Vulkan logical
//! device.

pub use {
    acceleration_structure::AccelerationStructure,
    backend::{
        AccelerationStructureLevel, BufferDescriptor, BuildCommand, BuildGeometryInfo, BuildMode,
        BuildSizes, RayTracingDevice, RayTracingProperties, Submission,
    },
    buffer::Buffer,
    builder::{AccelerationStructureBuilder, BlasEntry, Tlas, DEFAULT_TLAS_FLAGS},
    device::{Device, DeviceDescriptor},
    error::EmberError,
    geometry::{
        AabbGeometry, BlasInput, BuildRange, Drawable, Geometry, MeshRange, TriangleGeometry,
        AABB_STRIDE,
    },
    implicit::{Aabb, BoxShape, Cylinder, ImplicitShapes, ImplicitType, Plane, Sphere},
    pipeline::{RayTracingPipeline, RayTracingPipelineDescriptor},
    queue::QueueSubmission,
    scene::{
        BlasId, ImplicitObject, Instance, InstanceGroup, InstanceRecord, MeshObject,
        ObjectInstance, SceneObject,
    },
    shader_table::{
        ShaderBindingTable, ShaderBindingTables, ShaderGroup, ShaderGroupInfo, ShaderGroupTable,
        ShaderGroupType, ShaderTableKind, ShaderTablesDescription, ShaderTablesLayout,
        StridedRegion, TableLayout,
    },
    vk_alloc::Lifetime,
};

pub(crate) mod acceleration_structure;
pub(crate) mod backend;
pub(crate) mod buffer;
pub(crate) mod builder;
pub(crate) mod command;
pub(crate) mod context;
pub(crate) mod device;
pub(crate) mod error;
pub(crate) mod fence;
pub(crate) mod geometry;
pub(crate) mod implicit;
pub(crate) mod memory_allocator;
pub(crate) mod pipeline;
pub(crate) mod queue;
pub(crate) mod scene;
pub(crate) mod shader_table;

/// The result type of ember. Implementations of [`RayTracingDevice`] return it as well.
pub type Result<T> = std::result::Result<T, EmberError>;

/// Rounds `value` up to the next multiple of `alignment`. An alignment of zero leaves the value unchanged.
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) / alignment * alignment
}
