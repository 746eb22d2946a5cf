use erupt::vk;
use thiserror::Error;

use crate::BlasId;

/// Errors that ember can throw.
#[derive(Error, Debug)]
pub enum EmberError {
    /// A std::ffi::NulError.
    #[error(transparent)]
    NulError(#[from] std::ffi::NulError),

    /// A erupt::vk::Result.
    #[error(transparent)]
    VkResult(#[from] vk::Result),

    /// A vk_alloc::AllocatorError.
    #[error(transparent)]
    VkAllocError(#[from] vk_alloc::AllocatorError),

    /// A build or update was requested with an empty instance list.
    #[error("the instance list is empty")]
    EmptyInstanceList,

    /// A bottom level acceleration structure input without any geometry.
    #[error("geometry input {0} doesn't contain any geometry")]
    EmptyGeometryInput(usize),

    /// The geometries and build ranges of a geometry input don't line up.
    #[error("geometry input has {geometries} geometries but {ranges} build ranges")]
    GeometryRangeMismatch {
        /// Number of geometries.
        geometries: usize,
        /// Number of build ranges.
        ranges: usize,
    },

    /// An instance references a bottom level acceleration structure that was never built.
    #[error("unknown bottom level acceleration structure {0:?}")]
    UnknownBlas(BlasId),

    /// An update was requested before the top level acceleration structure was built.
    #[error("the top level acceleration structure was not built yet")]
    TlasNotBuilt,

    /// An update was requested for a top level acceleration structure built without ALLOW_UPDATE.
    #[error("the top level acceleration structure was not built with ALLOW_UPDATE")]
    TlasNotUpdatable,

    /// An update changed the instance count or the referenced bottom level acceleration structures.
    #[error("instance count or bottom level references differ from the last build")]
    TlasTopologyChanged,

    /// An instance references a hit group the shader binding table doesn't have.
    #[error("hit group id {hit_group_id} is out of range, there are {hit_group_count} hit groups")]
    HitGroupOutOfRange {
        /// The hit group id of the instance.
        hit_group_id: u32,
        /// Number of hit groups.
        hit_group_count: u32,
    },

    /// A named instance was looked up that was never registered.
    #[error("no instance registered with name '{0}'")]
    UnknownInstanceName(String),

    /// A shader record was added for a group that doesn't exist.
    #[error("shader table has no group with index {0}")]
    UnknownShaderGroup(usize),

    /// A value doesn't fit into its packed field of the instance wire format.
    #[error("{field} {value} doesn't fit into 24 bits")]
    FieldOutOfRange {
        /// Name of the field.
        field: &'static str,
        /// The rejected value.
        value: u32,
    },

    /// The returned shader group handle data has an unexpected size.
    #[error("expected {expected} bytes of shader group handles, got {actual}")]
    ShaderGroupHandleSize {
        /// Expected size in bytes.
        expected: usize,
        /// Returned size in bytes.
        actual: usize,
    },

    /// A host visible allocation could not be mapped.
    #[error("can't map host visible memory")]
    HostMemoryNotMapped,
}
