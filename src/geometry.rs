//! Geometry inputs of bottom level acceleration structures.

use erupt::vk;

use crate::{EmberError, Result};

/// Size of an AABB record in bytes (`VkAabbPositionsKHR`).
pub const AABB_STRIDE: u64 = 24;

/// A triangle mesh addressed through device addresses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleGeometry {
    /// Device address of the vertex data.
    pub vertex_address: vk::DeviceAddress,
    /// Stride between two vertices.
    pub vertex_stride: u64,
    /// Format of the vertex position.
    pub vertex_format: vk::Format,
    /// Highest vertex index that can be addressed by the indices.
    pub max_vertex: u32,
    /// Device address of the index data.
    pub index_address: vk::DeviceAddress,
    /// Type of the indices.
    pub index_type: vk::IndexType,
    /// Device address of an optional 3x4 transform applied to the vertices.
    pub transform_address: Option<vk::DeviceAddress>,
    /// Geometry flags.
    pub flags: vk::GeometryFlagsKHR,
}

/// Axis aligned bounding boxes of procedural primitives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AabbGeometry {
    /// Device address of the AABB data.
    pub address: vk::DeviceAddress,
    /// Stride between two AABBs.
    pub stride: u64,
    /// Geometry flags.
    pub flags: vk::GeometryFlagsKHR,
}

/// A geometry of an acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Geometry {
    /// Triangle geometry of a bottom level acceleration structure.
    Triangles(TriangleGeometry),
    /// AABB geometry of a bottom level acceleration structure.
    Aabbs(AabbGeometry),
    /// Instance geometry of a top level acceleration structure.
    Instances {
        /// Device address of the instance records.
        address: vk::DeviceAddress,
        /// Geometry flags.
        flags: vk::GeometryFlagsKHR,
    },
}

/// The primitive range of one geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildRange {
    /// Number of primitives.
    pub primitive_count: u32,
    /// Byte offset into the primitive data.
    pub primitive_offset: u32,
    /// Index of the first vertex.
    pub first_vertex: u32,
    /// Byte offset into the transform data.
    pub transform_offset: u32,
}

impl BuildRange {
    /// A range over `count` primitives starting at the beginning of the data.
    pub fn with_count(primitive_count: u32) -> Self {
        Self {
            primitive_count,
            ..Default::default()
        }
    }
}

impl From<BuildRange> for vk::AccelerationStructureBuildRangeInfoKHR {
    fn from(range: BuildRange) -> Self {
        vk::AccelerationStructureBuildRangeInfoKHR {
            primitive_count: range.primitive_count,
            primitive_offset: range.primitive_offset,
            first_vertex: range.first_vertex,
            transform_offset: range.transform_offset,
        }
    }
}

/// A sub-mesh of a drawable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshRange {
    /// Optional name of the sub-mesh.
    pub name: Option<String>,
    /// First index inside the index buffer.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Offset added to every index.
    pub vertex_offset: u32,
    /// Highest vertex index addressed by the sub-mesh.
    pub max_vertex: u32,
}

impl MeshRange {
    /// Number of triangles of the sub-mesh.
    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// Vertex and index buffers of a loaded model with its sub-meshes.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawable {
    /// Device address of the vertex buffer.
    pub vertex_address: vk::DeviceAddress,
    /// Stride between two vertices.
    pub vertex_stride: u64,
    /// Format of the vertex position.
    pub vertex_format: vk::Format,
    /// Device address of the index buffer. Indices are 32 bit.
    pub index_address: vk::DeviceAddress,
    /// The sub-meshes.
    pub meshes: Vec<MeshRange>,
}

impl Drawable {
    /// Creates a drawable with `vec4` float positions.
    pub fn new(
        vertex_address: vk::DeviceAddress,
        vertex_stride: u64,
        index_address: vk::DeviceAddress,
        meshes: Vec<MeshRange>,
    ) -> Self {
        Self {
            vertex_address,
            vertex_stride,
            vertex_format: vk::Format::R32G32B32A32_SFLOAT,
            index_address,
            meshes,
        }
    }
}

/// The geometries and primitive ranges of one bottom level acceleration structure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlasInput {
    geometries: Vec<Geometry>,
    ranges: Vec<BuildRange>,
}

impl BlasInput {
    /// Creates an empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a geometry together with its primitive range.
    pub fn push(&mut self, geometry: Geometry, range: BuildRange) {
        self.geometries.push(geometry);
        self.ranges.push(range);
    }

    /// One triangle geometry per sub-mesh of the drawable.
    pub fn from_drawable(drawable: &Drawable) -> Self {
        let mut input = Self::new();
        for mesh in drawable.meshes.iter() {
            let (geometry, range) = mesh_geometry(drawable, mesh);
            input.push(geometry, range);
        }
        input
    }

    /// A single triangle geometry over one sub-mesh of the drawable.
    pub fn from_mesh(drawable: &Drawable, mesh_index: usize) -> Option<Self> {
        let mesh = drawable.meshes.get(mesh_index)?;
        let (geometry, range) = mesh_geometry(drawable, mesh);
        let mut input = Self::new();
        input.push(geometry, range);
        Some(input)
    }

    /// A single AABB geometry over `count` tightly packed AABBs.
    pub fn from_aabbs(address: vk::DeviceAddress, count: u32) -> Self {
        let mut input = Self::new();
        input.push(
            Geometry::Aabbs(AabbGeometry {
                address,
                stride: AABB_STRIDE,
                flags: vk::GeometryFlagsKHR::OPAQUE_KHR,
            }),
            BuildRange::with_count(count),
        );
        input
    }

    /// The geometries.
    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    /// The primitive ranges, one per geometry.
    pub fn ranges(&self) -> &[BuildRange] {
        &self.ranges
    }

    /// True if the input has no geometry.
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// The primitive count of every geometry, as needed by the build size query.
    pub fn max_primitive_counts(&self) -> Vec<u32> {
        self.ranges.iter().map(|range| range.primitive_count).collect()
    }

    pub(crate) fn validate(&self, index: usize) -> Result<()> {
        if self.geometries.is_empty() {
            return Err(EmberError::EmptyGeometryInput(index));
        }
        if self.geometries.len() != self.ranges.len() {
            return Err(EmberError::GeometryRangeMismatch {
                geometries: self.geometries.len(),
                ranges: self.ranges.len(),
            });
        }
        Ok(())
    }
}

fn mesh_geometry(drawable: &Drawable, mesh: &MeshRange) -> (Geometry, BuildRange) {
    let geometry = Geometry::Triangles(TriangleGeometry {
        vertex_address: drawable.vertex_address,
        vertex_stride: drawable.vertex_stride,
        vertex_format: drawable.vertex_format,
        max_vertex: mesh.max_vertex,
        index_address: drawable.index_address,
        index_type: vk::IndexType::UINT32,
        transform_address: None,
        flags: vk::GeometryFlagsKHR::OPAQUE_KHR,
    });
    let range = BuildRange {
        primitive_count: mesh.triangle_count(),
        primitive_offset: mesh.first_index * std::mem::size_of::<u32>() as u32,
        first_vertex: mesh.vertex_offset,
        transform_offset: 0,
    };
    (geometry, range)
}
