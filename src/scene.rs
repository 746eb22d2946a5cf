//! Instances of bottom level acceleration structures and the scene objects they belong to.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use erupt::vk;
use glam::Mat4;

use crate::{Drawable, EmberError, ImplicitType, Result};

const MAX_24_BIT: u32 = 0x00FF_FFFF;

/// Identifies a bottom level acceleration structure of an [`AccelerationStructureBuilder`](crate::AccelerationStructureBuilder).
///
/// Ids are indices into the append-only table of the builder and stay valid for its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlasId(u32);

impl BlasId {
    pub(crate) fn new(index: usize) -> Self {
        #[allow(clippy::as_conversions)]
        Self(index as u32)
    }

    /// The index inside the bottom level acceleration structure table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An instance of a bottom level acceleration structure inside the top level acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    /// The referenced bottom level acceleration structure.
    pub blas_id: BlasId,
    /// Application defined 24 bit id, available as `gl_InstanceCustomIndexEXT`.
    pub custom_id: u32,
    /// Offset into the hit group table of the shader binding table.
    pub hit_group_id: u32,
    /// Visibility mask.
    pub mask: u8,
    /// Instance flags.
    pub flags: vk::GeometryInstanceFlagsKHR,
    /// Object to world transform.
    pub transform: Mat4,
}

impl Instance {
    /// An instance with identity transform, visible to every ray.
    pub fn new(blas_id: BlasId) -> Self {
        Self {
            blas_id,
            custom_id: 0,
            hit_group_id: 0,
            mask: 0xFF,
            flags: vk::GeometryInstanceFlagsKHR::empty(),
            transform: Mat4::IDENTITY,
        }
    }
}

/// An instance in the layout of `VkAccelerationStructureInstanceKHR`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// Row major 3x4 transform.
    pub transform: [f32; 12],
    /// 24 bit custom index and 8 bit mask.
    pub custom_index_and_mask: u32,
    /// 24 bit shader binding table record offset and 8 bit flags.
    pub sbt_offset_and_flags: u32,
    /// Device address of the bottom level acceleration structure.
    pub acceleration_structure_reference: u64,
}

impl InstanceRecord {
    /// Encodes an instance that references the bottom level acceleration structure at `blas_address`.
    pub fn new(instance: &Instance, blas_address: vk::DeviceAddress) -> Result<Self> {
        if instance.custom_id > MAX_24_BIT {
            return Err(EmberError::FieldOutOfRange {
                field: "custom id",
                value: instance.custom_id,
            });
        }
        if instance.hit_group_id > MAX_24_BIT {
            return Err(EmberError::FieldOutOfRange {
                field: "hit group id",
                value: instance.hit_group_id,
            });
        }

        // glam is column major, the instance wants the first three rows.
        let rows = instance.transform.transpose().to_cols_array();
        let mut transform = [0.0; 12];
        transform.copy_from_slice(&rows[..12]);

        Ok(Self {
            transform,
            custom_index_and_mask: instance.custom_id | u32::from(instance.mask) << 24,
            sbt_offset_and_flags: instance.hit_group_id | (instance.flags.bits() & 0xFF) << 24,
            acceleration_structure_reference: blas_address,
        })
    }

    /// The custom index.
    pub fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & MAX_24_BIT
    }

    /// The visibility mask.
    pub fn mask(&self) -> u8 {
        #[allow(clippy::as_conversions)]
        let mask = (self.custom_index_and_mask >> 24) as u8;
        mask
    }

    /// The shader binding table record offset.
    pub fn sbt_record_offset(&self) -> u32 {
        self.sbt_offset_and_flags & MAX_24_BIT
    }

    /// The instance flags.
    pub fn flags(&self) -> vk::GeometryInstanceFlagsKHR {
        vk::GeometryInstanceFlagsKHR::from_bits_truncate(self.sbt_offset_and_flags >> 24)
    }

    /// The object to world transform.
    pub fn transform(&self) -> Mat4 {
        let t = &self.transform;
        Mat4::from_cols_array(&[
            t[0], t[1], t[2], t[3], t[4], t[5], t[6], t[7], t[8], t[9], t[10], t[11], 0.0, 0.0,
            0.0, 1.0,
        ])
        .transpose()
    }
}

/// One row of the scene description buffer, indexed by the custom index of an instance.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ObjectInstance {
    /// Column major object to world transform.
    pub transform: [f32; 16],
    /// Inverse transpose of the transform, for normals.
    pub inverse_transpose: [f32; 16],
    /// Id of the scene object.
    pub object_id: u32,
    /// [`ImplicitType`] of the scene object.
    pub object_type: u32,
    _padding: [u32; 2],
}

impl ObjectInstance {
    /// Creates a new row.
    pub fn new(transform: Mat4, object_id: u32, object_type: ImplicitType) -> Self {
        Self {
            transform: transform.to_cols_array(),
            inverse_transpose: transform.inverse().transpose().to_cols_array(),
            object_id,
            object_type: object_type as u32,
            _padding: [0; 2],
        }
    }
}

/// Instances of a drawable placed into the scene.
#[derive(Clone, Debug)]
pub struct MeshObject {
    /// The drawable. Objects sharing the same drawable share its bottom level acceleration structures.
    pub drawable: Arc<Drawable>,
    /// Object to world transform.
    pub transform: Mat4,
    /// Hit group used by all sub-meshes.
    pub hit_group_id: u32,
    /// Visibility mask.
    pub mask: u8,
}

impl MeshObject {
    /// Places a drawable with the given transform.
    pub fn new(drawable: Arc<Drawable>, transform: Mat4) -> Self {
        Self {
            drawable,
            transform,
            hit_group_id: 0,
            mask: 0xFF,
        }
    }
}

/// A batch of implicit shapes that were turned into a bottom level acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImplicitObject {
    /// The shape kind.
    pub kind: ImplicitType,
    /// Number of shapes in the batch.
    pub count: u32,
    /// The bottom level acceleration structure over the shape bounds.
    pub blas_id: BlasId,
    /// Hit group with the intersection shader of the shape kind.
    pub hit_group_id: u32,
}

/// The payload of a scene object.
#[derive(Clone, Debug)]
pub enum SceneObject {
    /// A triangle mesh drawable.
    Mesh(MeshObject),
    /// A batch of implicit shapes.
    Implicit(ImplicitObject),
}

impl SceneObject {
    /// The object type tag written into the scene description.
    pub fn object_type(&self) -> ImplicitType {
        match self {
            SceneObject::Mesh(_) => ImplicitType::None,
            SceneObject::Implicit(implicit) => implicit.kind,
        }
    }
}

/// The instances of one scene object.
#[derive(Clone, Debug)]
pub struct InstanceGroup {
    object: SceneObject,
    object_id: u32,
    instances: Vec<Instance>,
    object_instances: Vec<ObjectInstance>,
    names: HashMap<String, u32>,
}

impl InstanceGroup {
    /// Creates an empty group.
    pub fn new(object: SceneObject, object_id: u32) -> Self {
        Self {
            object,
            object_id,
            instances: Vec::new(),
            object_instances: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Adds an instance and derives its scene description row.
    pub fn add(&mut self, instance: Instance) -> ObjectInstance {
        let object_instance = ObjectInstance::new(
            instance.transform,
            self.object_id,
            self.object.object_type(),
        );
        self.instances.push(instance);
        self.object_instances.push(object_instance);
        object_instance
    }

    /// Adds an instance that can later be found by name.
    pub fn add_named(&mut self, name: impl Into<String>, instance: Instance) -> ObjectInstance {
        self.names.insert(name.into(), instance.custom_id);
        self.add(instance)
    }

    /// The custom id of a named instance.
    pub fn instance_id(&self, name: &str) -> Result<u32> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| EmberError::UnknownInstanceName(name.to_owned()))
    }

    /// The scene object.
    pub fn object(&self) -> &SceneObject {
        &self.object
    }

    /// The object id.
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    /// The instances, in insertion order.
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// The scene description rows, one per instance.
    pub fn object_instances(&self) -> &[ObjectInstance] {
        &self.object_instances
    }
}
