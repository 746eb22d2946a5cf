//! Procedural shapes that are intersected in custom intersection shaders.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Object type tag written into the scene description for intersection shaders.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImplicitType {
    /// Not an implicit shape, used for triangle meshes.
    None = 0,
    /// A plane.
    Plane = 1,
    /// A sphere.
    Sphere = 2,
    /// A capped cylinder.
    Cylinder = 3,
    /// An axis aligned box.
    Box = 4,
}

/// An axis aligned bounding box in the layout of `VkAabbPositionsKHR`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    /// The minimum corner.
    pub min: [f32; 3],
    /// The maximum corner.
    pub max: [f32; 3],
}

impl Aabb {
    /// Creates a new AABB.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// The AABB of a point with the given half extents.
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }
}

/// A plane `dot(normal, p) = distance`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// The plane normal.
    pub normal: [f32; 3],
    /// Distance of the plane from the origin.
    pub distance: f32,
}

impl Plane {
    /// Creates a new plane.
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.into(),
            distance,
        }
    }

    /// Projects a point onto the plane.
    pub fn project(&self, point: Vec3) -> Vec3 {
        let normal = Vec3::from(self.normal);
        let t = normal.dot(point) - self.distance;
        point - t * normal
    }

    /// The bounds of a plane cut off at `extent` along every axis.
    pub fn aabb(&self, extent: f32) -> Aabb {
        let a = self.project(Vec3::splat(-extent));
        let b = self.project(Vec3::splat(extent));
        Aabb::new(a.min(b), a.max(b))
    }
}

/// A sphere.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: [f32; 3],
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// Creates a new sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center: center.into(),
            radius,
        }
    }

    /// The bounds of the sphere.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(Vec3::from(self.center), Vec3::splat(self.radius))
    }
}

/// A capped cylinder standing upright between two points.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Cylinder {
    /// Center of the bottom cap.
    pub bottom: [f32; 3],
    _padding0: f32,
    /// Center of the top cap.
    pub top: [f32; 3],
    /// Radius of the cylinder.
    pub radius: f32,
}

impl Cylinder {
    /// Creates a new cylinder.
    pub fn new(bottom: Vec3, top: Vec3, radius: f32) -> Self {
        Self {
            bottom: bottom.into(),
            _padding0: 0.0,
            top: top.into(),
            radius,
        }
    }

    /// The bounds of the cylinder, assuming it is aligned with the y axis.
    pub fn aabb(&self) -> Aabb {
        let bottom = Vec3::from(self.bottom);
        let top = Vec3::from(self.top);
        let center = (top + bottom) * 0.5;
        let height = top.distance(bottom);
        Aabb::from_center(center, Vec3::new(self.radius, 0.5 * height, self.radius))
    }
}

/// An axis aligned box.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BoxShape {
    /// The minimum corner.
    pub min: [f32; 3],
    /// The maximum corner.
    pub max: [f32; 3],
}

impl BoxShape {
    /// Creates a new box.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// The bounds of the box.
    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.min,
            max: self.max,
        }
    }
}

/// A batch of implicit shapes of the same kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ImplicitShapes {
    /// Planes, bounded at `extent` along every axis.
    Planes {
        /// The planes.
        planes: Vec<Plane>,
        /// Half size of the bounded plane.
        extent: f32,
    },
    /// Spheres.
    Spheres(Vec<Sphere>),
    /// Cylinders.
    Cylinders(Vec<Cylinder>),
    /// Boxes.
    Boxes(Vec<BoxShape>),
}

impl ImplicitShapes {
    /// The object type tag of the batch.
    pub fn kind(&self) -> ImplicitType {
        match self {
            ImplicitShapes::Planes { .. } => ImplicitType::Plane,
            ImplicitShapes::Spheres(_) => ImplicitType::Sphere,
            ImplicitShapes::Cylinders(_) => ImplicitType::Cylinder,
            ImplicitShapes::Boxes(_) => ImplicitType::Box,
        }
    }

    /// Number of shapes.
    pub fn len(&self) -> usize {
        match self {
            ImplicitShapes::Planes { planes, .. } => planes.len(),
            ImplicitShapes::Spheres(spheres) => spheres.len(),
            ImplicitShapes::Cylinders(cylinders) => cylinders.len(),
            ImplicitShapes::Boxes(boxes) => boxes.len(),
        }
    }

    /// True if the batch has no shapes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bounding box of every shape, in order.
    pub fn aabbs(&self) -> Vec<Aabb> {
        match self {
            ImplicitShapes::Planes { planes, extent } => {
                planes.iter().map(|plane| plane.aabb(*extent)).collect()
            }
            ImplicitShapes::Spheres(spheres) => spheres.iter().map(Sphere::aabb).collect(),
            ImplicitShapes::Cylinders(cylinders) => {
                cylinders.iter().map(Cylinder::aabb).collect()
            }
            ImplicitShapes::Boxes(boxes) => boxes.iter().map(BoxShape::aabb).collect(),
        }
    }

    /// The raw shape data, ready to be uploaded for the intersection shaders.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ImplicitShapes::Planes { planes, .. } => bytemuck::cast_slice(planes),
            ImplicitShapes::Spheres(spheres) => bytemuck::cast_slice(spheres),
            ImplicitShapes::Cylinders(cylinders) => bytemuck::cast_slice(cylinders),
            ImplicitShapes::Boxes(boxes) => bytemuck::cast_slice(boxes),
        }
    }
}
