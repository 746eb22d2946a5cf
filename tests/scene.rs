
use std::sync::Arc;

use ember::{
    Aabb, AccelerationStructureBuilder, BlasInput, BoxShape, Cylinder, Drawable, EmberError,
    Geometry, ImplicitShapes, ImplicitType, Instance, InstanceGroup, MeshObject, MeshRange,
    ObjectInstance, Plane, SceneObject, Sphere, AABB_STRIDE, DEFAULT_TLAS_FLAGS,
};
use erupt::vk;
use fixture::MockDevice;
use glam::{Mat4, Vec3};

fn mesh(name: Option<&str>, first_index: u32, index_count: u32, vertex_offset: u32) -> MeshRange {
    MeshRange {
        name: name.map(str::to_owned),
        first_index,
        index_count,
        vertex_offset,
        max_vertex: vertex_offset + index_count,
    }
}

fn car() -> Arc<Drawable> {
    Arc::new(Drawable::new(
        0x4000_0000,
        32,
        0x4100_0000,
        vec![mesh(Some("body"), 0, 36, 0), mesh(Some("wheel"), 36, 24, 24)],
    ))
}

fn tree() -> Arc<Drawable> {
    Arc::new(Drawable::new(
        0x4200_0000,
        32,
        0x4300_0000,
        vec![mesh(None, 0, 12, 0)],
    ))
}

fn builder() -> (Arc<MockDevice>, AccelerationStructureBuilder<MockDevice>) {
    let device = Arc::new(MockDevice::default());
    let builder = AccelerationStructureBuilder::new(device.clone());
    (device, builder)
}

fn blas_indices(group: &InstanceGroup) -> Vec<usize> {
    group
        .instances()
        .iter()
        .map(|instance| instance.blas_id.index())
        .collect()
}

#[test]
fn shape_layouts() {
    assert_eq!(std::mem::size_of::<Aabb>() as u64, AABB_STRIDE);
    assert_eq!(std::mem::size_of::<Sphere>(), 16);
    assert_eq!(std::mem::size_of::<Plane>(), 16);
    assert_eq!(std::mem::size_of::<Cylinder>(), 32);
    assert_eq!(std::mem::size_of::<BoxShape>(), 24);
    assert_eq!(std::mem::size_of::<ObjectInstance>(), 144);
}

#[test]
fn implicit_shape_bounds() {
    let sphere = Sphere::new(Vec3::new(1.0, 2.0, 3.0), 0.5);
    assert_eq!(
        sphere.aabb(),
        Aabb::new(Vec3::new(0.5, 1.5, 2.5), Vec3::new(1.5, 2.5, 3.5))
    );

    let cylinder = Cylinder::new(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0), 1.0);
    assert_eq!(
        cylinder.aabb(),
        Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0))
    );

    let plane = Plane::new(Vec3::Y, 1.0);
    assert_eq!(
        plane.aabb(10.0),
        Aabb::new(Vec3::new(-10.0, 1.0, -10.0), Vec3::new(10.0, 1.0, 10.0))
    );

    let cube = BoxShape::new(Vec3::splat(-1.0), Vec3::splat(2.0));
    assert_eq!(
        cube.aabb(),
        Aabb::new(Vec3::splat(-1.0), Vec3::splat(2.0))
    );
}

#[test]
fn implicit_shape_batches() {
    let shapes = ImplicitShapes::Planes {
        planes: vec![Plane::new(Vec3::Y, 0.0), Plane::new(Vec3::X, 2.0)],
        extent: 5.0,
    };

    assert_eq!(shapes.kind(), ImplicitType::Plane);
    assert_eq!(shapes.len(), 2);
    assert_eq!(shapes.aabbs().len(), 2);
    assert_eq!(shapes.as_bytes().len(), 32);
    assert!(ImplicitShapes::Spheres(Vec::new()).is_empty());
}

#[test]
fn mesh_geometry_from_drawable() {
    let drawable = car();

    let input = BlasInput::from_drawable(&drawable);
    assert_eq!(input.geometries().len(), 2);
    assert_eq!(input.max_primitive_counts(), vec![12, 8]);

    let wheel = input.ranges()[1];
    assert_eq!(wheel.primitive_offset, 36 * 4);
    assert_eq!(wheel.first_vertex, 24);

    match input.geometries()[1] {
        Geometry::Triangles(triangles) => {
            assert_eq!(triangles.vertex_address, 0x4000_0000);
            assert_eq!(triangles.vertex_stride, 32);
            assert_eq!(triangles.vertex_format, vk::Format::R32G32B32A32_SFLOAT);
            assert_eq!(triangles.index_type, vk::IndexType::UINT32);
            assert_eq!(triangles.max_vertex, 48);
            assert_eq!(triangles.flags, vk::GeometryFlagsKHR::OPAQUE_KHR);
        }
        _ => panic!("expected triangle geometry"),
    }

    assert!(BlasInput::from_mesh(&drawable, 1).is_some());
    assert!(BlasInput::from_mesh(&drawable, 2).is_none());
}

#[test]
fn mesh_objects_share_geometry() {
    let (device, mut builder) = builder();
    let car = car();
    let objects = vec![
        MeshObject::new(car.clone(), Mat4::IDENTITY),
        MeshObject::new(car, Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0))),
        MeshObject {
            hit_group_id: 1,
            mask: 0x0F,
            ..MeshObject::new(tree(), Mat4::from_scale(Vec3::splat(2.0)))
        },
    ];

    let groups = builder
        .add_mesh_objects(&objects, DEFAULT_TLAS_FLAGS)
        .unwrap();

    assert_eq!(builder.blas_count(), 3);
    assert_eq!(device.submissions().len(), 1);
    assert_eq!(device.submissions()[0].len(), 3);

    assert_eq!(groups.len(), 3);
    assert_eq!(blas_indices(&groups[0]), vec![0, 1]);
    assert_eq!(blas_indices(&groups[1]), vec![0, 1]);
    assert_eq!(blas_indices(&groups[2]), vec![2]);

    let custom_ids: Vec<u32> = groups
        .iter()
        .flat_map(|group| group.instances().iter().map(|instance| instance.custom_id))
        .collect();
    assert_eq!(custom_ids, vec![0, 1, 2, 3, 4]);

    let tree = &groups[2].instances()[0];
    assert_eq!(tree.hit_group_id, 1);
    assert_eq!(tree.mask, 0x0F);
    assert_eq!(
        tree.flags,
        vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE_KHR
    );

    assert_eq!(
        groups
            .iter()
            .map(InstanceGroup::object_id)
            .collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(builder.instances().len(), 5);
    assert_eq!(builder.object_instances().len(), 5);
}

#[test]
fn named_instances() {
    let (_device, mut builder) = builder();
    let car = car();

    let groups = builder
        .add_mesh_objects(
            &[
                MeshObject::new(car.clone(), Mat4::IDENTITY),
                MeshObject::new(car, Mat4::IDENTITY),
            ],
            DEFAULT_TLAS_FLAGS,
        )
        .unwrap();

    assert_eq!(groups[0].instance_id("wheel").unwrap(), 1);
    assert_eq!(groups[1].instance_id("body").unwrap(), 2);
    assert!(matches!(
        groups[0].instance_id("spoiler"),
        Err(EmberError::UnknownInstanceName(name)) if name == "spoiler"
    ));
}

#[test]
fn implicit_objects() {
    let (device, mut builder) = builder();
    let shapes = ImplicitShapes::Spheres(vec![
        Sphere::new(Vec3::ZERO, 1.0),
        Sphere::new(Vec3::new(3.0, 0.0, 0.0), 0.5),
        Sphere::new(Vec3::new(0.0, 3.0, 0.0), 0.25),
    ]);

    let group = builder
        .add_implicit_objects(&shapes, 2, DEFAULT_TLAS_FLAGS)
        .unwrap();

    let blas_id = match group.object() {
        SceneObject::Implicit(object) => {
            assert_eq!(object.kind, ImplicitType::Sphere);
            assert_eq!(object.count, 3);
            assert_eq!(object.hit_group_id, 2);
            object.blas_id
        }
        SceneObject::Mesh(_) => panic!("expected an implicit object"),
    };
    assert_eq!(blas_id.index(), 0);

    assert_eq!(group.instances().len(), 1);
    let instance = group.instances()[0];
    assert_eq!(instance.custom_id, 0);
    assert_eq!(instance.hit_group_id, 2);
    assert_eq!(instance.transform, Mat4::IDENTITY);

    let object_instance = group.object_instances()[0];
    assert_eq!(object_instance.object_type, ImplicitType::Sphere as u32);
    assert_eq!(object_instance.object_id, 0);

    let entry = builder.blas(blas_id).unwrap();
    assert_eq!(entry.input().geometries().len(), 1);
    assert_eq!(
        Some(entry.device_address()),
        builder.blas_device_address(blas_id)
    );

    let build = &device.submissions()[0][0];
    assert_eq!(build.ranges[0].primitive_count, 3);
    match build.geometries[0] {
        Geometry::Aabbs(aabbs) => {
            assert_eq!(aabbs.stride, AABB_STRIDE);
            assert_eq!(aabbs.address % 8, 0);
        }
        _ => panic!("expected AABB geometry"),
    }
}

#[test]
fn empty_implicit_batch_is_rejected() {
    let (device, mut builder) = builder();

    let result = builder.add_implicit_objects(
        &ImplicitShapes::Boxes(Vec::new()),
        0,
        DEFAULT_TLAS_FLAGS,
    );

    assert!(matches!(result, Err(EmberError::EmptyGeometryInput(0))));
    assert!(device.submissions().is_empty());
}

#[test]
fn scene_description_rows() {
    let (_device, mut builder) = builder();
    builder
        .add_mesh_objects(
            &[MeshObject::new(
                tree(),
                Mat4::from_scale(Vec3::splat(2.0)),
            )],
            DEFAULT_TLAS_FLAGS,
        )
        .unwrap();
    let group = builder
        .add_implicit_objects(
            &ImplicitShapes::Cylinders(vec![Cylinder::new(Vec3::ZERO, Vec3::Y, 1.0)]),
            1,
            DEFAULT_TLAS_FLAGS,
        )
        .unwrap();

    assert_eq!(group.object_id(), 1);
    assert_eq!(group.instances()[0].custom_id, 1);

    let rows = builder.object_instances();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].object_type, ImplicitType::None as u32);
    assert_eq!(rows[1].object_type, ImplicitType::Cylinder as u32);
    assert!(Mat4::from_cols_array(&rows[0].inverse_transpose)
        .abs_diff_eq(Mat4::from_scale(Vec3::splat(0.5)), 1e-6));

    let buffer = builder.upload_object_instances().unwrap();
    assert_eq!(buffer.data, bytemuck::cast_slice::<_, u8>(rows).to_vec());

    builder.rebuild_tlas(DEFAULT_TLAS_FLAGS).unwrap();
    assert_eq!(builder.tlas().unwrap().instance_count(), 2);
}

#[test]
fn empty_scene_description_is_rejected() {
    let (_device, builder) = builder();

    assert!(matches!(
        builder.upload_object_instances(),
        Err(EmberError::EmptyInstanceList)
    ));
}

#[test]
fn object_instance_row() {
    let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let row = ObjectInstance::new(transform, 7, ImplicitType::Box);

    assert_eq!(row.transform, transform.to_cols_array());
    assert_eq!(row.object_id, 7);
    assert_eq!(row.object_type, 4);

    let (_device, mut builder) = builder();
    let ids = builder
        .build_blas(vec![BlasInput::from_drawable(&tree())], DEFAULT_TLAS_FLAGS)
        .unwrap();

    let mut group = InstanceGroup::new(
        SceneObject::Mesh(MeshObject::new(tree(), Mat4::IDENTITY)),
        3,
    );
    let added = group.add(Instance {
        transform,
        ..Instance::new(ids[0])
    });
    assert_eq!(added.object_id, 3);
    assert_eq!(added.object_type, ImplicitType::None as u32);
    assert_eq!(group.instances().len(), 1);
    assert!(group.instance_id("tree").is_err());
}
