
use bytemuck::{Pod, Zeroable};
use ember::{
    EmberError, RayTracingProperties, ShaderGroupType, ShaderTableKind, ShaderTablesDescription,
};
use erupt::vk;
use fixture::MockDevice;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct HitRecord {
    vertex_address: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct MaterialRecord {
    albedo: [f32; 4],
    emission: [f32; 4],
    roughness: f32,
    metallic: f32,
}

fn hit_record_description() -> ShaderTablesDescription {
    let mut description = ShaderTablesDescription::new();
    description.ray_gen_group(0);
    description.add_miss_group(1);
    description.add_miss_group(2);
    for index in 0..3 {
        description.add_hit_group(Some(3), None, None, ShaderGroupType::TrianglesHitGroup);
        description
            .add_hit_record(
                index,
                &HitRecord {
                    vertex_address: 0x1000 * (index as u64 + 1),
                },
            )
            .unwrap();
    }
    description
}

#[test]
fn compiled_table_strides() {
    let device = MockDevice::default();
    let mut description = hit_record_description();
    let pipeline = device.pipeline(description.group_count());

    let tables = description.compile(&device, &pipeline).unwrap();

    let ray_gen = tables.ray_gen.region();
    let miss = tables.miss.region();
    let hit = tables.hit.region();
    assert_eq!(ray_gen.stride, 64);
    assert_eq!(ray_gen.size, 64);
    assert_eq!(miss.stride, 64);
    assert_eq!(miss.size, 128);
    assert!(hit.stride >= 32 + 8);
    assert_eq!(hit.stride % 64, 0);
    assert_eq!(hit.size, 3 * hit.stride);
    assert_eq!(tables.hit_group_count(), 3);
    assert_eq!(tables.callable.region().size, 0);
    assert!(tables.callable.buffer().is_none());

    for region in [ray_gen, miss, hit].iter() {
        assert_eq!(region.device_address % 64, 0);
    }

    let data = &tables.hit.buffer().unwrap().data;
    for (index, slot) in data.chunks_exact(hit.stride as usize).enumerate() {
        assert_eq!(&slot[..32], device.handle(3 + index as u32).as_slice());
        let record = HitRecord {
            vertex_address: 0x1000 * (index as u64 + 1),
        };
        assert_eq!(&slot[32..40], bytemuck::bytes_of(&record));
        assert!(slot[40..].iter().all(|byte| *byte == 0));
    }

    let regions = tables.regions();
    assert_eq!(regions[0].device_address, ray_gen.device_address);
    assert_eq!(regions[2].stride, hit.stride);
    assert_eq!(regions[3].size, 0);
}

#[test]
fn stride_fits_the_largest_record() {
    let properties = RayTracingProperties {
        shader_group_handle_size: 32,
        shader_group_handle_alignment: 64,
        shader_group_base_alignment: 64,
        min_scratch_offset_alignment: 256,
    };
    let mut description = ShaderTablesDescription::new();
    description.ray_gen_group(0);
    description.add_hit_group(Some(1), None, None, ShaderGroupType::TrianglesHitGroup);
    description.add_hit_group(Some(2), Some(3), None, ShaderGroupType::ProceduralHitGroup);
    description.add_hit_group(Some(1), None, None, ShaderGroupType::TrianglesHitGroup);
    description
        .add_hit_record(0, &HitRecord { vertex_address: 1 })
        .unwrap();
    let material = MaterialRecord {
        albedo: [1.0, 0.5, 0.25, 1.0],
        emission: [0.0; 4],
        roughness: 0.5,
        metallic: 1.0,
    };
    description.add_hit_record(1, &material).unwrap();

    let layout = description.layout(&properties);
    assert_eq!(layout.handle_size_aligned, 64);
    assert_eq!(layout.hit.stride, 128);
    assert_eq!(layout.hit.size, 3 * 128);
    assert_eq!(layout.ray_gen.stride, 64);
    assert_eq!(layout.miss.size, 0);

    let device = MockDevice::new(properties);
    let pipeline = device.pipeline(description.group_count());
    let tables = description.compile(&device, &pipeline).unwrap();

    let data = &tables.hit.buffer().unwrap().data;
    let slot = &data[128..256];
    assert_eq!(&slot[..32], device.handle(2).as_slice());
    assert!(slot[32..64].iter().all(|byte| *byte == 0));
    assert_eq!(&slot[64..104], bytemuck::bytes_of(&material));
    assert_eq!(&data[256..288], device.handle(3).as_slice());
}

#[test]
fn groups_keep_insertion_order() {
    let device = MockDevice::default();
    let mut description = ShaderTablesDescription::new();

    let groups = vec![
        description.add_hit_group(Some(4), None, Some(5), ShaderGroupType::TrianglesHitGroup),
        description.ray_gen_group(0),
        description.add_miss_group(1),
        description.add_hit_group(None, Some(6), None, ShaderGroupType::ProceduralHitGroup),
        description.add_callable_group(2),
        description.add_miss_group(3),
    ];

    assert_eq!(description.pipeline_groups(), groups.as_slice());
    assert_eq!(description.group_count(), 6);
    assert_eq!(description.hit_group_count(), 2);

    let indices = |kind| {
        description
            .table(kind)
            .groups()
            .iter()
            .map(|group| group.pipeline_index())
            .collect::<Vec<_>>()
    };
    assert_eq!(indices(ShaderTableKind::RayGen), vec![1]);
    assert_eq!(indices(ShaderTableKind::Miss), vec![2, 5]);
    assert_eq!(indices(ShaderTableKind::Hit), vec![0, 3]);
    assert_eq!(indices(ShaderTableKind::Callable), vec![4]);

    let pipeline = device.pipeline(description.group_count());
    let tables = description.compile(&device, &pipeline).unwrap();

    let slot = |data: &[u8], index: usize| data[index * 64..index * 64 + 32].to_vec();
    let hit = tables.hit.buffer().unwrap().data.as_slice();
    assert_eq!(slot(hit, 0), device.handle(0));
    assert_eq!(slot(hit, 1), device.handle(3));
    let miss = tables.miss.buffer().unwrap().data.as_slice();
    assert_eq!(slot(miss, 0), device.handle(2));
    assert_eq!(slot(miss, 1), device.handle(5));
    assert_eq!(slot(tables.ray_gen.buffer().unwrap().data.as_slice(), 0), device.handle(1));
    assert_eq!(slot(tables.callable.buffer().unwrap().data.as_slice(), 0), device.handle(4));
}

#[test]
fn compile_clears_the_description() {
    let device = MockDevice::default();
    let mut description = hit_record_description();
    let pipeline = device.pipeline(description.group_count());

    description.compile(&device, &pipeline).unwrap();

    assert_eq!(description.group_count(), 0);
    assert!(description.pipeline_groups().is_empty());
    assert!(description.table(ShaderTableKind::Hit).is_empty());
    assert!(description.table(ShaderTableKind::Miss).is_empty());

    let tables = description.compile(&device, &pipeline).unwrap();
    for region in tables.regions().iter() {
        assert_eq!(region.device_address, 0);
        assert_eq!(region.stride, 0);
        assert_eq!(region.size, 0);
    }
    assert!(tables.ray_gen.buffer().is_none());
    assert!(tables.hit.buffer().is_none());
    assert_eq!(tables.hit_group_count(), 0);
}

#[test]
fn properties_from_vulkan_structs() {
    let pipeline = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR {
        shader_group_handle_size: 32,
        shader_group_handle_alignment: 64,
        shader_group_base_alignment: 128,
        ..Default::default()
    };
    let acceleration_structure = vk::PhysicalDeviceAccelerationStructurePropertiesKHR {
        min_acceleration_structure_scratch_offset_alignment: 256,
        ..Default::default()
    };

    let properties = RayTracingProperties::from_vk(&pipeline, &acceleration_structure);

    assert_eq!(properties.shader_group_handle_size, 32);
    assert_eq!(properties.shader_group_handle_alignment, 64);
    assert_eq!(properties.shader_group_base_alignment, 128);
    assert_eq!(properties.min_scratch_offset_alignment, 256);
    assert_eq!(properties.handle_size_aligned(), 64);
}

#[test]
fn records_need_an_existing_group() {
    let mut description = ShaderTablesDescription::new();
    description.add_miss_group(0);

    assert!(matches!(
        description.add_hit_record(0, &HitRecord { vertex_address: 1 }),
        Err(EmberError::UnknownShaderGroup(0))
    ));
    assert!(matches!(
        description.add_record(ShaderTableKind::Miss, 3, &1u32),
        Err(EmberError::UnknownShaderGroup(3))
    ));

    description
        .add_record(ShaderTableKind::Miss, 0, &1u32)
        .unwrap();
    description
        .add_record(ShaderTableKind::Miss, 0, &2u32)
        .unwrap();
    let miss = description.table(ShaderTableKind::Miss);
    assert_eq!(miss.max_record_size(), 8);
    assert_eq!(miss.groups()[0].record(), bytemuck::cast_slice::<u32, u8>(&[1, 2]));
}

#[test]
fn shader_groups_mark_unused_shaders() {
    let mut description = ShaderTablesDescription::new();
    let general = description.ray_gen_group(0);
    let procedural =
        description.add_hit_group(Some(1), Some(2), None, ShaderGroupType::ProceduralHitGroup);

    let general = *general.to_vk();
    assert_eq!(general._type, vk::RayTracingShaderGroupTypeKHR::GENERAL_KHR);
    assert_eq!(general.general_shader, 0);
    assert_eq!(general.closest_hit_shader, vk::SHADER_UNUSED_KHR);

    let procedural = *procedural.to_vk();
    assert_eq!(
        procedural._type,
        vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP_KHR
    );
    assert_eq!(procedural.general_shader, vk::SHADER_UNUSED_KHR);
    assert_eq!(procedural.closest_hit_shader, 1);
    assert_eq!(procedural.intersection_shader, 2);
    assert_eq!(procedural.any_hit_shader, vk::SHADER_UNUSED_KHR);
}
