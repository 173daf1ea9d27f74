#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};

use chunk_ecs::{ArchetypeId, ComponentType, TypeIndex, World, WorldConfig};

/// Chunk budget used by the tests: 128 rows of `Entity + Position + Velocity`.
pub const TEST_CHUNK_BYTES: usize = 5120;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Position(pub [f32; 4]);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Velocity(pub [f32; 4]);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct X(pub u32);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Y(pub u32);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Waypoint(pub [f32; 2]);

pub struct Frozen;

/// Too large for a test chunk on its own.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Big {
    pub a: [u8; 4096],
    pub b: [u8; 4096],
}

/// Sized type, rejected as a tag.
pub struct Marker(pub u8);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Team(pub u32);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lod(pub u8);

/// Type indices of the test components in one world.
pub struct Types {
    pub position: TypeIndex,
    pub velocity: TypeIndex,
    pub x: TypeIndex,
    pub y: TypeIndex,
    pub waypoint: TypeIndex,
    pub frozen: TypeIndex,
    pub team: TypeIndex,
    pub lod: TypeIndex,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// World with the test chunk budget and every test component registered.
pub fn test_world() -> (World, Types) {
    init_logging();
    let config = WorldConfig::default()
        .with_chunk_bytes(TEST_CHUNK_BYTES)
        .with_safety_checks(true);
    let mut world = World::with_config(config).unwrap();

    let types = Types {
        position: world.register::<Position>().unwrap(),
        velocity: world.register::<Velocity>().unwrap(),
        x: world.register::<X>().unwrap(),
        y: world.register::<Y>().unwrap(),
        waypoint: world.register_buffer::<Waypoint>().unwrap(),
        frozen: world.register_tag::<Frozen>().unwrap(),
        team: world.register_shared::<Team>().unwrap(),
        lod: world.register_shared::<Lod>().unwrap(),
    };
    (world, types)
}

pub fn archetype_of(world: &mut World, types: &[TypeIndex]) -> ArchetypeId {
    let handles: Vec<ComponentType> = types.iter().copied().map(ComponentType::read_write).collect();
    world.archetype(&handles).unwrap()
}
