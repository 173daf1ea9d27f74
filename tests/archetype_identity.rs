mod common;

use chunk_ecs::{
    ComponentType, ConfigError, EcsError, EcsResult, RegistryError, World, WorldConfig,
};

use common::*;

#[test]
fn same_type_set_in_any_order_is_one_archetype() -> EcsResult<()> {
    let (mut world, t) = test_world();

    let a = world.archetype(&[ComponentType::read_write(t.position), ComponentType::read_write(t.velocity)])?;
    let b = world.archetype(&[ComponentType::read_only(t.velocity), ComponentType::read_write(t.position)])?;
    let c = world.archetype(&[
        ComponentType::read_write(t.velocity),
        ComponentType::read_write(t.position),
        ComponentType::read_write(t.velocity),
    ])?;

    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(world.archetype_count(), 1);

    let other = world.archetype(&[ComponentType::read_write(t.position)])?;
    assert_ne!(a, other);
    assert_eq!(world.archetype_count(), 2);
    Ok(())
}

#[test]
fn entity_column_is_always_first() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.velocity, t.x, t.position]);

    let info = world.archetype_info(arch).unwrap();
    assert_eq!(info.types()[0], 0);
    assert!(info.types().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(info.types().len(), 4);
    Ok(())
}

#[test]
fn capacity_follows_row_size() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);

    // 8 (entity) + 16 + 16 bytes per row in a 5120-byte chunk.
    let layout = world.archetype_info(arch).unwrap().layout();
    assert_eq!(layout.row_size, 40);
    assert_eq!(layout.capacity, 128);
    Ok(())
}

#[test]
fn default_chunk_budget_capacity() -> EcsResult<()> {
    let mut world = World::new();
    let position = world.register::<Position>()?;
    let velocity = world.register::<Velocity>()?;
    let arch = world.archetype(&[ComponentType::read_write(position), ComponentType::read_write(velocity)])?;

    assert_eq!(world.archetype_info(arch).unwrap().capacity(), 16 * 1024 / 40);
    assert_eq!(world.archetype_info(arch).unwrap().capacity(), 409);
    Ok(())
}

#[test]
fn tags_and_shared_types_take_no_row_space() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let plain = archetype_of(&mut world, &[t.position, t.velocity]);
    let tagged = archetype_of(&mut world, &[t.position, t.velocity, t.frozen, t.team]);

    let plain = world.archetype_info(plain).unwrap().layout().clone();
    let tagged = world.archetype_info(tagged).unwrap().layout();
    assert_eq!(plain.row_size, tagged.row_size);
    assert_eq!(plain.capacity, tagged.capacity);
    assert_eq!(tagged.shared_count, 1);
    Ok(())
}

#[test]
fn oversized_row_is_a_capacity_error() {
    let (mut world, _) = test_world();
    let big = world.register::<Big>().unwrap();

    match world.archetype(&[ComponentType::read_write(big)]) {
        Err(EcsError::ChunkCapacity(e)) => {
            assert_eq!(e.chunk_bytes, TEST_CHUNK_BYTES);
            assert_eq!(e.size, 8 + 8192);
            assert!(e.type_name.contains("Big"));
        }
        other => panic!("expected a capacity error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(world.archetype_count(), 0);
}

#[test]
fn invalid_chunk_budget_is_rejected() {
    for chunk_bytes in [0, 1000, 5121] {
        let config = WorldConfig::default().with_chunk_bytes(chunk_bytes);
        assert!(matches!(
            World::with_config(config),
            Err(EcsError::Config(ConfigError::ChunkBytes { block: 16, .. }))
        ));
    }
}

#[test]
fn registration_is_idempotent_per_category() {
    let (mut world, t) = test_world();

    assert_eq!(world.register::<Position>().unwrap(), t.position);
    assert_eq!(world.type_index::<Position>().unwrap(), t.position);
    assert!(matches!(
        world.register_shared::<Position>(),
        Err(EcsError::Registry(RegistryError::CategoryMismatch { .. }))
    ));
    assert!(matches!(
        world.register_tag::<Marker>(),
        Err(EcsError::Registry(RegistryError::SizedTag { .. }))
    ));
}

#[test]
fn frozen_registry_rejects_new_types() {
    let (mut world, t) = test_world();
    world.freeze_components();

    assert_eq!(world.register::<Velocity>().unwrap(), t.velocity);
    assert!(matches!(
        world.register::<Big>(),
        Err(EcsError::Registry(RegistryError::Frozen))
    ));
}

#[test]
fn unregistered_type_is_reported() {
    let world = World::new();
    assert!(matches!(
        world.type_index::<Position>(),
        Err(EcsError::Registry(RegistryError::Unregistered { .. }))
    ));
}

#[test]
fn worlds_have_independent_registries() -> EcsResult<()> {
    let mut first = World::new();
    let mut second = World::new();

    let a = first.register::<Position>()?;
    let _ = second.register::<Velocity>()?;
    let b = second.register::<Position>()?;

    assert_ne!(a, b);
    assert!(first.type_index::<Velocity>().is_err());
    Ok(())
}
