mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use chunk_ecs::{
    AccessError, ArchetypeChunkMut, ComponentType, EcsError, EcsResult, Entity,
    IndexOutOfRangeError, MissingComponentError, World, WorldConfig,
};

use common::*;

#[test]
fn add_and_remove_components_move_entities() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    let entity = world.create_entity(arch)?;
    world.set_component(entity, Position([1.0, 2.0, 3.0, 4.0]))?;

    world.add_component(entity, Velocity([0.5; 4]))?;
    assert!(world.has_component::<Velocity>(entity));
    assert_eq!(world.get_component::<Position>(entity)?, Position([1.0, 2.0, 3.0, 4.0]));
    assert_eq!(world.get_component::<Velocity>(entity)?, Velocity([0.5; 4]));
    assert_ne!(world.entity_location(entity)?.archetype, arch);
    assert_eq!(world.archetype_count(), 2);

    // Adding an existing component overwrites it in place.
    let location = world.entity_location(entity)?;
    world.add_component(entity, Velocity([2.0; 4]))?;
    assert_eq!(world.entity_location(entity)?, location);
    assert_eq!(world.get_component::<Velocity>(entity)?, Velocity([2.0; 4]));

    world.remove_component::<Velocity>(entity)?;
    assert!(!world.has_component::<Velocity>(entity));
    assert_eq!(world.entity_location(entity)?.archetype, arch);
    assert_eq!(world.get_component::<Position>(entity)?, Position([1.0, 2.0, 3.0, 4.0]));

    assert!(matches!(
        world.remove_component::<Velocity>(entity),
        Err(EcsError::MissingComponent(MissingComponentError { .. }))
    ));
    assert!(matches!(
        world.get_component::<Velocity>(entity),
        Err(EcsError::MissingComponent(_))
    ));
    Ok(())
}

#[test]
fn entity_column_is_read_only() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    let entities = world.create_entities(arch, 3)?;
    let read_only = Err(EcsError::Access(AccessError::ReadOnly { type_index: 0 }));

    assert_eq!(world.remove_component::<Entity>(entities[0]), read_only);
    assert_eq!(world.set_component(entities[0], entities[2]), read_only);
    assert_eq!(world.add_component(entities[1], entities[2]), read_only);
    assert!(matches!(
        world.component_data_from_entity_mut::<Entity>(),
        Err(EcsError::Access(AccessError::ReadOnly { type_index: 0 }))
    ));

    // Declaring the entity column writable still yields a read-only view.
    let group = world.query().write::<Entity>()?.build()?;
    {
        let mut ids = world.component_data_array_mut::<Entity>(&group)?;
        assert!(ids.is_read_only());
        assert_eq!(ids.set(0, entities[2]), read_only);
    }

    let mut order = world.entity_array(&group).to_vec()?;
    order.sort_by_key(|e| e.index());
    assert_eq!(order, entities);
    for &entity in &entities {
        assert_eq!(world.get_component::<Entity>(entity)?, entity);
    }
    Ok(())
}

#[test]
fn destroyed_handles_are_stale() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    let entity = world.create_entity(arch)?;
    world.destroy_entity(entity)?;

    assert!(!world.is_alive(entity));
    assert!(matches!(world.get_component::<Position>(entity), Err(EcsError::StaleEntity(_))));
    assert!(matches!(world.destroy_entity(entity), Err(EcsError::StaleEntity(_))));
    assert!(!world.has_component::<Position>(entity));

    let reused = world.create_entity(arch)?;
    assert_eq!(reused.index(), entity.index());
    assert_ne!(reused, entity);
    assert!(world.is_alive(reused));
    assert!(!world.is_alive(entity));
    Ok(())
}

#[test]
fn locations_follow_swap_removal() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);
    let entities = world.create_entities(arch, 10)?;
    for (i, &entity) in entities.iter().enumerate() {
        world.set_component(entity, Position([i as f32; 4]))?;
    }

    world.destroy_entity(entities[3])?;
    assert_eq!(world.entity_location(entities[9])?.row, 3);
    assert_eq!(world.entity_count(), 9);
    for (i, &entity) in entities.iter().enumerate().filter(|(i, _)| *i != 3) {
        assert_eq!(world.get_component::<Position>(entity)?, Position([i as f32; 4]));
    }
    Ok(())
}

#[test]
fn invalid_archetype_id_is_rejected() {
    let (mut world, _) = test_world();
    assert_eq!(
        world.create_entity(7).map(|_| ()),
        Err(EcsError::IndexOutOfRange(IndexOutOfRangeError { index: 7, length: 0 }))
    );
}

#[test]
fn random_access_by_entity() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let moving = archetype_of(&mut world, &[t.position, t.velocity]);
    let still = archetype_of(&mut world, &[t.velocity]);
    let movers = world.create_entities(moving, 200)?;
    let rock = world.create_entity(still)?;

    {
        let mut positions = world.component_data_from_entity_mut::<Position>()?;
        for (i, &entity) in movers.iter().enumerate().rev() {
            positions.set(entity, Position([i as f32; 4]))?;
        }
        assert!(!positions.exists(rock));
        assert!(matches!(positions.get(rock), Err(EcsError::MissingComponent(_))));
    }

    let positions = world.component_data_from_entity::<Position>()?;
    assert!(positions.exists(movers[17]));
    assert_eq!(positions.get(movers[17])?, Position([17.0; 4]));
    assert_eq!(positions.get(movers[199])?, Position([199.0; 4]));
    Ok(())
}

#[test]
fn read_only_lookup_rejects_writes() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    let entity = world.create_entity(arch)?;

    let mut positions = world.component_data_from_entity::<Position>()?;
    assert_eq!(
        positions.set(entity, Position::default()),
        Err(EcsError::Access(AccessError::ReadOnly { type_index: t.position }))
    );
    Ok(())
}

#[test]
fn read_only_arrays_reject_writes() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    world.create_entities(arch, 3)?;

    let reader = world.query().read::<Position>()?.build()?;
    {
        let mut positions = world.component_data_array::<Position>(&reader)?;
        assert!(positions.is_read_only());
        assert!(matches!(positions.set(0, Position::default()), Err(EcsError::Access(AccessError::ReadOnly { .. }))));
    }
    {
        let mut positions = world.component_data_array_mut::<Position>(&reader)?;
        assert!(positions.is_read_only());
        assert!(matches!(positions.get_mut(1), Err(EcsError::Access(AccessError::ReadOnly { .. }))));
        assert_eq!(positions.get(1)?, Position::default());
    }
    Ok(())
}

#[test]
fn views_reject_types_outside_the_group() -> EcsResult<()> {
    let (mut world, t) = test_world();
    archetype_of(&mut world, &[t.position, t.velocity]);
    let group = world.query().read::<Position>()?.build()?;

    assert!(matches!(
        world.component_data_array::<Velocity>(&group),
        Err(EcsError::ComponentNotInGroup(_))
    ));
    assert!(matches!(
        world.shared_component_data_array::<Team>(&group),
        Err(EcsError::ComponentNotInGroup(_))
    ));
    Ok(())
}

#[test]
fn did_change_tracks_whole_group() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);
    let entities = world.create_entities(arch, 300)?;
    let group = world.query().read::<Position>()?.read::<Velocity>()?.build()?;

    assert!(world.did_change::<Position>(&group, 0)?);
    assert!(!world.did_change::<Position>(&group, 1)?);

    world.increment_global_system_version();
    world.set_component(entities[299], Position([3.0; 4]))?;
    assert!(world.did_change::<Position>(&group, 1)?);
    assert!(!world.did_change::<Velocity>(&group, 1)?);
    assert!(matches!(world.did_change::<X>(&group, 1), Err(EcsError::ComponentNotInGroup(_))));
    Ok(())
}

#[test]
fn version_counter_skips_zero() {
    let mut world = World::new();
    assert_eq!(world.global_system_version(), 1);
    assert_eq!(world.increment_global_system_version(), 2);
    assert_eq!(world.increment_global_system_version(), 3);
    assert_eq!(world.global_system_version(), 3);
}

#[test]
fn parallel_chunks_update_every_entity() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);
    let entities = world.create_entities(arch, 1000)?;
    for &entity in &entities {
        world.set_component(entity, Velocity([1.0, 2.0, 0.0, 0.0]))?;
    }

    let group = world.query().write::<Position>()?.read::<Velocity>()?.build()?;
    let visited = AtomicUsize::new(0);
    world.increment_global_system_version();

    for _ in 0..3 {
        world.par_for_each_chunk(&group, |mut chunk: ArchetypeChunkMut<'_>| {
            let (velocities, positions) = chunk.read_write::<Velocity, Position>()?;
            for (p, v) in positions.iter_mut().zip(velocities) {
                p.0[0] += v.0[0];
                p.0[1] += v.0[1];
            }
            visited.fetch_add(chunk.count(), Ordering::Relaxed);
            Ok(())
        })?;
    }

    assert_eq!(visited.load(Ordering::Relaxed), 3000);
    for &entity in &entities {
        assert_eq!(world.get_component::<Position>(entity)?, Position([3.0, 6.0, 0.0, 0.0]));
    }
    assert!(world.did_change::<Position>(&group, 1)?);
    assert!(world.access_tracker().is_free(t.position));
    assert!(world.access_tracker().is_free(t.velocity));
    Ok(())
}

#[test]
fn parallel_chunks_respect_read_only_columns() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);
    world.create_entities(arch, 300)?;
    let group = world.query().write::<Position>()?.read::<Velocity>()?.build()?;

    let result = world.par_for_each_chunk(&group, |mut chunk: ArchetypeChunkMut<'_>| {
        chunk.column_mut::<Velocity>()?[0] = Velocity([9.0; 4]);
        Ok(())
    });
    assert_eq!(result, Err(EcsError::Access(AccessError::ReadOnly { type_index: t.velocity })));

    // The guard was released despite the error.
    assert!(world.access_tracker().is_free(t.position));
    assert!(world.access_tracker().is_free(t.velocity));
    Ok(())
}

#[test]
fn parallel_chunks_honour_filters() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);
    world.create_entities(arch, 300)?;

    let writer = world.query().write::<Position>()?.build()?;
    world.increment_global_system_version();
    world.component_data_array_mut::<Position>(&writer)?.set(200, Position([1.0; 4]))?;

    let mut group = world.query().write::<Velocity>()?.read::<Position>()?.build()?;
    world.set_changed_filter(&mut group, &[ComponentType::read_only(t.position)], 1)?;

    let visited = AtomicUsize::new(0);
    world.par_for_each_chunk(&group, |mut chunk: ArchetypeChunkMut<'_>| {
        for v in chunk.column_mut::<Velocity>()? {
            v.0[3] = 1.0;
        }
        visited.fetch_add(chunk.count(), Ordering::Relaxed);
        Ok(())
    })?;
    assert_eq!(visited.load(Ordering::Relaxed), 128);
    Ok(())
}

#[test]
fn access_tracker_detects_conflicts() -> EcsResult<()> {
    let (world, t) = test_world();

    let first = world.try_acquire(&[t.position], &[])?;
    let second = world.try_acquire(&[t.position], &[t.velocity])?;
    assert!(matches!(
        world.try_acquire(&[], &[t.position]),
        Err(EcsError::Access(AccessError::Conflict { .. }))
    ));
    assert!(matches!(
        world.try_acquire(&[t.velocity], &[]),
        Err(EcsError::Access(AccessError::Conflict { .. }))
    ));

    drop(first);
    drop(second);
    assert!(world.access_tracker().is_free(t.position));
    let writer = world.try_acquire(&[], &[t.position])?;
    assert_eq!(writer.writes(), &[t.position]);
    Ok(())
}

#[test]
fn concurrent_readers_never_conflict() {
    let (world, t) = test_world();
    let tracker = world.access_tracker();
    let conflicts = AtomicUsize::new(0);

    (0..8).into_par_iter().for_each(|_| {
        for _ in 0..20_000 {
            match tracker.try_acquire_read(t.position) {
                Ok(()) => tracker.release_read(t.position),
                Err(_) => {
                    conflicts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    assert_eq!(conflicts.load(Ordering::Relaxed), 0);
    assert!(tracker.is_free(t.position));
}

#[test]
fn failed_acquire_releases_partial_borrows() -> EcsResult<()> {
    let (world, t) = test_world();

    let held = world.try_acquire(&[], &[t.velocity])?;
    assert!(world.try_acquire(&[], &[t.position, t.velocity]).is_err());
    assert!(world.access_tracker().is_free(t.position));
    drop(held);

    assert!(matches!(
        world.try_acquire(&[t.x], &[t.x]),
        Err(EcsError::Access(AccessError::ReadAndWrite { .. }))
    ));
    assert!(world.access_tracker().is_free(t.x));
    Ok(())
}

#[test]
fn shared_components_round_trip() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.team]);
    let entities = world.create_entities(arch, 4)?;

    assert_eq!(world.get_shared_component::<Team>(entities[0])?, &Team::default());

    world.set_shared_component(entities[0], Team(3))?;
    world.set_shared_component(entities[1], Team(3))?;
    assert_eq!(world.get_shared_component::<Team>(entities[0])?, &Team(3));
    assert_eq!(
        world.entity_location(entities[0])?.chunk,
        world.entity_location(entities[1])?.chunk
    );
    assert_ne!(
        world.entity_location(entities[0])?.chunk,
        world.entity_location(entities[2])?.chunk
    );
    assert_eq!(world.chunk_count(), 2);
    Ok(())
}

#[test]
fn setting_a_missing_shared_component_adds_it() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    let entity = world.create_entity(arch)?;
    world.set_component(entity, Position([5.0; 4]))?;

    world.set_shared_component(entity, Lod(4))?;
    assert!(world.has_component::<Lod>(entity));
    assert_eq!(world.get_shared_component::<Lod>(entity)?, &Lod(4));
    assert_eq!(world.get_component::<Position>(entity)?, Position([5.0; 4]));
    Ok(())
}

#[test]
fn empty_chunk_buffers_are_pooled_only_when_configured() -> EcsResult<()> {
    for keep in [true, false] {
        let config = WorldConfig::default().with_chunk_bytes(TEST_CHUNK_BYTES).with_keep_empty_chunk(keep);
        let mut world = World::with_config(config)?;
        let position = world.register::<Position>()?;
        let arch = world.archetype(&[ComponentType::read_write(position)])?;

        let entities = world.create_entities(arch, 500)?;
        let chunks = world.chunk_count();
        assert!(chunks >= 2);
        for entity in entities {
            world.destroy_entity(entity)?;
        }
        assert_eq!(world.chunk_count(), 0);
        assert_eq!(world.pooled_chunk_buffers(), if keep { chunks } else { 0 });

        world.create_entities(arch, 10)?;
        assert_eq!(world.chunk_count(), 1);
        assert_eq!(world.pooled_chunk_buffers(), if keep { chunks - 1 } else { 0 });
    }
    Ok(())
}
