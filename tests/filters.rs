mod common;

use chunk_ecs::{ComponentType, EcsError, EcsResult, Entity, FilterError, World};

use common::*;

fn teams_world(red: usize, blue: usize) -> (World, Types, Vec<Entity>) {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.team]);
    let entities = world.create_entities(arch, red + blue).unwrap();
    for &entity in &entities[..red] {
        world.set_shared_component(entity, Team(1)).unwrap();
    }
    for &entity in &entities[red..] {
        world.set_shared_component(entity, Team(2)).unwrap();
    }
    (world, t, entities)
}

#[test]
fn shared_filter_selects_matching_chunks() -> EcsResult<()> {
    let (mut world, _, entities) = teams_world(10, 250);
    let mut group = world.query().read::<Position>()?.read::<Team>()?.build()?;
    assert_eq!(world.calculate_length(&group), 260);

    world.set_shared_filter(&mut group, Team(1))?;
    assert_eq!(world.calculate_length(&group), 10);
    let red = world.entity_array(&group).to_vec()?;
    assert!(red.iter().all(|e| entities[..10].contains(e)));

    world.set_shared_filter(&mut group, Team(2))?;
    assert_eq!(world.calculate_length(&group), 250);
    // 213 rows per chunk: blue entities span two chunks.
    assert_eq!(world.archetype_chunk_array(&group).len(), 2);

    world.set_shared_filter(&mut group, Team(9))?;
    assert_eq!(world.calculate_length(&group), 0);

    group.reset_filter();
    assert_eq!(world.calculate_length(&group), 260);
    Ok(())
}

#[test]
fn shared_view_reports_chunk_values() -> EcsResult<()> {
    let (mut world, _, _) = teams_world(3, 4);
    let group = world.query().read::<Team>()?.build()?;

    let mut teams = world.shared_component_data_array::<Team>(&group)?;
    let mut seen = Vec::new();
    for i in 0..teams.len() {
        seen.push(teams.get(i)?.0);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 1, 1, 2, 2, 2, 2]);
    Ok(())
}

#[test]
fn two_shared_values_must_all_match() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.team, t.lod]);
    let entities = world.create_entities(arch, 12)?;
    for (i, &entity) in entities.iter().enumerate() {
        world.set_shared_component(entity, Team((i % 2) as u32))?;
        world.set_shared_component(entity, Lod((i % 3) as u8))?;
    }

    let mut group = world.query().read::<Team>()?.read::<Lod>()?.build()?;
    world.set_shared_filter2(&mut group, Team(1), Lod(2))?;

    // i % 2 == 1 and i % 3 == 2: i in {5, 11}.
    let mut matched = world.entity_array(&group).to_vec()?;
    matched.sort_by_key(|e| e.index());
    assert_eq!(matched, vec![entities[5], entities[11]]);

    for entity in matched {
        assert_eq!(world.get_shared_component::<Team>(entity)?, &Team(1));
        assert_eq!(world.get_shared_component::<Lod>(entity)?, &Lod(2));
    }
    Ok(())
}

/// 300 entities in chunks of 128, 128 and 44, created at version 1.
fn versioned_world() -> (World, Types) {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position, t.velocity]);
    world.create_entities(arch, 300).unwrap();
    (world, t)
}

#[test]
fn written_chunk_passes_changed_filter() -> EcsResult<()> {
    let (mut world, t) = versioned_world();
    let writer = world.query().write::<Position>()?.build()?;

    assert_eq!(world.increment_global_system_version(), 2);
    world.component_data_array_mut::<Position>(&writer)?.set(150, Position([1.0; 4]))?;

    let mut changed = world.query().read::<Position>()?.build()?;
    world.set_changed_filter(&mut changed, &[ComponentType::read_only(t.position)], 1)?;
    assert_eq!(world.calculate_length(&changed), 128);

    let chunks = world.archetype_chunk_array(&changed);
    assert_eq!(chunks.len(), 1);
    let chunk = chunks.get(0).unwrap();
    assert!(chunk.did_change::<Position>(1)?);
    assert!(!chunk.did_change::<Velocity>(1)?);
    assert_eq!(chunk.change_version::<Position>()?, 2);

    // Nothing is newer than the current version.
    world.set_changed_filter(&mut changed, &[ComponentType::read_only(t.position)], 2)?;
    assert_eq!(world.calculate_length(&changed), 0);
    Ok(())
}

#[test]
fn filtered_indices_skip_unchanged_chunks() -> EcsResult<()> {
    let (mut world, t) = versioned_world();
    let writer = world.query().write::<Position>()?.build()?;
    let all = world.entity_array(&writer).to_vec()?;

    world.increment_global_system_version();
    {
        let mut positions = world.component_data_array_mut::<Position>(&writer)?;
        positions.set(0, Position([7.0; 4]))?;
        positions.set(260, Position([9.0; 4]))?;
    }

    let mut group = world.query().read::<Position>()?.build()?;
    world.set_changed_filter(&mut group, &[ComponentType::read_only(t.position)], 1)?;
    assert_eq!(world.calculate_length(&group), 128 + 44);

    let mut entities = world.entity_array(&group);
    assert_eq!(entities.get(0)?, all[0]);
    assert_eq!(entities.get(130)?, all[258]);
    assert_eq!(entities.get(127)?, all[127]);
    assert_eq!(entities.get(171)?, all[299]);
    assert!(matches!(entities.get(172), Err(EcsError::IndexOutOfRange(_))));

    let mut positions = world.component_data_array::<Position>(&group)?;
    assert_eq!(positions.get(132)?, Position([9.0; 4]));
    assert_eq!(positions.get(0)?, Position([7.0; 4]));
    Ok(())
}

#[test]
fn changed_filter_over_two_columns_matches_either() -> EcsResult<()> {
    let (mut world, t) = versioned_world();
    let writer = world.query().write::<Position>()?.write::<Velocity>()?.build()?;

    world.increment_global_system_version();
    world.component_data_array_mut::<Position>(&writer)?.set(0, Position([1.0; 4]))?;
    world.component_data_array_mut::<Velocity>(&writer)?.set(299, Velocity([1.0; 4]))?;

    let mut group = world.query().read::<Position>()?.read::<Velocity>()?.build()?;
    world.set_changed_filter(
        &mut group,
        &[ComponentType::read_only(t.position), ComponentType::read_only(t.velocity)],
        1,
    )?;
    assert_eq!(world.calculate_length(&group), 128 + 44);

    world.set_changed_filter(&mut group, &[ComponentType::read_only(t.velocity)], 1)?;
    assert_eq!(world.calculate_length(&group), 44);
    Ok(())
}

#[test]
fn write_after_read_in_same_chunk_is_recorded() -> EcsResult<()> {
    let (mut world, t) = versioned_world();
    let writer = world.query().write::<Position>()?.build()?;
    world.increment_global_system_version();

    {
        let mut positions = world.component_data_array_mut::<Position>(&writer)?;
        // Caches chunk 0 for reading, then writes inside that range.
        assert_eq!(positions.get(3)?, Position::default());
        positions.set(4, Position([4.0; 4]))?;
    }

    let mut changed = world.query().read::<Position>()?.build()?;
    world.set_changed_filter(&mut changed, &[ComponentType::read_only(t.position)], 1)?;
    assert_eq!(world.calculate_length(&changed), 128);
    Ok(())
}

#[test]
fn reads_do_not_bump_versions() -> EcsResult<()> {
    let (mut world, t) = versioned_world();
    let writer = world.query().write::<Position>()?.build()?;
    world.increment_global_system_version();

    {
        let mut positions = world.component_data_array_mut::<Position>(&writer)?;
        for i in 0..300 {
            positions.get(i)?;
        }
    }

    let mut changed = world.query().read::<Position>()?.build()?;
    world.set_changed_filter(&mut changed, &[ComponentType::read_only(t.position)], 1)?;
    assert_eq!(world.calculate_length(&changed), 0);
    assert!(!world.did_change::<Position>(&writer, 1)?);
    Ok(())
}

#[test]
fn filter_kinds_cannot_be_mixed() -> EcsResult<()> {
    let (mut world, t, _) = teams_world(2, 2);
    let mut group = world.query().read::<Position>()?.read::<Team>()?.build()?;

    world.set_shared_filter(&mut group, Team(1))?;
    assert_eq!(
        world.set_changed_filter(&mut group, &[ComponentType::read_only(t.position)], 1),
        Err(EcsError::Filter(FilterError::MixedKinds))
    );

    group.reset_filter();
    world.set_changed_filter(&mut group, &[ComponentType::read_only(t.position)], 1)?;
    assert_eq!(
        world.set_shared_filter(&mut group, Team(1)),
        Err(EcsError::Filter(FilterError::MixedKinds))
    );
    Ok(())
}

#[test]
fn changed_filter_accepts_at_most_two_columns() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let mut group = world.query().read::<Position>()?.read::<Velocity>()?.read::<X>()?.build()?;

    let three = [
        ComponentType::read_only(t.position),
        ComponentType::read_only(t.velocity),
        ComponentType::read_only(t.x),
    ];
    assert_eq!(
        world.set_changed_filter(&mut group, &three, 1),
        Err(EcsError::Filter(FilterError::TooManyComponents { requested: 3, max: 2 }))
    );
    assert!(group.filter().is_none());
    Ok(())
}

#[test]
fn filtered_type_must_be_in_group() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let mut group = world.query().read::<Position>()?.build()?;

    assert!(matches!(
        world.set_changed_filter(&mut group, &[ComponentType::read_only(t.velocity)], 1),
        Err(EcsError::Filter(FilterError::NotInGroup(_)))
    ));
    assert!(matches!(
        world.set_shared_filter(&mut group, Team(1)),
        Err(EcsError::Filter(FilterError::NotInGroup(_)))
    ));
    Ok(())
}

#[test]
fn shared_filter_needs_a_shared_type() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let mut group = world.query().read::<Position>()?.build()?;

    assert_eq!(
        world.set_shared_filter(&mut group, Position::default()),
        Err(EcsError::Filter(FilterError::WrongCategory { type_index: t.position }))
    );
    Ok(())
}
