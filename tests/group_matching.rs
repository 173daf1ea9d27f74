mod common;

use std::collections::HashSet;

use chunk_ecs::{AccessMode, ComponentType, ConflictingQueryError, Disabled, EcsError, EcsResult, Entity, Prefab};

use common::*;

#[test]
fn equal_queries_share_one_group() -> EcsResult<()> {
    let (mut world, t) = test_world();

    let a = world.create_group(
        &[ComponentType::read_only(t.position), ComponentType::read_write(t.velocity)],
        &[],
    )?;
    let b = world.create_group(
        &[ComponentType::read_write(t.velocity), ComponentType::read_only(t.position)],
        &[],
    )?;
    assert_eq!(a.id(), b.id());
    assert_eq!(world.group_count(), 1);

    let built = world.query().write::<Velocity>()?.read::<Position>()?.build()?;
    assert_eq!(built.id(), a.id());
    assert_eq!(world.group_count(), 1);

    let different = world.create_group(&[ComponentType::read_only(t.position)], &[])?;
    assert_ne!(different.id(), a.id());
    assert_eq!(world.group_count(), 2);
    Ok(())
}

#[test]
fn required_list_is_canonical() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let group = world.query().read::<Velocity>()?.write::<Position>()?.build()?;

    let required = group.required_types();
    assert_eq!(required[0], ComponentType::read_only(0));
    assert_eq!(required.len(), 3);
    assert!(required.windows(2).all(|w| w[0].type_index < w[1].type_index));
    assert_eq!(group.access_mode(t.position), Some(AccessMode::ReadWrite));
    assert_eq!(group.access_mode(t.velocity), Some(AccessMode::ReadOnly));
    assert_eq!(group.access_mode(t.x), None);
    Ok(())
}

#[test]
fn x_y_archetypes() -> EcsResult<()> {
    let (mut world, t) = test_world();

    let only_x = archetype_of(&mut world, &[t.x]);
    let both = archetype_of(&mut world, &[t.x, t.y]);
    let only_y = archetype_of(&mut world, &[t.y]);
    world.create_entities(only_x, 3)?;
    world.create_entities(both, 5)?;
    world.create_entities(only_y, 7)?;

    let x = world.query().read::<X>()?.build()?;
    let y = world.query().read::<Y>()?.build()?;
    let xy = world.query().read::<X>()?.read::<Y>()?.build()?;
    let x_not_y = world.query().read::<X>()?.without::<Y>()?.build()?;

    let set = |v: Vec<u32>| v.into_iter().collect::<HashSet<_>>();
    assert_eq!(set(world.matching_archetypes(&x)), set(vec![only_x, both]));
    assert_eq!(set(world.matching_archetypes(&y)), set(vec![only_y, both]));
    assert_eq!(world.matching_archetypes(&xy), vec![both]);
    assert_eq!(world.matching_archetypes(&x_not_y), vec![only_x]);

    assert_eq!(world.calculate_length(&x), 8);
    assert_eq!(world.calculate_length(&y), 12);
    assert_eq!(world.calculate_length(&xy), 5);
    assert_eq!(world.calculate_length(&x_not_y), 3);
    Ok(())
}

#[test]
fn subtractive_entries_in_required_list() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let only_x = archetype_of(&mut world, &[t.x]);
    archetype_of(&mut world, &[t.x, t.y]);

    let group = world.create_group(&[ComponentType::read_only(t.x), ComponentType::subtractive(t.y)], &[])?;
    assert_eq!(world.matching_archetypes(&group), vec![only_x]);
    assert_eq!(group.index_in_group(t.y), None);
    assert!(group.index_in_group(t.x).is_some());
    Ok(())
}

#[test]
fn archetypes_created_later_join_existing_groups() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let group = world.query().read::<Position>()?.build()?;
    assert_eq!(world.matching_archetype_count(&group), 0);
    assert_eq!(world.calculate_length(&group), 0);

    let a = archetype_of(&mut world, &[t.position]);
    let b = archetype_of(&mut world, &[t.position, t.velocity]);
    archetype_of(&mut world, &[t.velocity]);
    world.create_entities(a, 4)?;
    world.create_entities(b, 6)?;

    assert_eq!(world.matching_archetype_count(&group), 2);
    assert_eq!(world.calculate_length(&group), 10);

    // Most recently matched archetype comes first.
    assert_eq!(world.matching_archetypes(&group), vec![b, a]);
    Ok(())
}

#[test]
fn disabled_and_prefab_need_explicit_request() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let disabled = world.type_index::<Disabled>()?;
    let prefab = world.type_index::<Prefab>()?;

    let live = archetype_of(&mut world, &[t.position]);
    let off = archetype_of(&mut world, &[t.position, disabled]);
    let template = archetype_of(&mut world, &[t.position, prefab]);
    world.create_entities(live, 2)?;
    world.create_entities(off, 3)?;
    world.create_entities(template, 4)?;

    let plain = world.query().read::<Position>()?.build()?;
    assert_eq!(world.matching_archetypes(&plain), vec![live]);
    assert_eq!(world.calculate_length(&plain), 2);

    let with_disabled = world.query().read::<Position>()?.with_tag::<Disabled>()?.build()?;
    assert_eq!(world.matching_archetypes(&with_disabled), vec![off]);
    assert_eq!(world.calculate_length(&with_disabled), 3);

    let with_prefab = world.query().read::<Position>()?.with_tag::<Prefab>()?.build()?;
    assert_eq!(world.matching_archetypes(&with_prefab), vec![template]);
    Ok(())
}

#[test]
fn disabling_an_entity_hides_it() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let arch = archetype_of(&mut world, &[t.position]);
    let entities = world.create_entities(arch, 5)?;
    let group = world.query().read::<Position>()?.build()?;

    world.add_tag::<Disabled>(entities[2])?;
    assert_eq!(world.calculate_length(&group), 4);
    assert!(!world.entity_array(&group).to_vec()?.contains(&entities[2]));

    world.remove_component::<Disabled>(entities[2])?;
    assert_eq!(world.calculate_length(&group), 5);
    Ok(())
}

#[test]
fn excluded_tag_filters_archetypes() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let moving = archetype_of(&mut world, &[t.position, t.velocity]);
    let frozen = archetype_of(&mut world, &[t.position, t.velocity, t.frozen]);
    world.create_entities(moving, 10)?;
    world.create_entities(frozen, 4)?;

    let group = world.query().write::<Position>()?.read::<Velocity>()?.without::<Frozen>()?.build()?;
    assert_eq!(world.matching_archetypes(&group), vec![moving]);
    assert_eq!(world.calculate_length(&group), 10);

    let frozen_only = world.query().read::<Position>()?.with_tag::<Frozen>()?.build()?;
    assert_eq!(world.calculate_length(&frozen_only), 4);
    Ok(())
}

#[test]
fn required_and_excluded_type_is_rejected() -> EcsResult<()> {
    let (mut world, t) = test_world();
    let only_x = archetype_of(&mut world, &[t.x]);
    world.create_entities(only_x, 2)?;
    let conflict = |type_index| Some(EcsError::ConflictingQuery(ConflictingQueryError { type_index }));

    let both = world.create_group(&[ComponentType::read_only(t.x)], &[ComponentType::read_only(t.x)]);
    assert_eq!(both.err(), conflict(t.x));

    let subtractive = world.create_group(&[ComponentType::read_write(t.x), ComponentType::subtractive(t.x)], &[]);
    assert_eq!(subtractive.err(), conflict(t.x));

    assert_eq!(world.query().read::<X>()?.without::<X>()?.build().err(), conflict(t.x));
    assert_eq!(world.query().read::<Position>()?.without::<Entity>()?.build().err(), conflict(0));
    assert_eq!(world.group_count(), 0);
    Ok(())
}
