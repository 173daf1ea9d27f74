#![allow(dead_code)]

use chunk_ecs::prelude::*;

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
pub struct Wealth {
    pub value: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
pub struct Productivity {
    pub rate: f32,
}

/// World with `agent_count` agents carrying all three components.
pub fn setup_world(agent_count: usize) -> EcsResult<World> {
    let mut world = World::new();
    let position = world.register::<Position>()?;
    let wealth = world.register::<Wealth>()?;
    let productivity = world.register::<Productivity>()?;
    world.freeze_components();

    let archetype = world.archetype(&[
        ComponentType::read_write(position),
        ComponentType::read_write(wealth),
        ComponentType::read_write(productivity),
    ])?;
    let agents = world.create_entities(archetype, agent_count)?;

    for agent in agents {
        world.set_component(agent, Wealth { value: 100.0 })?;
        world.set_component(agent, Productivity { rate: 1.0 })?;
    }
    Ok(world)
}
