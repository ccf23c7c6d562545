//! World geometry: the particle system definition, the border walls around
//! the visible world and the water the demo starts with.

use glam::Vec2;

use crate::options::{SimulationOptions, WaterOptions};
use crate::renderer::ViewportState;
use crate::sim::{
    BodyId, BodyType, FluidEngine, FluidWorld, ParticleFlags, ParticleGroupDef,
    ParticleSystemDef, Shape, SimulationState, StepIterations,
};

/// Particle system parameters from the simulation options.
pub(crate) fn system_def(options: &SimulationOptions) -> ParticleSystemDef {
    ParticleSystemDef {
        radius: options.particle_radius,
        viscosity: options.viscosity,
        max_particles: options.max_particles,
        max_groups: options.max_groups,
    }
}

pub(crate) fn step_iterations(options: &SimulationOptions) -> StepIterations {
    StepIterations {
        velocity: options.velocity_iterations,
        position: options.position_iterations,
        particle: options.particle_iterations,
    }
}

/// Replace the border body with four walls of `thickness` enclosing
/// `[0, world_width] x [0, world_height]`. Returns the new body, or `None`
/// without a world.
pub(crate) fn rebuild_borders<E: FluidEngine>(
    state: &mut SimulationState<E>,
    previous: Option<BodyId>,
    viewport: &ViewportState,
    thickness: f32,
) -> Option<BodyId> {
    let Some(world) = state.world_mut() else {
        log::error!("rebuild_borders: no world");
        return None;
    };
    if let Some(body) = previous {
        world.destroy_body(body);
    }
    let border = world.create_body(BodyType::Static);
    let (w, h, t) = (viewport.world_width, viewport.world_height, thickness);
    let walls = [
        (Vec2::new(w, t), Vec2::new(w / 2.0, h + t)),
        (Vec2::new(w, t), Vec2::new(w / 2.0, -t)),
        (Vec2::new(t, h), Vec2::new(-t, h / 2.0)),
        (Vec2::new(t, h), Vec2::new(w + t, h / 2.0)),
    ];
    for (half_extents, center) in walls {
        world.add_polygon_shape(border, half_extents, center);
    }
    Some(border)
}

/// Destroy the border body if there is one.
pub(crate) fn destroy_borders<E: FluidEngine>(
    state: &mut SimulationState<E>,
    border: Option<BodyId>,
) {
    if let (Some(world), Some(body)) = (state.world_mut(), border) {
        world.destroy_body(body);
    }
}

/// Fill the starting block: a square of half extent
/// `initial_block_fraction * default_world_height` centred on the default
/// world square. Walls clip it to the visible world.
pub(crate) fn add_initial_block<E: FluidEngine>(
    state: &mut SimulationState<E>,
    simulation: &SimulationOptions,
    water: &WaterOptions,
) -> usize {
    let h = simulation.default_world_height;
    let half = h * water.initial_block_fraction;
    let def = ParticleGroupDef::new(
        ParticleFlags::WATER | ParticleFlags::MIX_COLOR,
        Shape::rect(half, half, Vec2::splat(h / 2.0)),
    );
    add_group(state, &def)
}

/// The circle emitted by one "add water" action, centred on the top-left
/// corner of the world.
pub(crate) fn water_emitter(viewport: &ViewportState, water: &WaterOptions) -> ParticleGroupDef {
    ParticleGroupDef::new(
        ParticleFlags::WATER | ParticleFlags::MIX_COLOR,
        Shape::Circle {
            center: Vec2::new(0.0, viewport.world_height),
            radius: water.emitter_radius,
        },
    )
    .with_color(water.color)
}

pub(crate) fn add_group<E: FluidEngine>(
    state: &mut SimulationState<E>,
    def: &ParticleGroupDef,
) -> usize {
    let Some(system) = state.particle_system_mut() else {
        log::error!("add particles: no particle system");
        return 0;
    };
    system.add_particles(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::sim::{ReferenceEngine, SimulationGateway};

    #[test]
    fn borders_enclose_the_world_and_are_replaced() {
        let options = Options::default();
        let gateway = SimulationGateway::new(ReferenceEngine::default());
        let mut state = gateway.acquire();
        assert!(state.init(&system_def(&options.simulation)));

        let square = ViewportState::new(3.0);
        let first = rebuild_borders(&mut state, None, &square, 1.0);
        assert!(first.is_some());
        let tall = ViewportState::for_screen(100, 200, 3.0).unwrap();
        let second = rebuild_borders(&mut state, first, &tall, 1.0);
        assert_ne!(first, second);

        let world = state.world().unwrap();
        assert_eq!(world.body_count(), 1);
        let fixtures: Vec<Shape> = world.fixtures().copied().collect();
        assert_eq!(fixtures.len(), 4);
        assert_eq!(fixtures[0], Shape::rect(3.0, 1.0, Vec2::new(1.5, 7.0)));
        assert_eq!(fixtures[3], Shape::rect(1.0, 6.0, Vec2::new(4.0, 3.0)));
    }

    #[test]
    fn initial_block_is_clipped_by_the_walls() {
        let options = Options::default();
        let gateway = SimulationGateway::new(ReferenceEngine::default());
        let mut state = gateway.acquire();
        assert!(state.init(&system_def(&options.simulation)));
        let _ = rebuild_borders(&mut state, None, &ViewportState::new(3.0), 1.0);

        let added = add_initial_block(&mut state, &options.simulation, &options.water);
        // A 3 x 3 world at spacing 0.1 holds at most 30 x 30 particles.
        assert!(added > 0 && added <= 900, "{added}");
    }

    #[test]
    fn emitter_sits_on_the_top_left_corner() {
        let viewport = ViewportState::for_screen(100, 200, 3.0).unwrap();
        let def = water_emitter(&viewport, &WaterOptions::default());
        assert_eq!(
            def.shape,
            Shape::Circle {
                center: Vec2::new(0.0, 6.0),
                radius: 0.6
            }
        );
        assert_eq!(def.color, [30, 144, 255, 220]);
    }

    #[test]
    fn missing_world_is_tolerated() {
        let gateway = SimulationGateway::new(ReferenceEngine::default());
        let mut state = gateway.acquire();
        assert!(rebuild_borders(&mut state, None, &ViewportState::new(3.0), 1.0).is_none());
        let def = water_emitter(&ViewportState::new(3.0), &WaterOptions::default());
        assert_eq!(add_group(&mut state, &def), 0);
        destroy_borders(&mut state, Some(BodyId(0)));
    }
}
