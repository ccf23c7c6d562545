//! Lock-guarded access to the simulation world.

use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::Vec2;

use super::{FluidEngine, FluidWorld, ParticleSystem, ParticleSystemDef};

/// Everything behind the gateway lock: the engine, and the world with its
/// particle system once [`init`](Self::init) has run.
#[derive(Debug)]
pub struct SimulationState<E: FluidEngine> {
    engine: E,
    world: Option<E::World>,
}

impl<E: FluidEngine> SimulationState<E> {
    /// The world, or `None` before `init` or after `delete_world`.
    pub fn world(&self) -> Option<&E::World> {
        self.world.as_ref()
    }

    /// Mutable world access.
    pub fn world_mut(&mut self) -> Option<&mut E::World> {
        self.world.as_mut()
    }

    /// The world's particle system, if both exist.
    pub fn particle_system(&self) -> Option<&dyn ParticleSystem> {
        self.world.as_ref()?.particle_system()
    }

    /// Mutable particle system access.
    pub fn particle_system_mut(&mut self) -> Option<&mut dyn ParticleSystem> {
        self.world.as_mut()?.particle_system_mut()
    }

    /// Create a zero-gravity world and its particle system, destroying any
    /// previous world. Returns whether a world now exists.
    pub fn init(&mut self, def: &ParticleSystemDef) -> bool {
        self.delete_world();
        let Some(mut world) = self.engine.create_world(Vec2::ZERO) else {
            log::error!("simulation init: engine returned no world");
            return false;
        };
        world.create_particle_system(def);
        self.world = Some(world);
        true
    }

    /// Destroy the world and drop both handles. No-op without a world.
    pub fn delete_world(&mut self) {
        if let Some(world) = self.world.take() {
            self.engine.destroy_world(world);
        }
    }
}

/// Scoped hold on the simulation lock. Dropping it releases the lock.
pub type SimulationGuard<'a, E> = MutexGuard<'a, SimulationState<E>>;

/// The single lock shared by the render thread, the sensor thread and UI
/// actions.
///
/// The lock is coarse: it guards the whole world. Hold it only for a step,
/// a gravity update, a particle edit or an attribute copy, never across a
/// draw call.
pub struct SimulationGateway<E: FluidEngine> {
    state: Mutex<SimulationState<E>>,
}

impl<E: FluidEngine> SimulationGateway<E> {
    /// Wrap `engine`. No world exists until [`SimulationState::init`].
    pub fn new(engine: E) -> Self {
        Self {
            state: Mutex::new(SimulationState {
                engine,
                world: None,
            }),
        }
    }

    /// Block until the lock is held.
    ///
    /// A panic on another thread while holding the lock does not poison the
    /// gateway: every mutation of the state completes before control returns
    /// to the caller, so there is no partial update to protect.
    pub fn acquire(&self) -> SimulationGuard<'_, E> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut SimulationState<E>) -> R) -> R {
        f(&mut self.acquire())
    }

    /// Set world gravity if a world exists.
    pub fn set_gravity(&self, gravity: Vec2) {
        if let Some(world) = self.acquire().world_mut() {
            world.set_gravity(gravity);
        }
    }

    /// Live particle count, zero without a particle system.
    pub fn particle_count(&self) -> usize {
        self.acquire()
            .particle_system()
            .map_or(0, ParticleSystem::particle_count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::sim::{
        ParticleFlags, ParticleGroupDef, ReferenceEngine, Shape, StepIterations,
        POSITION_STRIDE,
    };

    fn system_def() -> ParticleSystemDef {
        ParticleSystemDef {
            radius: 0.05,
            viscosity: 0.0,
            max_particles: 2000,
            max_groups: 16,
        }
    }

    #[test]
    fn state_is_absent_until_init() {
        let gateway = SimulationGateway::new(ReferenceEngine::default());
        {
            let guard = gateway.acquire();
            assert!(guard.world().is_none());
            assert!(guard.particle_system().is_none());
        }
        gateway.set_gravity(Vec2::new(0.0, -9.8));
        assert_eq!(gateway.particle_count(), 0);

        assert!(gateway.with(|state| state.init(&system_def())));
        assert!(gateway.acquire().particle_system().is_some());
        gateway.with(SimulationState::delete_world);
        assert!(gateway.acquire().world().is_none());
    }

    #[test]
    fn init_replaces_the_previous_world() {
        let gateway = SimulationGateway::new(ReferenceEngine::default());
        let mut guard = gateway.acquire();
        assert!(guard.init(&system_def()));
        let def = ParticleGroupDef::new(
            ParticleFlags::WATER,
            Shape::rect(0.3, 0.3, Vec2::new(1.0, 1.0)),
        );
        let added = guard
            .particle_system_mut()
            .map_or(0, |system| system.add_particles(&def));
        assert!(added > 0);
        assert!(guard.init(&system_def()));
        assert_eq!(guard.particle_system().map(ParticleSystem::particle_count), Some(0));
    }

    #[test]
    fn lock_recovers_from_a_panicked_holder() {
        let gateway = Arc::new(SimulationGateway::new(ReferenceEngine::default()));
        let poisoner = Arc::clone(&gateway);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.acquire();
            panic!("holder died");
        })
        .join();
        assert!(result.is_err());
        assert!(gateway.with(|state| state.init(&system_def())));
    }

    #[test]
    fn gravity_updates_never_observe_a_torn_world() {
        let gateway = Arc::new(SimulationGateway::new(ReferenceEngine::default()));
        let expected = gateway.with(|state| {
            assert!(state.init(&system_def()));
            let def = ParticleGroupDef::new(
                ParticleFlags::WATER,
                Shape::rect(0.4, 0.4, Vec2::new(1.5, 1.5)),
            );
            state
                .particle_system_mut()
                .map_or(0, |system| system.add_particles(&def))
        });
        assert!(expected > 0);

        let stop = Arc::new(AtomicBool::new(false));
        let sensor = {
            let gateway = Arc::clone(&gateway);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut updates = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    let angle = updates as f32 * 0.1;
                    gateway.set_gravity(Vec2::new(angle.sin(), angle.cos()) * 9.8);
                    updates += 1;
                }
                updates
            })
        };

        let iterations = StepIterations {
            velocity: 6,
            position: 2,
            particle: 1,
        };
        let mut positions = vec![0u8; expected * POSITION_STRIDE];
        for _ in 0..200 {
            let mut guard = gateway.acquire();
            if let Some(world) = guard.world_mut() {
                world.single_step(1.0 / 60.0, iterations);
            }
            let system = guard.particle_system().unwrap();
            let count = system.particle_count();
            assert_eq!(count, expected);
            let written = system.copy_position_buffer(0, count, &mut positions);
            assert_eq!(written, count * POSITION_STRIDE);
            drop(guard);
        }

        stop.store(true, Ordering::Relaxed);
        let updates = sensor.join().unwrap();
        assert!(updates > 0);
        for chunk in positions.chunks_exact(4) {
            let v = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            assert!(v.is_finite());
        }
    }
}
