//! The simulation boundary.
//!
//! The physics solver lives outside the renderer. [`FluidEngine`] creates
//! worlds, a [`FluidWorld`] owns bodies and one [`ParticleSystem`], and the
//! renderer only ever reads particle attributes back as flat byte buffers.
//! All access goes through a [`SimulationGateway`], which serializes the
//! render thread against the sensor thread and UI actions.

mod gateway;
mod reference;
mod sensor;

use glam::Vec2;

pub use gateway::{SimulationGateway, SimulationGuard, SimulationState};
pub use reference::{ReferenceEngine, ReferenceParticleSystem, ReferenceWorld};
pub use sensor::{
    spawn_sensor_thread, DisplayRotation, GravitySensor, SensorThread,
    STANDARD_GRAVITY,
};

bitflags::bitflags! {
    /// Per-particle behavior bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[repr(transparent)]
    pub struct ParticleFlags: u32 {
        /// Plain liquid.
        const WATER = 1 << 0;
        /// Viscous liquid.
        const VISCOUS = 1 << 1;
        /// Resists stretching.
        const STRESSFUL = 1 << 2;
        /// Colors blend with neighbours.
        const MIX_COLOR = 1 << 3;
        /// Pushes neighbours apart.
        const REPULSIVE = 1 << 4;
        /// Surface tension.
        const TENSILE = 1 << 5;
        /// Explosive.
        const POWER = 1 << 6;
        /// Never moves.
        const WALL = 1 << 7;
        /// Blocks tunnelling.
        const BARRIER = 1 << 8;
        /// Marked for removal.
        const ZOMBIE = 1 << 9;
    }
}

bitflags::bitflags! {
    /// Per-group bits, as reported by [`ParticleSystem::particle_groups`].
    ///
    /// Compared with `==`, never `contains`: only exactly
    /// [`GroupFlags::DYNAMIC`] routes a group to the fluid pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[repr(transparent)]
    pub struct GroupFlags: u32 {
        /// No group bits.
        const NONE = 0;
        /// Free-flowing group.
        const DYNAMIC = 1 << 0;
        /// Particles keep their relative layout.
        const SOLID = 1 << 1;
        /// Moves as one rigid body.
        const RIGID = 1 << 2;
    }
}

/// Read-only snapshot of one particle group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleGroupView {
    /// Particles in the group.
    pub particle_count: usize,
    /// Index of the group's first particle in the exported buffers.
    pub buffer_index: usize,
    /// Group bits.
    pub flags: GroupFlags,
}

/// Rigid body kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Never moves.
    Static,
    /// Moved by the host, not by forces.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Handle of a body inside one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub(crate) u32);

/// A collision or emitter shape in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Axis-aligned box.
    Box {
        /// Center.
        center: Vec2,
        /// Half width and half height.
        half_extents: Vec2,
    },
    /// Circle.
    Circle {
        /// Center.
        center: Vec2,
        /// Radius.
        radius: f32,
    },
}

impl Shape {
    /// Box from its half extents and center.
    pub fn rect(half_width: f32, half_height: f32, center: Vec2) -> Self {
        Self::Box {
            center,
            half_extents: Vec2::new(half_width, half_height),
        }
    }

    /// Whether `point` lies inside the shape.
    pub fn contains(&self, point: Vec2) -> bool {
        match *self {
            Self::Box {
                center,
                half_extents,
            } => {
                let d = (point - center).abs();
                d.x <= half_extents.x && d.y <= half_extents.y
            }
            Self::Circle { center, radius } => {
                point.distance_squared(center) <= radius * radius
            }
        }
    }

    /// Bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Vec2, Vec2) {
        match *self {
            Self::Box {
                center,
                half_extents,
            } => (center - half_extents, center + half_extents),
            Self::Circle { center, radius } => {
                (center - Vec2::splat(radius), center + Vec2::splat(radius))
            }
        }
    }
}

/// Parameters of a new particle system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSystemDef {
    /// Particle radius in world units.
    pub radius: f32,
    /// Viscosity in `[0, 1]`. Engines without viscosity ignore it.
    pub viscosity: f32,
    /// Hard particle cap. Additions beyond it are dropped.
    pub max_particles: usize,
    /// Hard group cap.
    pub max_groups: usize,
}

/// Parameters of one `add_particles` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleGroupDef {
    /// Behavior of every particle in the group.
    pub flags: ParticleFlags,
    /// Group bits.
    pub group_flags: GroupFlags,
    /// Region filled with particles.
    pub shape: Shape,
    /// RGBA color of every particle.
    pub color: [u8; 4],
}

impl ParticleGroupDef {
    /// A dynamic, opaque-black group filling `shape`.
    pub fn new(flags: ParticleFlags, shape: Shape) -> Self {
        Self {
            flags,
            group_flags: GroupFlags::DYNAMIC,
            shape,
            color: [0, 0, 0, 255],
        }
    }

    /// Set the particle color.
    #[must_use]
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = color;
        self
    }

    /// Set the group bits.
    #[must_use]
    pub fn with_group_flags(mut self, group_flags: GroupFlags) -> Self {
        self.group_flags = group_flags;
        self
    }
}

/// Solver iteration counts for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepIterations {
    /// Rigid-body velocity iterations.
    pub velocity: u32,
    /// Rigid-body position iterations.
    pub position: u32,
    /// Particle sub-steps.
    pub particle: u32,
}

/// Bytes per particle in [`ParticleSystem::copy_position_buffer`] output.
pub const POSITION_STRIDE: usize = 2 * size_of::<f32>();
/// Bytes per particle in [`ParticleSystem::copy_color_buffer`] output.
pub const COLOR_STRIDE: usize = 4;
/// Bytes per particle in [`ParticleSystem::copy_weight_buffer`] output.
pub const WEIGHT_STRIDE: usize = size_of::<f32>();

/// The particles of one world.
pub trait ParticleSystem: Send {
    /// Fill `def.shape` with particles as one new group. Returns how many
    /// particles were created; zero creates no group.
    fn add_particles(&mut self, def: &ParticleGroupDef) -> usize;

    /// Remove up to `count` of the most recently added particles. Returns
    /// how many were removed.
    fn delete_particles(&mut self, count: usize) -> usize;

    /// Live particle count.
    fn particle_count(&self) -> usize;

    /// Write positions of particles `start..start + count` as native-endian
    /// `f32` pairs. Returns bytes written, bounded by `out.len()`.
    fn copy_position_buffer(&self, start: usize, count: usize, out: &mut [u8]) -> usize;

    /// Write colors as RGBA8. Returns bytes written.
    fn copy_color_buffer(&self, start: usize, count: usize, out: &mut [u8]) -> usize;

    /// Write weights as native-endian `f32`. Returns bytes written.
    fn copy_weight_buffer(&self, start: usize, count: usize, out: &mut [u8]) -> usize;

    /// Snapshot of every live group, in buffer order.
    fn particle_groups(&self) -> Vec<ParticleGroupView>;
}

/// One physics world.
pub trait FluidWorld: Send {
    /// Create the world's particle system, replacing any previous one.
    fn create_particle_system(&mut self, def: &ParticleSystemDef);

    /// The particle system, if created.
    fn particle_system(&self) -> Option<&dyn ParticleSystem>;

    /// Mutable access to the particle system, if created.
    fn particle_system_mut(&mut self) -> Option<&mut dyn ParticleSystem>;

    /// Advance by `dt` seconds.
    fn single_step(&mut self, dt: f32, iterations: StepIterations);

    /// Set world gravity.
    fn set_gravity(&mut self, gravity: Vec2);

    /// Current world gravity.
    fn gravity(&self) -> Vec2;

    /// Create an empty body.
    fn create_body(&mut self, body_type: BodyType) -> BodyId;

    /// Destroy a body and its shapes. Unknown ids are ignored.
    fn destroy_body(&mut self, body: BodyId);

    /// Attach a box fixture to `body`.
    fn add_polygon_shape(&mut self, body: BodyId, half_extents: Vec2, center: Vec2);

    /// Attach a circle fixture to `body`.
    fn add_circle_shape(&mut self, body: BodyId, center: Vec2, radius: f32);
}

/// Factory for worlds.
pub trait FluidEngine: Send {
    /// World type this engine creates.
    type World: FluidWorld;

    /// Create a world with the given initial gravity.
    fn create_world(&mut self, gravity: Vec2) -> Option<Self::World>;

    /// Tear a world down.
    fn destroy_world(&mut self, world: Self::World);
}
