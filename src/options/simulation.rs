use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stepping and world-geometry parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Simulation", inline)]
#[serde(default)]
pub struct SimulationOptions {
    /// Seconds advanced per step.
    #[schemars(title = "Time Step", range(min = 0.001, max = 0.1))]
    pub time_step: f32,
    /// Particle radius in world units.
    #[schemars(title = "Particle Radius", range(min = 0.01, max = 0.5), extend("step" = 0.01))]
    pub particle_radius: f32,
    /// Particle system viscosity.
    #[schemars(title = "Viscosity", range(min = 0.0, max = 1.0), extend("step" = 0.05))]
    pub viscosity: f32,
    /// Particle cap; also sizes the per-frame attribute buffers.
    #[schemars(title = "Max Particles", range(min = 1, max = 100_000))]
    pub max_particles: usize,
    /// Particle group cap.
    #[schemars(skip)]
    pub max_groups: usize,
    /// World extent along the shorter screen axis.
    #[schemars(title = "World Height", range(min = 0.5, max = 20.0), extend("step" = 0.5))]
    pub default_world_height: f32,
    /// Thickness of the static border boxes.
    #[schemars(skip)]
    pub border_thickness: f32,
    /// Solver iterations per step: velocity, position, particle.
    #[schemars(skip)]
    pub velocity_iterations: u32,
    #[schemars(skip)]
    #[allow(missing_docs)]
    pub position_iterations: u32,
    #[schemars(skip)]
    #[allow(missing_docs)]
    pub particle_iterations: u32,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            particle_radius: 0.05,
            viscosity: 0.0,
            max_particles: 5000,
            max_groups: 256,
            default_world_height: 3.0,
            border_thickness: 1.0,
            velocity_iterations: 6,
            position_iterations: 2,
            particle_iterations: 5,
        }
    }
}
