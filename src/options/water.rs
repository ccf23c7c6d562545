use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters of the add/delete water actions and the starting block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Water", inline)]
#[serde(default)]
pub struct WaterOptions {
    /// Radius of the circle emitted by `add_water`.
    #[schemars(title = "Emitter Radius", range(min = 0.05, max = 2.0), extend("step" = 0.05))]
    pub emitter_radius: f32,
    /// RGBA color of emitted water.
    #[schemars(skip)]
    pub color: [u8; 4],
    /// Particles removed per `delete_water`.
    #[schemars(title = "Delete Count", range(min = 1, max = 5000))]
    pub delete_count: usize,
    /// Side of the initial block as a fraction of the world height.
    #[schemars(title = "Initial Block", range(min = 0.0, max = 1.0), extend("step" = 0.05))]
    pub initial_block_fraction: f32,
}

impl Default for WaterOptions {
    fn default() -> Self {
        Self {
            emitter_radius: 0.6,
            color: [30, 144, 255, 220],
            delete_count: 100,
            initial_block_fraction: 0.6,
        }
    }
}
