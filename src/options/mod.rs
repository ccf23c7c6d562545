//! Runtime options with TOML preset support.
//!
//! Every section uses `#[serde(default)]`, so a preset only needs the
//! fields it overrides.

mod rendering;
mod simulation;
mod water;

use std::path::Path;

pub use rendering::RenderingOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use simulation::SimulationOptions;
pub use water::WaterOptions;

use crate::error::FluidError;

/// Top-level options container.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct Options {
    /// World and stepping parameters.
    pub simulation: SimulationOptions,
    /// Pass sizes, thresholds and asset paths.
    pub rendering: RenderingOptions,
    /// Add/delete water parameters.
    pub water: WaterOptions,
}

impl Options {
    /// Generate JSON Schema describing the UI-exposed options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Options)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, FluidError> {
        let content = std::fs::read_to_string(path).map_err(FluidError::Io)?;
        toml::from_str(&content)
            .map_err(|e| FluidError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    pub fn save(&self, path: &Path) -> Result<(), FluidError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FluidError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(FluidError::Io)?;
        }
        std::fs::write(path, content).map_err(FluidError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = Options::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: Options = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
[rendering]
blur_radius = 2
draw_other_particles = true
";
        let opts: Options = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.rendering.blur_radius, 2);
        assert!(opts.rendering.draw_other_particles);
        assert_eq!(opts.rendering.fluid_surface_size, 256);
        assert_eq!(opts.simulation.max_particles, 5000);
        assert_eq!(opts.water.color, [30, 144, 255, 220]);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir()
            .join(format!("fluidview-options-{}", std::process::id()));
        let path = dir.join("preset.toml");
        let mut opts = Options::default();
        opts.water.delete_count = 7;
        opts.save(&path).unwrap();
        let loaded = Options::load(&path).unwrap();
        assert_eq!(loaded, opts);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = std::env::temp_dir()
            .join(format!("fluidview-bad-options-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "[rendering\nblur_radius = ").unwrap();
        assert!(matches!(
            Options::load(&path),
            Err(FluidError::OptionsParse(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(Options::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();
        assert!(props.contains_key("simulation"));
        assert!(props.contains_key("rendering"));
        assert!(props.contains_key("water"));

        let rendering = &props["rendering"]["properties"];
        assert!(rendering.get("blur_radius").is_some());
        assert!(rendering.get("shader_dir").is_none());
        let simulation = &props["simulation"]["properties"];
        assert!(simulation.get("velocity_iterations").is_none());
    }
}
