use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Render-pass sizes, thresholds and asset paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Rendering", inline)]
#[serde(default)]
pub struct RenderingOptions {
    /// Edge length of the square fluid surfaces, independent of the screen.
    #[schemars(title = "Fluid Resolution", range(min = 16, max = 2048))]
    pub fluid_surface_size: u32,
    /// Edge length of the blur intermediate surface.
    #[schemars(title = "Blur Resolution", range(min = 16, max = 1024))]
    pub blur_surface_size: u32,
    /// Gaussian taps on each side of the center.
    #[schemars(title = "Blur Radius", range(min = 0, max = 8))]
    pub blur_radius: i32,
    /// Particle sprite size in pixels of the fluid surface.
    #[schemars(title = "Point Size", range(min = 1.0, max = 64.0), extend("step" = 0.5))]
    pub point_size: f32,
    /// Coverage below which blurred fluid is discarded.
    #[schemars(title = "Water Threshold", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub water_alpha_threshold: f32,
    /// Coverage threshold for the non-fluid composite.
    #[schemars(title = "Other Threshold", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub other_alpha_threshold: f32,
    /// Draw particle groups that are not plain fluid into their own
    /// surface and composite them after the water.
    #[schemars(title = "Draw Other Particles")]
    pub draw_other_particles: bool,
    /// Clear color of the fluid surfaces (premultiplied white, transparent).
    #[schemars(skip)]
    pub surface_clear_color: [f32; 4],
    /// Clear color of the visible framebuffer.
    #[schemars(skip)]
    pub screen_clear_color: [f32; 4],
    /// Sprite sampled by every particle point.
    #[schemars(skip)]
    pub particle_texture: String,
    /// Background image.
    #[schemars(skip)]
    pub canvas_texture: String,
    /// Asset directory holding the GLSL sources.
    #[schemars(skip)]
    pub shader_dir: String,
}

impl Default for RenderingOptions {
    fn default() -> Self {
        Self {
            fluid_surface_size: 256,
            blur_surface_size: 128,
            blur_radius: 4,
            point_size: 10.0,
            water_alpha_threshold: 0.7,
            other_alpha_threshold: 0.8,
            draw_other_particles: false,
            surface_clear_color: [1.0, 1.0, 1.0, 0.0],
            screen_clear_color: [0.0, 0.0, 0.0, 0.0],
            particle_texture: "textures/blur.png".to_owned(),
            canvas_texture: "textures/canvas.png".to_owned(),
            shader_dir: "shaders/glsl".to_owned(),
        }
    }
}
