//! Screen-size dependent world extent and the matrices derived from it.

use glam::{Mat4, Vec3};

/// Screen size and the world extent it implies.
///
/// The shorter screen axis always spans the default world height; the
/// longer one grows with the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// Screen width in pixels.
    pub screen_width: u32,
    /// Screen height in pixels.
    pub screen_height: u32,
    /// World extent along x.
    pub world_width: f32,
    /// World extent along y.
    pub world_height: f32,
}

impl ViewportState {
    /// A square world with no screen yet.
    pub fn new(default_world_height: f32) -> Self {
        Self {
            screen_width: 0,
            screen_height: 0,
            world_width: default_world_height,
            world_height: default_world_height,
        }
    }

    /// World extent for a `width` x `height` screen. Returns `None` for an
    /// empty screen.
    pub fn for_screen(width: u32, height: u32, default_world_height: f32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let (w, h) = (width as f32, height as f32);
        let (world_width, world_height) = if height > width {
            (default_world_height, h * default_world_height / w)
        } else {
            (w * default_world_height / h, default_world_height)
        };
        Some(Self {
            screen_width: width,
            screen_height: height,
            world_width,
            world_height,
        })
    }

    /// Whether the screen is taller than wide.
    pub fn is_portrait(&self) -> bool {
        self.screen_height > self.screen_width
    }
}

/// The two matrices the particle passes need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransforms {
    /// World coordinates to the clip space of the square fluid surface.
    pub world: Mat4,
    /// Full-screen quad to the region of the fluid surface the world
    /// occupies.
    pub texture: Mat4,
}

impl Default for WorldTransforms {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            texture: Mat4::IDENTITY,
        }
    }
}

impl WorldTransforms {
    /// Build both matrices for `viewport`. An empty screen yields identity.
    ///
    /// The world is fit into the square fluid surface along its longer
    /// axis, leaving `[-ratio, ratio]` of the shorter one; the texture
    /// transform stretches the screen quad by `1 / ratio` along that axis so
    /// the occupied region fills the screen.
    pub fn compute(viewport: &ViewportState) -> Self {
        if viewport.screen_width == 0 || viewport.screen_height == 0 {
            return Self::default();
        }
        let (w, h) = (viewport.screen_width as f32, viewport.screen_height as f32);
        let (world_w, world_h) = (viewport.world_width, viewport.world_height);

        if viewport.is_portrait() {
            let ratio = w / h;
            Self {
                world: Mat4::from_translation(Vec3::new(-ratio, -1.0, 0.0))
                    * Mat4::from_scale(Vec3::new(2.0 * ratio / world_w, 2.0 / world_h, 1.0)),
                texture: Mat4::from_scale(Vec3::new(1.0 / ratio, 1.0, 1.0)),
            }
        } else {
            let ratio = h / w;
            Self {
                world: Mat4::from_translation(Vec3::new(-1.0, -ratio, 0.0))
                    * Mat4::from_scale(Vec3::new(2.0 / world_w, 2.0 * ratio / world_h, 1.0)),
                texture: Mat4::from_scale(Vec3::new(1.0, 1.0 / ratio, 1.0)),
            }
        }
    }
}
