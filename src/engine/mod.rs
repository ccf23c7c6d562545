//! Top-level frame sequencing and the host-facing lifecycle hooks.

mod world;

use std::sync::Arc;

use crate::assets::AssetSource;
use crate::gpu::{ClearMask, GraphicsApi, ProgramCache};
use crate::options::Options;
use crate::renderer::{BackgroundLayer, ParticleLayer, ViewportState, WorldTransforms};
use crate::sim::{BodyId, FluidEngine, FluidWorld, SimulationGateway, SimulationState};

/// Lifecycle state of a [`FrameCompositor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    /// No GL surface yet; frames draw nothing.
    Uninitialized,
    /// GPU resources exist; the simulation has never been started.
    SurfaceReady,
    /// Each frame steps the simulation, then draws.
    Running,
    /// Frames draw without stepping.
    Paused,
}

/// GPU resources bound to one GL surface.
#[derive(Debug)]
struct SurfaceResources {
    programs: ProgramCache,
    background: BackgroundLayer,
    particles: ParticleLayer,
}

/// Owns the device, the simulation gateway and every render pass, and
/// sequences them per frame.
///
/// The host calls [`on_surface_created`](Self::on_surface_created) once a
/// GL context is current, [`on_surface_changed`](Self::on_surface_changed)
/// on every resize and [`on_draw_frame`](Self::on_draw_frame) per vsync, all
/// from the render thread. [`start`](Self::start), [`pause`](Self::pause),
/// [`add_water`](Self::add_water) and [`delete_water`](Self::delete_water)
/// are the only other mutations.
pub struct FrameCompositor<G: GraphicsApi, E: FluidEngine> {
    gl: G,
    gateway: Arc<SimulationGateway<E>>,
    options: Options,
    resources: Option<SurfaceResources>,
    /// `None` until the first `start` or `pause`.
    stepping: Option<bool>,
    viewport: ViewportState,
    border: Option<BodyId>,
    frames: u64,
}

impl<G: GraphicsApi, E: FluidEngine> FrameCompositor<G, E> {
    /// Create the world, its borders for a square default viewport and the
    /// initial water block.
    pub fn new(gl: G, engine: E, options: Options) -> Self {
        let gateway = Arc::new(SimulationGateway::new(engine));
        let viewport = ViewportState::new(options.simulation.default_world_height);

        let border = gateway.with(|state| {
            if !state.init(&world::system_def(&options.simulation)) {
                return None;
            }
            let border = world::rebuild_borders(
                state,
                None,
                &viewport,
                options.simulation.border_thickness,
            );
            let added =
                world::add_initial_block(state, &options.simulation, &options.water);
            log::info!("world reset with {added} particles");
            border
        });

        Self {
            gl,
            gateway,
            options,
            resources: None,
            stepping: None,
            viewport,
            border,
            frames: 0,
        }
    }

    /// Shared handle to the simulation, for the sensor thread and hosts.
    pub fn gateway(&self) -> &Arc<SimulationGateway<E>> {
        &self.gateway
    }

    /// The graphics device.
    pub fn device(&self) -> &G {
        &self.gl
    }

    /// Mutable access to the graphics device.
    pub fn device_mut(&mut self) -> &mut G {
        &mut self.gl
    }

    /// Options the compositor was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CompositorState {
        match (&self.resources, self.stepping) {
            (None, _) => CompositorState::Uninitialized,
            (Some(_), None) => CompositorState::SurfaceReady,
            (Some(_), Some(true)) => CompositorState::Running,
            (Some(_), Some(false)) => CompositorState::Paused,
        }
    }

    /// Screen size and world extent.
    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// Transforms in use, identity before the first resize.
    pub fn transforms(&self) -> WorldTransforms {
        self.resources
            .as_ref()
            .map_or_else(WorldTransforms::default, |r| *r.particles.transforms())
    }

    /// Frames drawn so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Load every program and build both layers. Called again after a
    /// context loss, it replaces the previous resources. A `start` or
    /// `pause` issued before still applies.
    pub fn on_surface_created(&mut self, assets: &dyn AssetSource) {
        if let Some(old) = self.resources.take() {
            release(&mut self.gl, old);
        }
        let rendering = &self.options.rendering;
        let programs = ProgramCache::load_all(&mut self.gl, assets, &rendering.shader_dir);
        log::info!("{} of 6 programs linked", programs.len());

        let background =
            BackgroundLayer::new(&mut self.gl, &programs, assets, &rendering.canvas_texture);
        let mut particles = ParticleLayer::new(
            &mut self.gl,
            &programs,
            assets,
            rendering,
            self.options.simulation.max_particles,
        );
        if self.viewport.screen_width > 0 {
            particles.on_surface_changed(&self.viewport);
        }
        self.resources = Some(SurfaceResources {
            programs,
            background,
            particles,
        });
    }

    /// Resize: set the viewport, recompute the world extent and transforms,
    /// and rebuild the borders around the new extent.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        let Some(viewport) = ViewportState::for_screen(
            width,
            height,
            self.options.simulation.default_world_height,
        ) else {
            log::warn!("ignoring surface change to {width}x{height}");
            return;
        };
        self.gl.viewport(0, 0, width as i32, height as i32);
        self.viewport = viewport;

        let thickness = self.options.simulation.border_thickness;
        let previous = self.border;
        self.border = self.gateway.with(|state| {
            world::rebuild_borders(state, previous, &viewport, thickness)
        });

        if let Some(resources) = &mut self.resources {
            resources.particles.on_surface_changed(&viewport);
        }
    }

    /// One frame: step if running, then clear and draw both layers. Draws
    /// while paused too, so the scene stays visible.
    pub fn on_draw_frame(&mut self) {
        if self.state() == CompositorState::Running {
            let dt = self.options.simulation.time_step;
            let iterations = world::step_iterations(&self.options.simulation);
            let mut state = self.gateway.acquire();
            if let Some(world) = state.world_mut() {
                world.single_step(dt, iterations);
            }
        }

        let Some(resources) = &mut self.resources else {
            log::debug!("frame skipped: no surface");
            return;
        };
        self.gl.clear_color(self.options.rendering.screen_clear_color);
        self.gl.clear(ClearMask::COLOR);
        resources.background.draw(&mut self.gl);
        resources.particles.draw(&mut self.gl, self.gateway.as_ref());
        self.frames += 1;
    }

    /// Step the simulation on subsequent frames.
    pub fn start(&mut self) {
        self.stepping = Some(true);
    }

    /// Stop stepping; frames keep drawing.
    pub fn pause(&mut self) {
        self.stepping = Some(false);
    }

    /// Emit a circle of water at the top-left corner. Returns the number
    /// of particles added.
    pub fn add_water(&self) -> usize {
        let def = world::water_emitter(&self.viewport, &self.options.water);
        self.gateway.with(|state| world::add_group(state, &def))
    }

    /// Remove the most recently added water. Returns the number removed.
    pub fn delete_water(&self) -> usize {
        let count = self.options.water.delete_count;
        self.gateway.with(|state| {
            state
                .particle_system_mut()
                .map_or(0, |system| system.delete_particles(count))
        })
    }

    /// Live particle count.
    pub fn particle_count(&self) -> usize {
        self.gateway.particle_count()
    }
}

fn release(gl: &mut dyn GraphicsApi, resources: SurfaceResources) {
    let SurfaceResources {
        mut programs,
        background,
        particles,
    } = resources;
    background.release(gl);
    particles.release(gl);
    programs.release(gl);
}

impl<G: GraphicsApi, E: FluidEngine> Drop for FrameCompositor<G, E> {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            release(&mut self.gl, resources);
        }
        let border = self.border.take();
        self.gateway.with(|state: &mut SimulationState<E>| {
            world::destroy_borders(state, border);
            state.delete_world();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::EmbeddedAssets;
    use crate::gpu::SoftwareDevice;
    use crate::sim::ReferenceEngine;

    type Compositor = FrameCompositor<SoftwareDevice, ReferenceEngine>;

    fn compositor(width: u32, height: u32) -> Compositor {
        let mut options = Options::default();
        options.rendering.fluid_surface_size = 64;
        options.rendering.blur_surface_size = 32;
        let device = SoftwareDevice::new(width, height);
        FrameCompositor::new(device, ReferenceEngine::default(), options)
    }

    fn positions(compositor: &Compositor) -> Vec<u8> {
        let state = compositor.gateway().acquire();
        let Some(system) = state.particle_system() else {
            return Vec::new();
        };
        let count = system.particle_count();
        let mut bytes = vec![0; count * crate::sim::POSITION_STRIDE];
        let _ = system.copy_position_buffer(0, count, &mut bytes);
        bytes
    }

    #[test]
    fn construction_builds_world_borders_and_water() {
        let compositor = compositor(32, 32);
        assert_eq!(compositor.state(), CompositorState::Uninitialized);
        assert!(compositor.particle_count() > 0);
        let state = compositor.gateway().acquire();
        assert_eq!(state.world().map(|w| w.fixtures().count()), Some(4));
    }

    #[test]
    fn lifecycle_transitions() {
        let mut compositor = compositor(32, 32);
        compositor.start();
        assert_eq!(compositor.state(), CompositorState::Uninitialized);

        compositor.on_surface_created(&EmbeddedAssets);
        assert_eq!(compositor.state(), CompositorState::Running);
        compositor.pause();
        assert_eq!(compositor.state(), CompositorState::Paused);
        compositor.on_surface_created(&EmbeddedAssets);
        assert_eq!(compositor.state(), CompositorState::Paused);
        compositor.start();
        assert_eq!(compositor.state(), CompositorState::Running);

        let mut fresh = self::compositor(32, 32);
        fresh.on_surface_created(&EmbeddedAssets);
        assert_eq!(fresh.state(), CompositorState::SurfaceReady);
    }

    #[test]
    fn start_before_the_surface_steps_once_it_exists() {
        let mut compositor = compositor(32, 32);
        compositor.gateway().set_gravity(glam::Vec2::new(0.0, -9.8));
        assert!(compositor.add_water() > 0);
        compositor.start();

        compositor.on_surface_created(&EmbeddedAssets);
        compositor.on_surface_changed(32, 32);
        let before = positions(&compositor);
        compositor.on_draw_frame();
        let after_first = positions(&compositor);
        assert_ne!(after_first, before);

        compositor.on_surface_created(&EmbeddedAssets);
        assert_eq!(compositor.state(), CompositorState::Running);
        compositor.on_draw_frame();
        assert_ne!(positions(&compositor), after_first);
        assert_eq!(compositor.frame_count(), 2);
    }

    #[test]
    fn paused_frames_draw_without_stepping() {
        let mut compositor = compositor(32, 32);
        compositor.on_surface_created(&EmbeddedAssets);
        compositor.on_surface_changed(32, 32);
        compositor.pause();
        compositor.gateway().set_gravity(glam::Vec2::new(0.0, -9.8));
        assert!(compositor.add_water() > 0);

        let before = positions(&compositor);
        compositor.on_draw_frame();
        assert_eq!(positions(&compositor), before);
        assert_eq!(compositor.frame_count(), 1);
        assert!(compositor.device().stats().draw_calls > 0);

        compositor.start();
        compositor.on_draw_frame();
        assert_ne!(positions(&compositor), before);
    }

    #[test]
    fn frames_without_a_surface_are_skipped() {
        let mut compositor = compositor(16, 16);
        compositor.start();
        let before = positions(&compositor);
        compositor.on_draw_frame();
        assert_eq!(positions(&compositor), before);
        assert_eq!(compositor.frame_count(), 0);
        assert_eq!(compositor.device().stats().draw_calls, 0);
    }

    #[test]
    fn rotation_swaps_transform_dominance() {
        let mut compositor = compositor(16, 16);
        compositor.on_surface_created(&EmbeddedAssets);

        compositor.on_surface_changed(1080, 1920);
        assert!(compositor.viewport().is_portrait());
        let portrait = compositor.transforms().texture.to_scale_rotation_translation().0;
        compositor.on_surface_changed(1920, 1080);
        let landscape = compositor.transforms().texture.to_scale_rotation_translation().0;

        assert!(portrait.x > portrait.y);
        assert!(landscape.y > landscape.x);
        assert_eq!(compositor.device().viewport_rect(), [0, 0, 1920, 1080]);

        let state = compositor.gateway().acquire();
        let world = state.world().unwrap();
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.fixtures().count(), 4);
    }

    #[test]
    fn water_actions_edit_the_particle_system() {
        let mut compositor = compositor(32, 32);
        compositor.on_surface_changed(32, 32);
        let start = compositor.particle_count();

        let added = compositor.add_water();
        assert!(added > 0);
        assert_eq!(compositor.particle_count(), start + added);

        assert_eq!(compositor.delete_water(), 100.min(start + added));
        assert_eq!(compositor.particle_count(), start + added - 100.min(start + added));
    }

    #[test]
    fn frames_leave_the_screen_bound() {
        let mut compositor = compositor(48, 32);
        compositor.on_surface_created(&EmbeddedAssets);
        compositor.on_surface_changed(48, 32);
        compositor.start();
        for _ in 0..3 {
            compositor.on_draw_frame();
            let device = compositor.device();
            assert_eq!(device.bound_framebuffer(), None);
            assert_eq!(device.viewport_rect(), [0, 0, 48, 32]);
            assert!(!device.blend_enabled());
            assert!(device.enabled_attribute_arrays().is_empty());
        }
        assert!(compositor.device().read_screen().iter().any(|&b| b != 0));
    }

    #[test]
    fn drop_releases_gpu_resources_and_the_world() {
        let mut compositor = compositor(16, 16);
        compositor.on_surface_created(&EmbeddedAssets);
        let gateway = Arc::clone(compositor.gateway());
        drop(compositor);
        assert!(gateway.acquire().world().is_none());
    }

    #[test]
    fn surface_recreation_replaces_resources() {
        let mut compositor = compositor(16, 16);
        compositor.on_surface_created(&EmbeddedAssets);
        let programs = compositor.device().program_count();
        let textures = compositor.device().texture_count();
        compositor.on_surface_created(&EmbeddedAssets);
        assert_eq!(compositor.device().program_count(), programs);
        assert_eq!(compositor.device().texture_count(), textures);
    }
}
