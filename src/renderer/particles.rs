//! Fluid rendering: particles into a small offscreen surface, blurred, then
//! thresholded onto the screen.
//!
//! Per frame:
//!
//! 1. Copy position, color and weight buffers and the group list out of the
//!    simulation under the gateway lock, then release it.
//! 2. Draw every fluid group as point sprites into the fluid surface.
//! 3. Blur the fluid surface back into itself.
//! 4. Rebind the screen and composite the blurred surface with an alpha
//!    threshold, which turns soft overlapping sprites into a liquid edge.
//!
//! Groups that are not plain fluid are drawn by an optional second pass
//! into their own surface, composited after the water.

use std::rc::Rc;

use crate::assets::AssetSource;
use crate::gpu::material::AttributeFormat;
use crate::gpu::vertex::{QUAD_STRIDE, QUAD_UV_OFFSET, QUAD_VERTICES};
use crate::gpu::{
    BlendFactor, ClearMask, GpuProgram, GraphicsApi, Material, OffscreenSurface,
    Primitive, ProgramCache, ShaderKind, Texture, UniformValue, VertexBuffer,
};
use crate::options::RenderingOptions;
use crate::renderer::blur::SeparableBlur;
use crate::renderer::transform::{ViewportState, WorldTransforms};
use crate::sim::{
    FluidEngine, GroupFlags, ParticleGroupView, SimulationGateway,
    COLOR_STRIDE, POSITION_STRIDE, WEIGHT_STRIDE,
};

const WATER: usize = 0;
const OTHER: usize = 1;

/// Whether a group is drawn by the fluid pass. Only groups whose flags are
/// exactly [`GroupFlags::DYNAMIC`] qualify; extra bits route a group to the
/// other pass.
pub fn is_fluid(group: &ParticleGroupView) -> bool {
    group.flags == GroupFlags::DYNAMIC
}

/// Split groups into `(fluid, other)`, preserving order.
pub fn classify(
    groups: &[ParticleGroupView],
) -> (Vec<ParticleGroupView>, Vec<ParticleGroupView>) {
    groups.iter().partition(|group| is_fluid(group))
}

/// Draws the particle system: blurred, thresholded water plus an optional
/// pass for everything else.
#[derive(Debug)]
pub struct ParticleLayer {
    surfaces: [Option<OffscreenSurface>; 2],
    particle_materials: [Option<Material>; 2],
    screen_materials: [Option<Material>; 2],
    blur: SeparableBlur,
    positions: VertexBuffer,
    colors: VertexBuffer,
    weights: VertexBuffer,
    quad: VertexBuffer,
    max_particles: usize,
    transforms: WorldTransforms,
    screen: (i32, i32),
    options: RenderingOptions,
    other_groups: Vec<ParticleGroupView>,
}

impl ParticleLayer {
    /// Create surfaces, materials and attribute buffers sized for
    /// `max_particles`. Anything that fails to build is logged; the layer
    /// then skips the affected pass.
    pub fn new(
        gl: &mut dyn GraphicsApi,
        programs: &ProgramCache,
        assets: &dyn AssetSource,
        options: &RenderingOptions,
        max_particles: usize,
    ) -> Self {
        let surfaces = [(); 2].map(|()| {
            let size = options.fluid_surface_size;
            OffscreenSurface::new(gl, size, size)
                .map(|mut surface| {
                    surface.set_clear_color(options.surface_clear_color);
                    surface
                })
                .map_err(|e| log::error!("particle surface: {e}"))
                .ok()
        });

        let water = particle_material(
            gl,
            programs.program(ShaderKind::WaterParticle),
            assets,
            &options.particle_texture,
            true,
        );
        let other = particle_material(
            gl,
            programs.program(ShaderKind::Particle),
            assets,
            &options.particle_texture,
            false,
        );
        let screen = || screen_material(programs.program(ShaderKind::Screen));

        Self {
            surfaces,
            particle_materials: [water, other],
            screen_materials: [screen(), screen()],
            blur: SeparableBlur::new(
                gl,
                programs,
                options.blur_surface_size,
                options.blur_radius,
            ),
            positions: VertexBuffer::with_capacity(
                max_particles * POSITION_STRIDE,
                POSITION_STRIDE,
            ),
            colors: VertexBuffer::with_capacity(max_particles * COLOR_STRIDE, COLOR_STRIDE),
            weights: VertexBuffer::with_capacity(max_particles * WEIGHT_STRIDE, WEIGHT_STRIDE),
            quad: VertexBuffer::from_f32(&QUAD_VERTICES),
            max_particles,
            transforms: WorldTransforms::default(),
            screen: (0, 0),
            options: options.clone(),
            other_groups: Vec::new(),
        }
    }

    /// Whether the fluid pass and its composite can run.
    pub fn is_ready(&self) -> bool {
        self.surfaces[WATER].is_some()
            && self.particle_materials[WATER].is_some()
            && self.screen_materials[WATER].is_some()
            && self.blur.is_ready()
    }

    /// Recompute the transforms for a new screen size.
    pub fn on_surface_changed(&mut self, viewport: &ViewportState) {
        self.transforms = WorldTransforms::compute(viewport);
        self.screen = (viewport.screen_width as i32, viewport.screen_height as i32);
    }

    /// Current transforms.
    pub fn transforms(&self) -> &WorldTransforms {
        &self.transforms
    }

    /// Groups routed away from the fluid pass by the last draw.
    pub fn other_groups(&self) -> &[ParticleGroupView] {
        &self.other_groups
    }

    /// Run every pass for one frame. Leaves the default framebuffer bound
    /// with the viewport covering the screen.
    pub fn draw<E: FluidEngine>(
        &mut self,
        gl: &mut dyn GraphicsApi,
        gateway: &SimulationGateway<E>,
    ) {
        if !self.is_ready() {
            log::error!("particle draw skipped: resources unavailable");
            return;
        }
        let Some((count, groups)) = self.copy_attributes(gateway) else {
            log::debug!("particle draw skipped: no particle system");
            return;
        };

        let (fluid, other) = classify(&groups);
        self.other_groups = other;

        self.draw_particles(gl, WATER, &fluid, count);
        if let Some(surface) = &self.surfaces[WATER] {
            self.blur.draw(gl, surface.texture(), surface);
        }

        let draw_other = self.options.draw_other_particles
            && !self.other_groups.is_empty()
            && self.surfaces[OTHER].is_some()
            && self.particle_materials[OTHER].is_some();
        if draw_other {
            let other = std::mem::take(&mut self.other_groups);
            self.draw_particles(gl, OTHER, &other, count);
            self.other_groups = other;
        }

        gl.bind_framebuffer(None);
        gl.viewport(0, 0, self.screen.0, self.screen.1);

        self.composite(gl, WATER, self.options.water_alpha_threshold);
        if draw_other {
            self.composite(gl, OTHER, self.options.other_alpha_threshold);
        }
    }

    /// Refill the attribute buffers under the lock. Returns the particle
    /// count copied with the group list, or `None` without a particle
    /// system.
    fn copy_attributes<E: FluidEngine>(
        &mut self,
        gateway: &SimulationGateway<E>,
    ) -> Option<(usize, Vec<ParticleGroupView>)> {
        self.positions.rewind();
        self.colors.rewind();
        self.weights.rewind();

        let guard = gateway.acquire();
        let system = guard.particle_system()?;
        let live = system.particle_count();
        if live > self.max_particles {
            log::warn!(
                "{live} particles exceed the buffer capacity of {}; drawing the first {}",
                self.max_particles,
                self.max_particles
            );
        }
        let count = live.min(self.max_particles);
        self.positions
            .refill(|dst| system.copy_position_buffer(0, count, dst));
        self.colors.refill(|dst| system.copy_color_buffer(0, count, dst));
        self.weights.refill(|dst| system.copy_weight_buffer(0, count, dst));
        Some((count, system.particle_groups()))
    }

    fn draw_particles(
        &mut self,
        gl: &mut dyn GraphicsApi,
        index: usize,
        groups: &[ParticleGroupView],
        copied: usize,
    ) {
        let (Some(surface), Some(material)) =
            (&self.surfaces[index], &mut self.particle_materials[index])
        else {
            return;
        };

        surface.begin_render(gl, ClearMask::COLOR);
        material.start_render(gl);
        material.set_vertex_buffer(gl, "position", &mut self.positions, 0, 0);
        material.set_vertex_buffer(gl, "color", &mut self.colors, 0, 0);
        if material.has_attribute("weight") {
            material.set_vertex_buffer(gl, "weight", &mut self.weights, 0, 0);
        }
        material.update_uniform(gl, "pointSize", UniformValue::Float(self.options.point_size));
        material.update_uniform(
            gl,
            "mvp",
            UniformValue::Mat4(self.transforms.world.to_cols_array()),
        );
        for group in groups {
            // Groups past the buffer capacity are cut short.
            let first = group.buffer_index.min(copied);
            let end = group.buffer_index.saturating_add(group.particle_count).min(copied);
            if end > first {
                material.draw(gl, Primitive::Points, first, end - first);
            }
        }
        material.end_render(gl);
        surface.end_render(gl);
    }

    fn composite(&mut self, gl: &mut dyn GraphicsApi, index: usize, threshold: f32) {
        let (Some(surface), Some(material)) =
            (&self.surfaces[index], &mut self.screen_materials[index])
        else {
            return;
        };
        material.start_render(gl);
        self.quad.rewind();
        material.set_vertex_buffer(gl, "position", &mut self.quad, 0, QUAD_STRIDE);
        material.set_vertex_buffer(gl, "uv", &mut self.quad, QUAD_UV_OFFSET, QUAD_STRIDE);
        material.update_uniform(
            gl,
            "mvp",
            UniformValue::Mat4(self.transforms.texture.to_cols_array()),
        );
        material.update_uniform_texture(gl, "texture", 0, surface.texture().id());
        material.update_uniform(gl, "alphaThreshold", UniformValue::Float(threshold));
        material.draw(gl, Primitive::TriangleFan, 0, 4);
        material.end_render(gl);
    }

    /// Delete surfaces, sprite textures and the blur.
    pub fn release(self, gl: &mut dyn GraphicsApi) {
        for surface in self.surfaces.into_iter().flatten() {
            surface.release(gl);
        }
        for material in self.particle_materials.into_iter().flatten() {
            material.release(gl);
        }
        self.blur.release(gl);
    }
}

fn particle_material(
    gl: &mut dyn GraphicsApi,
    program: Option<Rc<GpuProgram>>,
    assets: &dyn AssetSource,
    sprite: &str,
    weighted: bool,
) -> Option<Material> {
    let mut material = Material::new(program)?;
    material.add_attribute("position", AttributeFormat::floats(2));
    material.add_attribute("color", AttributeFormat::RGBA8);
    if weighted {
        material.add_attribute("weight", AttributeFormat::floats(1));
    }
    material.set_blend(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
    let texture = Texture::load(gl, assets, sprite)?;
    material.add_sampler_texture(gl, "texture", texture);
    Some(material)
}

fn screen_material(program: Option<Rc<GpuProgram>>) -> Option<Material> {
    let mut material = Material::new(program)?;
    material.add_attribute("position", AttributeFormat::floats(3));
    material.add_attribute("uv", AttributeFormat::floats(2));
    material.set_blend(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    Some(material)
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::assets::EmbeddedAssets;
    use crate::gpu::SoftwareDevice;
    use crate::sim::{
        ParticleFlags, ParticleGroupDef, ParticleSystemDef, ReferenceEngine, Shape,
    };

    const SCREEN: u32 = 64;

    fn gateway_with(groups: &[GroupFlags]) -> SimulationGateway<ReferenceEngine> {
        let gateway = SimulationGateway::new(ReferenceEngine::with_seed(3));
        gateway.with(|state| {
            assert!(state.init(&ParticleSystemDef {
                radius: 0.05,
                viscosity: 0.0,
                max_particles: 5000,
                max_groups: 8,
            }));
            let system = state.particle_system_mut().unwrap();
            for &flags in groups {
                let def = ParticleGroupDef::new(
                    ParticleFlags::WATER,
                    Shape::rect(0.5, 0.5, Vec2::new(1.5, 1.5)),
                )
                .with_color([30, 144, 255, 220])
                .with_group_flags(flags);
                assert!(system.add_particles(&def) > 0);
            }
        });
        gateway
    }

    fn layer(device: &mut SoftwareDevice, options: &RenderingOptions) -> ParticleLayer {
        let programs = ProgramCache::load_all(device, &EmbeddedAssets, "shaders/glsl");
        let mut layer = ParticleLayer::new(device, &programs, &EmbeddedAssets, options, 5000);
        let viewport = ViewportState::for_screen(SCREEN, SCREEN, 3.0).unwrap();
        layer.on_surface_changed(&viewport);
        layer
    }

    fn small_options() -> RenderingOptions {
        RenderingOptions {
            fluid_surface_size: 64,
            blur_surface_size: 32,
            point_size: 8.0,
            ..RenderingOptions::default()
        }
    }

    fn center(device: &SoftwareDevice) -> [u8; 4] {
        device.screen_pixel(SCREEN / 2, SCREEN / 2).unwrap()
    }

    #[test]
    fn classification_requires_exact_dynamic_flags() {
        let view = |flags| ParticleGroupView {
            particle_count: 1,
            buffer_index: 0,
            flags,
        };
        assert!(is_fluid(&view(GroupFlags::DYNAMIC)));
        assert!(!is_fluid(&view(GroupFlags::DYNAMIC | GroupFlags::SOLID)));
        assert!(!is_fluid(&view(GroupFlags::NONE)));
        assert!(!is_fluid(&view(GroupFlags::RIGID)));

        let groups = [
            view(GroupFlags::DYNAMIC),
            view(GroupFlags::DYNAMIC | GroupFlags::RIGID),
            view(GroupFlags::DYNAMIC),
        ];
        let (fluid, other) = classify(&groups);
        assert_eq!(fluid.len(), 2);
        assert_eq!(other, vec![groups[1]]);
    }

    #[test]
    fn water_reaches_the_screen_and_state_is_restored() {
        let mut device = SoftwareDevice::new(SCREEN, SCREEN);
        let mut layer = layer(&mut device, &small_options());
        assert!(layer.is_ready());
        let gateway = gateway_with(&[GroupFlags::DYNAMIC]);

        layer.draw(&mut device, &gateway);

        let px = center(&device);
        assert_eq!(px[3], 255, "{px:?}");
        assert!(px[2] > px[0], "{px:?}");
        assert_eq!(device.screen_pixel(0, 0), Some([0, 0, 0, 0]));

        assert_eq!(device.bound_framebuffer(), None);
        assert_eq!(device.viewport_rect(), [0, 0, SCREEN as i32, SCREEN as i32]);
        assert!(!device.blend_enabled());
        assert!(device.enabled_attribute_arrays().is_empty());
        for unit in 0..crate::gpu::software::MAX_TEXTURE_UNITS as u32 {
            assert_eq!(device.bound_texture(unit), None);
        }
        assert!(layer.other_groups().is_empty());
    }

    #[test]
    fn non_fluid_groups_skip_the_water_pass() {
        let mut device = SoftwareDevice::new(SCREEN, SCREEN);
        let mut layer = layer(&mut device, &small_options());
        let gateway = gateway_with(&[GroupFlags::DYNAMIC | GroupFlags::SOLID]);

        layer.draw(&mut device, &gateway);
        assert_eq!(center(&device), [0, 0, 0, 0]);
        assert_eq!(layer.other_groups().len(), 1);
    }

    #[test]
    fn other_pass_draws_non_fluid_groups_when_enabled() {
        let mut device = SoftwareDevice::new(SCREEN, SCREEN);
        let options = RenderingOptions {
            draw_other_particles: true,
            ..small_options()
        };
        let mut layer = layer(&mut device, &options);
        let gateway = gateway_with(&[GroupFlags::DYNAMIC | GroupFlags::SOLID]);

        layer.draw(&mut device, &gateway);
        assert_eq!(center(&device)[3], 255);
        assert_eq!(layer.other_groups().len(), 1);
    }

    #[test]
    fn missing_resources_degrade_to_no_draw() {
        let mut device = SoftwareDevice::new(SCREEN, SCREEN);
        let mut layer = ParticleLayer::new(
            &mut device,
            &ProgramCache::default(),
            &EmbeddedAssets,
            &small_options(),
            100,
        );
        assert!(!layer.is_ready());
        let gateway = gateway_with(&[GroupFlags::DYNAMIC]);
        layer.draw(&mut device, &gateway);
        assert_eq!(device.stats().draw_calls, 0);
        assert_eq!(center(&device), [0, 0, 0, 0]);
    }

    #[test]
    fn absent_world_draws_nothing() {
        let mut device = SoftwareDevice::new(SCREEN, SCREEN);
        let mut layer = layer(&mut device, &small_options());
        let gateway = SimulationGateway::new(ReferenceEngine::default());
        layer.draw(&mut device, &gateway);
        assert_eq!(device.stats().draw_calls, 0);
    }

    #[test]
    fn buffer_capacity_caps_the_copy() {
        let mut device = SoftwareDevice::new(SCREEN, SCREEN);
        let programs = ProgramCache::load_all(&mut device, &EmbeddedAssets, "shaders/glsl");
        let mut layer =
            ParticleLayer::new(&mut device, &programs, &EmbeddedAssets, &small_options(), 10);
        let gateway = gateway_with(&[GroupFlags::DYNAMIC]);
        assert!(gateway.particle_count() > 10);

        let (count, groups) = layer.copy_attributes(&gateway).unwrap();
        assert_eq!(count, 10);
        assert_eq!(groups.len(), 1);
        assert_eq!(layer.positions.len(), 10 * POSITION_STRIDE);
        assert_eq!(layer.colors.len(), 10 * COLOR_STRIDE);
        assert_eq!(layer.weights.len(), 10 * WEIGHT_STRIDE);
    }
}
