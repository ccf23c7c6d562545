//! CPU reference implementation of [`GraphicsApi`].
//!
//! `SoftwareDevice` keeps the full GL-ES state machine the pipeline relies
//! on (bindings, enabled arrays, blend state, per-program uniforms) and
//! rasterizes draws into RGBA8 images. Programs are matched to built-in
//! kernels by label, so the GLSL sources are only scanned for their
//! declared interface. Besides headless rendering, the device exposes its
//! state for inspection, which is what the pipeline tests assert against.

mod glsl;
mod kernels;
mod raster;

use std::mem;

use glam::Vec4;
use rustc_hash::{FxHashMap, FxHashSet};

use self::glsl::ProgramInterface;
use self::kernels::{Kernel, Uniforms, VertexInput};
use self::raster::{Scissor, TexImage, WindowVertex};
use crate::gpu::api::{
    ActiveVariable, AttribPointer, BlendFactor, ClearMask, ComponentType,
    FramebufferId, GpuError, GraphicsApi, Primitive, ProgramId, TextureFilter,
    TextureId, TextureUpload, UniformValue, VariableKind,
};

/// Texture units the device exposes.
pub const MAX_TEXTURE_UNITS: usize = 8;

/// `GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT`
const INCOMPLETE_ATTACHMENT: u32 = 0x8CD6;

struct SoftProgram {
    kernel: Kernel,
    interface: ProgramInterface,
    values: Vec<Option<UniformValue>>,
}

impl SoftProgram {
    fn attribute(&self, name: &str) -> Option<u32> {
        self.interface
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }
}

impl Uniforms for SoftProgram {
    fn get(&self, name: &str) -> Option<UniformValue> {
        let uniform = self.interface.uniforms.iter().find(|u| u.name == name)?;
        self.values.get(uniform.location as usize).copied().flatten()
    }
}

struct StoredPointer {
    components: u8,
    component_type: ComponentType,
    normalized: bool,
    stride: usize,
    data: Vec<u8>,
}

impl StoredPointer {
    /// Fetch vertex `index`, filling missing components from `(0, 0, 0, 1)`.
    fn fetch(&self, index: usize) -> [f32; 4] {
        let mut out = [0.0, 0.0, 0.0, 1.0];
        let size = self.component_type.size_bytes();
        let base = index * self.stride;
        for (c, slot) in out.iter_mut().enumerate().take(usize::from(self.components)) {
            let start = base + c * size;
            let Some(bytes) = self.data.get(start..start + size) else {
                break;
            };
            *slot = decode(self.component_type, self.normalized, bytes);
        }
        out
    }
}

fn decode(ty: ComponentType, normalized: bool, bytes: &[u8]) -> f32 {
    let (value, scale) = match ty {
        ComponentType::Float => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            return f32::from_ne_bytes(raw);
        }
        ComponentType::UnsignedByte => (f32::from(bytes[0]), 255.0),
        ComponentType::Byte => (f32::from(bytes[0] as i8), 127.0),
        ComponentType::UnsignedShort => {
            (f32::from(u16::from_ne_bytes([bytes[0], bytes[1]])), 65535.0)
        }
        ComponentType::Short => {
            (f32::from(i16::from_ne_bytes([bytes[0], bytes[1]])), 32767.0)
        }
    };
    if normalized {
        (value / scale).max(-1.0)
    } else {
        value
    }
}

/// Counters accumulated since the device was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// `draw_arrays` calls, including ones that drew nothing.
    pub draw_calls: usize,
    /// `flush` calls.
    pub flushes: usize,
    /// `bind_framebuffer(None)` calls.
    pub default_framebuffer_binds: usize,
    /// `set_uniform` calls that hit a declared uniform.
    pub uniform_writes: usize,
}

/// Headless GL-ES device rasterizing on the CPU.
pub struct SoftwareDevice {
    programs: FxHashMap<u32, SoftProgram>,
    textures: FxHashMap<u32, TexImage>,
    framebuffers: FxHashMap<u32, TextureId>,
    next_handle: u32,

    current_program: Option<ProgramId>,
    bound_framebuffer: Option<FramebufferId>,
    screen: TexImage,
    viewport: [i32; 4],
    clear_color: [f32; 4],

    blend_enabled: bool,
    blend: (BlendFactor, BlendFactor),

    enabled_arrays: FxHashSet<u32>,
    pointers: FxHashMap<u32, StoredPointer>,
    active_unit: u32,
    units: [Option<TextureId>; MAX_TEXTURE_UNITS],

    stats: DeviceStats,
}

impl SoftwareDevice {
    /// Create a device whose default framebuffer is `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            programs: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            next_handle: 1,
            current_program: None,
            bound_framebuffer: None,
            screen: TexImage::new(width, height, TextureFilter::Nearest),
            viewport: [0, 0, width as i32, height as i32],
            clear_color: [0.0; 4],
            blend_enabled: false,
            blend: (BlendFactor::One, BlendFactor::Zero),
            enabled_arrays: FxHashSet::default(),
            pointers: FxHashMap::default(),
            active_unit: 0,
            units: [None; MAX_TEXTURE_UNITS],
            stats: DeviceStats::default(),
        }
    }

    /// Reallocate the default framebuffer, discarding its contents.
    pub fn resize_screen(&mut self, width: u32, height: u32) {
        self.screen = TexImage::new(width, height, TextureFilter::Nearest);
    }

    /// Size of the default framebuffer.
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    /// Bottom-up RGBA8 contents of the default framebuffer.
    pub fn read_screen(&self) -> Vec<u8> {
        self.screen.to_rgba()
    }

    /// One pixel of the default framebuffer; `y = 0` is the bottom row.
    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.screen.width || y >= self.screen.height {
            return None;
        }
        Some(self.screen.texels[(y * self.screen.width + x) as usize])
    }

    /// Size and bottom-up RGBA8 contents of a texture.
    pub fn read_texture(&self, texture: TextureId) -> Option<(u32, u32, Vec<u8>)> {
        self.textures
            .get(&texture.0)
            .map(|image| (image.width, image.height, image.to_rgba()))
    }

    /// Framebuffer currently bound; `None` is the default framebuffer.
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    /// Texture bound to `unit`.
    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.units.get(unit as usize).copied().flatten()
    }

    /// Attribute locations with an enabled array, ascending.
    pub fn enabled_attribute_arrays(&self) -> Vec<u32> {
        let mut locations: Vec<u32> =
            self.enabled_arrays.iter().copied().collect();
        locations.sort_unstable();
        locations
    }

    /// Whether blending is enabled.
    pub fn blend_enabled(&self) -> bool {
        self.blend_enabled
    }

    /// Current blend factors.
    pub fn blend_factors(&self) -> (BlendFactor, BlendFactor) {
        self.blend
    }

    /// Current viewport as `[x, y, width, height]`.
    pub fn viewport_rect(&self) -> [i32; 4] {
        self.viewport
    }

    /// Last value set for a uniform of `program`, looked up by name.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.programs.get(&program.0)?.get(name)
    }

    /// Number of live programs.
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Accumulated call counters.
    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Detach the image the bound framebuffer renders into. Must be paired
    /// with [`Self::restore_target`].
    fn take_target(&mut self) -> Option<(Option<u32>, TexImage)> {
        match self.bound_framebuffer {
            None => Some((None, mem::take(&mut self.screen))),
            Some(fb) => {
                let texture = self.framebuffers.get(&fb.0)?.0;
                let image = self.textures.remove(&texture)?;
                Some((Some(texture), image))
            }
        }
    }

    fn restore_target(&mut self, slot: Option<u32>, image: TexImage) {
        match slot {
            None => self.screen = image,
            Some(texture) => {
                let _ = self.textures.insert(texture, image);
            }
        }
    }

    fn assemble_vertices(
        &self,
        program: &SoftProgram,
        first: usize,
        count: usize,
    ) -> Vec<Option<WindowVertex>> {
        let source = |name: &'static str| {
            program
                .attribute(name)
                .filter(|location| self.enabled_arrays.contains(location))
                .and_then(|location| self.pointers.get(&location))
        };
        let position = source("position");
        let uv = source("uv");
        let color = source("color");
        let weight = source("weight");
        let read = |pointer: Option<&StoredPointer>, index: usize| {
            pointer.map_or([0.0, 0.0, 0.0, 1.0], |p| p.fetch(index))
        };

        let [vx, vy, vw, vh] = self.viewport.map(|v| v as f32);

        (first..first + count)
            .map(|index| {
                let input = VertexInput {
                    position: Vec4::from_array(read(position, index)),
                    uv: {
                        let t = read(uv, index);
                        [t[0], t[1]]
                    },
                    color: read(color, index),
                    weight: read(weight, index)[0],
                };
                let out = kernels::run_vertex(program.kernel, &input, program);
                if out.clip.w <= 0.0 {
                    return None;
                }
                let ndc = out.clip / out.clip.w;
                Some(WindowVertex {
                    x: vx + (ndc.x + 1.0) * 0.5 * vw,
                    y: vy + (ndc.y + 1.0) * 0.5 * vh,
                    uv: out.uv,
                    color: out.color,
                    point_size: out.point_size,
                })
            })
            .collect()
    }
}

impl GraphicsApi for SoftwareDevice {
    fn create_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, GpuError> {
        for source in [vertex_source, fragment_source] {
            glsl::check_stage(source).map_err(|log| GpuError::ShaderCompile {
                label: label.to_owned(),
                log,
            })?;
        }
        let kernel = Kernel::from_label(label).ok_or_else(|| GpuError::ProgramLink {
            label: label.to_owned(),
            log: format!("no software kernel for program `{label}`"),
        })?;
        let interface = glsl::scan_program(vertex_source, fragment_source);
        // GL zero-initializes uniforms; only samplers rely on it here.
        let values = interface
            .uniforms
            .iter()
            .map(|u| (u.kind == VariableKind::Sampler2D).then_some(UniformValue::Int(0)))
            .collect();
        let handle = self.allocate_handle();
        let _ = self.programs.insert(
            handle,
            SoftProgram {
                kernel,
                interface,
                values,
            },
        );
        Ok(ProgramId(handle))
    }

    fn delete_program(&mut self, program: ProgramId) {
        let _ = self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.programs
            .get(&program.0)
            .map(|p| p.interface.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.programs
            .get(&program.0)
            .map(|p| p.interface.uniforms.clone())
            .unwrap_or_default()
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
    }

    fn create_texture(&mut self) -> Result<TextureId, GpuError> {
        let handle = self.allocate_handle();
        let _ = self.textures.insert(handle, TexImage::default());
        Ok(TextureId(handle))
    }

    fn upload_texture(&mut self, texture: TextureId, upload: &TextureUpload<'_>) {
        let image = match upload.pixels {
            Some(pixels) => {
                TexImage::from_rgba(upload.width, upload.height, pixels, upload.filter)
            }
            None => TexImage::new(upload.width, upload.height, upload.filter),
        };
        let _ = self.textures.insert(texture.0, image);
        if let Some(slot) = self.units.get_mut(self.active_unit as usize) {
            *slot = None;
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let _ = self.textures.remove(&texture.0);
        for slot in &mut self.units {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    fn create_framebuffer(
        &mut self,
        color: TextureId,
    ) -> Result<FramebufferId, GpuError> {
        let complete = self
            .textures
            .get(&color.0)
            .is_some_and(TexImage::is_complete);
        if !complete {
            return Err(GpuError::IncompleteFramebuffer(INCOMPLETE_ATTACHMENT));
        }
        let handle = self.allocate_handle();
        let _ = self.framebuffers.insert(handle, color);
        self.bound_framebuffer = None;
        Ok(FramebufferId(handle))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        let _ = self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if framebuffer.is_none() {
            self.stats.default_framebuffer_binds += 1;
        }
        self.bound_framebuffer = framebuffer;
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.viewport = [x, y, width.max(0), height.max(0)];
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn clear(&mut self, mask: ClearMask) {
        if !mask.contains(ClearMask::COLOR) {
            return;
        }
        let color = self.clear_color;
        match self.take_target() {
            Some((slot, mut image)) => {
                image.fill(color);
                self.restore_target(slot, image);
            }
            None => log::warn!("clear on a framebuffer without a color attachment"),
        }
    }

    fn enable_blend(&mut self) {
        self.blend_enabled = true;
    }

    fn disable_blend(&mut self) {
        self.blend_enabled = false;
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.blend = (src, dst);
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        let _ = self.enabled_arrays.insert(location);
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) {
        let _ = self.enabled_arrays.remove(&location);
    }

    fn vertex_attrib_pointer(&mut self, pointer: &AttribPointer<'_>) {
        let _ = self.pointers.insert(
            pointer.location,
            StoredPointer {
                components: pointer.components,
                component_type: pointer.component_type,
                normalized: pointer.normalized,
                stride: pointer.effective_stride(),
                data: pointer.data.to_vec(),
            },
        );
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        match self.units.get_mut(self.active_unit as usize) {
            Some(slot) => *slot = texture,
            None => log::warn!("texture unit {} out of range", self.active_unit),
        }
    }

    fn set_uniform(&mut self, location: u32, value: UniformValue) {
        let Some(program) = self
            .current_program
            .and_then(|p| self.programs.get_mut(&p.0))
        else {
            log::warn!("set_uniform without a current program");
            return;
        };
        if let Some(slot) = program.values.get_mut(location as usize) {
            *slot = Some(value);
            self.stats.uniform_writes += 1;
        }
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize) {
        self.stats.draw_calls += 1;
        let Some(program_id) = self.current_program else {
            log::warn!("draw_arrays without a current program");
            return;
        };
        let Some((slot, mut target)) = self.take_target() else {
            log::warn!("draw_arrays into a framebuffer without a color attachment");
            return;
        };

        if let Some(program) = self.programs.get(&program_id.0) {
            let vertices = self.assemble_vertices(program, first, count);
            let bound: Vec<Option<&TexImage>> = self
                .units
                .iter()
                .map(|unit| unit.and_then(|t| self.textures.get(&t.0)))
                .collect();
            let sampler = |name: &str, uv: [f32; 2]| {
                kernels::sample_unit(&bound, program.int(name), uv)
            };
            let blend = self.blend_enabled.then_some(self.blend);
            let scissor = Scissor::new(self.viewport, target.width, target.height);

            let mut shade = |x: u32, y: u32, frag: raster::Fragment| {
                if let Some(rgba) =
                    kernels::run_fragment(program.kernel, &frag, program, &sampler)
                {
                    target.write(x, y, rgba, blend);
                }
            };
            rasterize(primitive, &vertices, scissor, &mut shade);
        }

        self.restore_target(slot, target);
    }

    fn flush(&mut self) {
        self.stats.flushes += 1;
    }
}

fn rasterize(
    primitive: Primitive,
    vertices: &[Option<WindowVertex>],
    scissor: Scissor,
    shade: &mut impl FnMut(u32, u32, raster::Fragment),
) {
    let n = vertices.len();
    match primitive {
        Primitive::Points => {
            for v in vertices.iter().flatten() {
                raster::raster_point(v, scissor, &mut *shade);
            }
        }
        Primitive::Lines => {
            for pair in vertices.chunks_exact(2) {
                if let (Some(a), Some(b)) = (&pair[0], &pair[1]) {
                    raster::raster_line(a, b, scissor, &mut *shade);
                }
            }
        }
        Primitive::Triangles => {
            for i in (0..n / 3).map(|t| t * 3) {
                triangle(vertices, [i, i + 1, i + 2], scissor, shade);
            }
        }
        Primitive::TriangleStrip => {
            for i in 0..n.saturating_sub(2) {
                triangle(vertices, [i, i + 1, i + 2], scissor, shade);
            }
        }
        Primitive::TriangleFan => {
            for i in 1..n.saturating_sub(1) {
                triangle(vertices, [0, i, i + 1], scissor, shade);
            }
        }
    }
}

fn triangle(
    vertices: &[Option<WindowVertex>],
    [a, b, c]: [usize; 3],
    scissor: Scissor,
    shade: &mut impl FnMut(u32, u32, raster::Fragment),
) {
    if let (Some(a), Some(b), Some(c)) = (&vertices[a], &vertices[b], &vertices[c]) {
        raster::raster_triangle([a, b, c], scissor, &mut *shade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec2 position;\nattribute vec2 uv;\n\
                      uniform mat4 mvp;\nuniform mat4 uvTransform;\n\
                      void main() {}";
    const FS: &str = "uniform sampler2D texture;\nuniform float alphaFactor;\n\
                      void main() {}";

    fn quad_bytes() -> Vec<u8> {
        bytemuck::cast_slice(&[-1.0f32, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0])
            .to_vec()
    }

    fn white_texture(device: &mut SoftwareDevice) -> TextureId {
        let texture = device.create_texture().unwrap();
        device.upload_texture(
            texture,
            &TextureUpload {
                width: 2,
                height: 2,
                pixels: Some(&[255; 16]),
                filter: TextureFilter::Nearest,
            },
        );
        texture
    }

    fn draw_textured_quad(device: &mut SoftwareDevice, program: ProgramId) {
        let positions = quad_bytes();
        device.use_program(program);
        device.enable_vertex_attrib_array(0);
        device.vertex_attrib_pointer(&AttribPointer {
            location: 0,
            components: 2,
            component_type: ComponentType::Float,
            normalized: false,
            stride: 0,
            data: &positions,
        });
        device.set_uniform(3, UniformValue::Float(1.0));
        device.draw_arrays(Primitive::TriangleStrip, 0, 4);
    }

    #[test]
    fn unknown_program_label_fails_to_link() {
        let mut device = SoftwareDevice::new(4, 4);
        let err = device.create_program("bloom", VS, FS).unwrap_err();
        assert!(matches!(err, GpuError::ProgramLink { .. }));
        let err = device.create_program("texture", "", FS).unwrap_err();
        assert!(matches!(err, GpuError::ShaderCompile { .. }));
    }

    #[test]
    fn full_screen_strip_covers_the_viewport() {
        let mut device = SoftwareDevice::new(8, 8);
        let program = device.create_program("texture", VS, FS).unwrap();
        let texture = white_texture(&mut device);
        device.active_texture(0);
        device.bind_texture(Some(texture));
        draw_textured_quad(&mut device, program);
        assert!(device.read_screen().iter().all(|&b| b == 255));
        assert_eq!(device.stats().draw_calls, 1);
    }

    #[test]
    fn draws_land_in_the_bound_framebuffer() {
        let mut device = SoftwareDevice::new(4, 4);
        let program = device.create_program("texture", VS, FS).unwrap();
        let color = device.create_texture().unwrap();
        device.upload_texture(
            color,
            &TextureUpload {
                width: 4,
                height: 4,
                pixels: None,
                filter: TextureFilter::Linear,
            },
        );
        let fb = device.create_framebuffer(color).unwrap();
        assert_eq!(device.bound_framebuffer(), None);

        let source = white_texture(&mut device);
        device.bind_texture(Some(source));
        device.bind_framebuffer(Some(fb));
        draw_textured_quad(&mut device, program);
        device.bind_framebuffer(None);

        let (w, h, pixels) = device.read_texture(color).unwrap();
        assert_eq!((w, h), (4, 4));
        assert!(pixels.iter().all(|&b| b == 255));
        assert!(device.read_screen().iter().all(|&b| b == 0));
        assert_eq!(device.stats().default_framebuffer_binds, 1);
    }

    #[test]
    fn framebuffer_needs_allocated_storage() {
        let mut device = SoftwareDevice::new(4, 4);
        let color = device.create_texture().unwrap();
        assert_eq!(
            device.create_framebuffer(color),
            Err(GpuError::IncompleteFramebuffer(INCOMPLETE_ATTACHMENT))
        );
    }

    #[test]
    fn disabled_arrays_read_as_constant_attribute() {
        let pointer = StoredPointer {
            components: 4,
            component_type: ComponentType::UnsignedByte,
            normalized: true,
            stride: 4,
            data: vec![255, 0, 51, 255],
        };
        let color = pointer.fetch(0);
        for (got, want) in color.iter().zip([1.0, 0.0, 0.2, 1.0]) {
            assert!((got - want).abs() < 1e-6);
        }
        assert_eq!(pointer.fetch(7), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn upload_leaves_active_unit_unbound() {
        let mut device = SoftwareDevice::new(1, 1);
        let a = white_texture(&mut device);
        device.active_texture(3);
        device.bind_texture(Some(a));
        let _ = white_texture(&mut device);
        assert_eq!(device.bound_texture(3), None);
    }
}
