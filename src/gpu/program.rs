//! Linked shader programs and the per-surface program cache.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::assets::AssetSource;
use crate::gpu::api::{
    ActiveVariable, GpuError, GraphicsApi, ProgramId, VariableKind,
};

/// The bundled shader programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Plain particle sprites.
    Particle,
    /// Fluid particle sprites sized by particle weight.
    WaterParticle,
    /// Textured quad with a UV transform and alpha factor.
    Texture,
    /// Alpha-thresholded composite of an offscreen surface.
    Screen,
    /// Horizontal blur pass.
    HBlur,
    /// Vertical blur pass.
    VBlur,
}

impl ShaderKind {
    /// Every kind, in load order.
    pub const ALL: [Self; 6] = [
        Self::Particle,
        Self::WaterParticle,
        Self::Texture,
        Self::Screen,
        Self::HBlur,
        Self::VBlur,
    ];

    /// Label the program is linked under.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Particle => "particle",
            Self::WaterParticle => "water_particle",
            Self::Texture => "texture",
            Self::Screen => "screen",
            Self::HBlur => "hblur",
            Self::VBlur => "vblur",
        }
    }

    /// Vertex and fragment source file names, relative to the shader
    /// directory.
    pub const fn sources(self) -> (&'static str, &'static str) {
        match self {
            Self::Particle => ("Particle.vert", "Particle.frag"),
            Self::WaterParticle => ("WaterParticle.vert", "Particle.frag"),
            Self::Texture => ("Texture.vert", "Texture.frag"),
            Self::Screen => ("Screen.vert", "Screen.frag"),
            Self::HBlur => ("HBlur.vert", "Blur.frag"),
            Self::VBlur => ("VBlur.vert", "Blur.frag"),
        }
    }
}

/// A linked program with its attribute and uniform tables.
///
/// Lookups of names the program does not declare return `None`; shader
/// variants are free to omit inputs.
#[derive(Debug)]
pub struct GpuProgram {
    id: ProgramId,
    label: String,
    attributes: FxHashMap<String, ActiveVariable>,
    uniforms: FxHashMap<String, ActiveVariable>,
}

impl GpuProgram {
    /// Compile, link and reflect a program.
    ///
    /// # Errors
    ///
    /// Propagates the device's compile or link error.
    pub fn link(
        gl: &mut dyn GraphicsApi,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, GpuError> {
        let id = gl.create_program(label, vertex_source, fragment_source)?;
        let by_name = |vars: Vec<ActiveVariable>| -> FxHashMap<String, ActiveVariable> {
            vars.into_iter().map(|v| (v.name.clone(), v)).collect()
        };
        Ok(Self {
            id,
            label: label.to_owned(),
            attributes: by_name(gl.active_attributes(id)),
            uniforms: by_name(gl.active_uniforms(id)),
        })
    }

    /// Device handle.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Label the program was linked under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Location of a declared attribute.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).map(|a| a.location)
    }

    /// Declared type of an attribute.
    pub fn attribute_kind(&self, name: &str) -> Option<VariableKind> {
        self.attributes.get(name).map(|a| a.kind)
    }

    /// Location of a declared uniform.
    pub fn uniform_location(&self, name: &str) -> Option<u32> {
        self.uniforms.get(name).map(|u| u.location)
    }

    /// Make the program current unless it already is.
    pub fn bind(&self, gl: &mut dyn GraphicsApi) {
        if gl.current_program() != Some(self.id) {
            gl.use_program(self.id);
        }
    }
}

/// Programs compiled for one GL surface, keyed by [`ShaderKind`].
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: FxHashMap<ShaderKind, Rc<GpuProgram>>,
}

impl ProgramCache {
    /// Compile every [`ShaderKind`] from `shader_dir`. Kinds whose sources
    /// are missing or fail to build are logged and left out.
    pub fn load_all(
        gl: &mut dyn GraphicsApi,
        assets: &dyn AssetSource,
        shader_dir: &str,
    ) -> Self {
        let mut programs = FxHashMap::default();
        for kind in ShaderKind::ALL {
            let (vert, frag) = kind.sources();
            let load = |file: &str| {
                let path = format!("{}/{file}", shader_dir.trim_end_matches('/'));
                let source = assets.load_text(&path);
                if source.is_none() {
                    log::error!("shader source {path} unavailable");
                }
                source
            };
            let (Some(vertex_source), Some(fragment_source)) = (load(vert), load(frag))
            else {
                continue;
            };
            match GpuProgram::link(gl, kind.label(), &vertex_source, &fragment_source) {
                Ok(program) => {
                    log::debug!("linked program {}", kind.label());
                    let _ = programs.insert(kind, Rc::new(program));
                }
                Err(e) => log::error!("{e}"),
            }
        }
        Self { programs }
    }

    /// The program for `kind`, if it linked.
    pub fn program(&self, kind: ShaderKind) -> Option<Rc<GpuProgram>> {
        self.programs.get(&kind).cloned()
    }

    /// Number of linked programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether no program linked.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Delete every program from the device.
    pub fn release(&mut self, gl: &mut dyn GraphicsApi) {
        for (_, program) in self.programs.drain() {
            gl.delete_program(program.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{EmbeddedAssets, MemoryAssets};
    use crate::gpu::SoftwareDevice;

    #[test]
    fn bundled_shaders_all_link() {
        let mut device = SoftwareDevice::new(8, 8);
        let cache = ProgramCache::load_all(&mut device, &EmbeddedAssets, "shaders/glsl");
        assert_eq!(cache.len(), ShaderKind::ALL.len());

        let water = cache.program(ShaderKind::WaterParticle).unwrap();
        assert!(water.attribute_location("position").is_some());
        assert!(water.attribute_location("color").is_some());
        assert!(water.attribute_location("weight").is_some());
        assert!(water.uniform_location("pointSize").is_some());
        assert!(water.attribute_location("uv").is_none());

        let blur = cache.program(ShaderKind::HBlur).unwrap();
        assert!(blur.uniform_location("blurBufferSize").is_some());
    }

    #[test]
    fn missing_and_broken_sources_are_skipped() {
        let mut assets = MemoryAssets::default();
        assets.insert_text("glsl/Texture.vert", "attribute vec2 position;\nvoid main() {}");
        assets.insert_text("glsl/Texture.frag", "void main() {}");
        assets.insert_text("glsl/Screen.vert", "");
        assets.insert_text("glsl/Screen.frag", "void main() {}");

        let mut device = SoftwareDevice::new(8, 8);
        let cache = ProgramCache::load_all(&mut device, &assets, "glsl/");
        assert_eq!(cache.len(), 1);
        assert!(cache.program(ShaderKind::Texture).is_some());
        assert!(cache.program(ShaderKind::Screen).is_none());
    }

    #[test]
    fn bind_skips_redundant_use() {
        let mut device = SoftwareDevice::new(8, 8);
        let program = GpuProgram::link(
            &mut device,
            "screen",
            "attribute vec3 position;\nvoid main() {}",
            "void main() {}",
        )
        .unwrap();
        program.bind(&mut device);
        assert_eq!(device.current_program(), Some(program.id()));
        program.bind(&mut device);
        assert_eq!(device.current_program(), Some(program.id()));
    }

    #[test]
    fn release_deletes_programs() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut cache = ProgramCache::load_all(&mut device, &EmbeddedAssets, "shaders/glsl");
        assert_eq!(device.program_count(), ShaderKind::ALL.len());
        cache.release(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.program_count(), 0);
    }
}
