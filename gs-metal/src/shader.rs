//! Compiled shader objects and their parameter blocks.

use gs_msl::{ParamKind, ParsedShader, ShaderKind, ShaderMeta, Transpiled};

use crate::conv;
use crate::Handle;

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("shader transpilation failed: {0}")]
    Transpile(#[from] gs_msl::Error),
    #[error("MSL compilation failed: {0}")]
    Compile(String),
    #[error("compiled library is missing the entry point: {0}")]
    MissingEntryPoint(String),
}

/// One host-visible shader parameter, carrying its current and default
/// value bytes plus the texture/sampler bindings the host attaches.
pub struct ShaderParam {
    pub name: String,
    pub kind: ParamKind,
    pub offset: u32,
    pub texture_slot: Option<u32>,
    /// Argument-table slot of the sampler this texture samples with; not
    /// the texture slot, since samplers bind by declaration order.
    pub sampler_slot: Option<u32>,
    pub array_count: u32,
    pub current: Vec<u8>,
    pub default: Vec<u8>,
    pub dirty: bool,
    /// Bound texture, for texture-class parameters.
    pub texture: Option<Handle>,
    /// Sampler to bind alongside the texture, when the host set one.
    pub next_sampler: Option<Handle>,
}

impl ShaderParam {
    pub fn set_value(&mut self, bytes: &[u8]) {
        self.current.clear();
        self.current.extend_from_slice(bytes);
        self.dirty = true;
    }

    pub fn set_default(&mut self, bytes: &[u8]) {
        self.default.clear();
        self.default.extend_from_slice(bytes);
    }
}

pub struct Shader {
    pub kind: ShaderKind,
    library: mtl::Library,
    function: mtl::Function,
    pub meta: ShaderMeta,
    pub params: Vec<ShaderParam>,
    /// CPU staging for the uniform block, laid out per the metadata.
    pub scratch: Vec<u8>,
    vertex_descriptor: Option<mtl::VertexDescriptor>,
    /// Sampler states baked from the shader's own sampler declarations,
    /// bound positionally in the fragment stage.
    pub samplers: Vec<mtl::SamplerState>,
}

impl Shader {
    /// Transpile, compile and wrap one parsed shader.
    pub fn new(
        device: &mtl::Device,
        kind: ShaderKind,
        parsed: &ParsedShader,
    ) -> Result<Shader, ShaderError> {
        let Transpiled { msl, meta } = gs_msl::write_string(parsed, kind)?;
        log::debug!("transpiled {kind:?} shader:\n{msl}");

        let options = mtl::CompileOptions::new();
        options.set_language_version(mtl::MTLLanguageVersion::V2_4);
        let library = device
            .new_library_with_source(&msl, &options)
            .map_err(ShaderError::Compile)?;
        let function = library
            .get_function("_main", None)
            .map_err(|_| ShaderError::MissingEntryPoint("_main".into()))?;

        let params = meta
            .uniforms
            .iter()
            .map(|u| ShaderParam {
                name: u.name.clone(),
                kind: u.kind,
                offset: u.offset,
                texture_slot: u.texture_slot,
                sampler_slot: u.sampler_slot,
                array_count: u.array_count,
                current: u.default_value.clone(),
                default: u.default_value.clone(),
                dirty: !u.default_value.is_empty(),
                texture: None,
                next_sampler: None,
            })
            .collect();

        let vertex_descriptor = match kind {
            ShaderKind::Vertex => Some(build_vertex_descriptor(&meta)),
            ShaderKind::Fragment => None,
        };
        let samplers = meta
            .samplers
            .iter()
            .map(|desc| device.new_sampler(&conv::map_sampler(desc)))
            .collect();

        Ok(Shader {
            kind,
            library,
            function,
            scratch: vec![0; meta.uniform_block_size as usize],
            meta,
            params,
            vertex_descriptor,
            samplers,
        })
    }

    pub fn function(&self) -> &mtl::Function {
        &self.function
    }

    pub fn library(&self) -> &mtl::Library {
        &self.library
    }

    pub fn vertex_descriptor(&self) -> Option<&mtl::VertexDescriptorRef> {
        self.vertex_descriptor.as_deref()
    }

    pub fn param_by_name(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Copy every dirty non-texture parameter into the staging block.
    pub fn flush_params(&mut self) {
        for param in &mut self.params {
            if param.kind == ParamKind::Texture || !param.dirty {
                continue;
            }
            let offset = param.offset as usize;
            let end = (offset + param.current.len()).min(self.scratch.len());
            if end > offset {
                let len = end - offset;
                self.scratch[offset..end].copy_from_slice(&param.current[..len]);
            }
            param.dirty = false;
        }
    }
}

fn build_vertex_descriptor(meta: &ShaderMeta) -> mtl::VertexDescriptor {
    let descriptor = mtl::VertexDescriptor::new().to_owned();
    for attr in &meta.vertex_attributes {
        let info = descriptor
            .attributes()
            .object_at(attr.attribute as u64)
            .unwrap();
        info.set_format(conv::map_vertex_format(attr.format));
        info.set_buffer_index(attr.buffer as u64);
        info.set_offset(0);
        let layout = descriptor.layouts().object_at(attr.buffer as u64).unwrap();
        layout.set_stride(attr.stride as u64);
        layout.set_step_function(mtl::MTLVertexStepFunction::PerVertex);
    }
    descriptor
}
