/*!
Transpiler from the gs effect shader language to [MSL][msl] (Metal Shading
Language).

The input is not raw text: lexing and declaration parsing happen upstream.
What arrives here is a [`ParsedShader`]: the token stream of the source plus
tables of uniforms, structs, functions and samplers, each function carrying
the token range of its body. The transpiler analyzes those tables,
rewrites the token stream into MSL, and produces a [`ShaderMeta`] record the
device needs at draw time: the uniform buffer layout, the vertex input
descriptor, the fragment sampler descriptors and the ordered list of vertex
streams the shader consumes.

Uniforms are gathered into a single `UniformData` struct bound at
[`UNIFORM_BUFFER_SLOT`]. Textures and samplers become flat `[[texture(n)]]` /
`[[sampler(n)]]` arguments on the fragment entry point, with slots assigned in
declaration order.

[msl]: https://developer.apple.com/metal/Metal-Shading-Language-Specification.pdf
*/

use std::ops::Range;

mod analyze;
mod keywords;
mod layout;
pub mod sampler;
mod writer;

pub use analyze::{FunctionInfo, ModuleInfo, StorageClass, StructUsage};
pub use layout::uniform_size;

/// Buffer binding index reserved for the gathered `UniformData` block.
///
/// Vertex stream buffers count up from zero, so the uniform block lives at
/// the top of the argument table where the two can never collide.
pub const UNIFORM_BUFFER_SLOT: u64 = 30;

/// Uniform blocks smaller than this are passed inline via `setVertexBytes`
/// rather than through a pool buffer.
pub const MAX_INLINE_UNIFORM_SIZE: usize = 4096;

/// Classification of a lexed token, as produced by the upstream lexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Empty/erased token; ignored entirely.
    None,
    /// An identifier or keyword.
    Name,
    /// A single punctuation character.
    Other,
    /// A run of spaces or tabs.
    SpaceTab,
    /// A line break.
    Newline,
}

/// One token of the original shader source.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }
}

/// Whether the shader is a vertex or a fragment ("pixel") program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

/// A uniform declaration from the upstream parser.
#[derive(Clone, Debug)]
pub struct UniformDecl {
    pub name: String,
    /// Source type name, e.g. `float4` or `texture2d`.
    pub type_name: String,
    /// Optional semantic annotation (`VIEWPROJ`, `WORLD`, ...).
    pub mapping: Option<String>,
    pub is_const: bool,
    /// Raw bytes of the initializer, if the source supplied one.
    pub default_value: Vec<u8>,
    /// Element count; 0 or 1 for non-arrays.
    pub array_count: u32,
}

/// One field of a shader struct.
#[derive(Clone, Debug)]
pub struct StructField {
    pub name: String,
    pub type_name: String,
    /// Semantic annotation (`POSITION`, `TEXCOORD0`, ...).
    pub mapping: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug)]
pub struct FunctionParam {
    pub name: String,
    pub type_name: String,
    pub mapping: Option<String>,
}

/// A function declaration, with its body still in token form.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub return_type: String,
    /// Semantic annotation on the return value.
    pub mapping: Option<String>,
    pub params: Vec<FunctionParam>,
    /// Token range of the body, including the outer braces.
    pub body: Range<usize>,
}

impl FunctionDecl {
    /// The entry point is always spelled `main` in the source language.
    pub fn is_main(&self) -> bool {
        self.name == "main"
    }
}

/// A sampler state declaration.
#[derive(Clone, Debug)]
pub struct SamplerDecl {
    pub name: String,
    pub info: sampler::SamplerInfo,
}

/// The parsed form of one shader, handed over by the upstream lexer/parser.
#[derive(Clone, Debug, Default)]
pub struct ParsedShader {
    pub tokens: Vec<Token>,
    pub uniforms: Vec<UniformDecl>,
    pub structs: Vec<StructDecl>,
    pub functions: Vec<FunctionDecl>,
    pub samplers: Vec<SamplerDecl>,
}

impl ParsedShader {
    pub fn main_function(&self) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.is_main())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] std::fmt::Error),
    #[error("type '{0}' is not supported")]
    UnsupportedType(String),
    #[error("intrinsic '{0}' is not supported")]
    UnsupportedIntrinsic(String),
    #[error("shader has no 'main' function")]
    MissingMain,
    #[error("unbalanced '{0}' in function body")]
    Unbalanced(char),
    #[error("unexpected end of token stream")]
    UnexpectedEnd,
    #[error("'{0}' called with {1} arguments, expected {2}")]
    BadArity(String, usize, usize),
    #[error("vertex input field '{0}' has no usable semantic")]
    BadVertexSemantic(String),
    #[error("uniform '{0}' has unknown type '{1}'")]
    UnknownUniformType(String, String),
}

/// Semantic type of a shader parameter, as exposed to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamKind {
    #[default]
    Unknown,
    Bool,
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Int2,
    Int3,
    Int4,
    Mat4,
    Texture,
}

impl ParamKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "bool" => Self::Bool,
            "float" | "half" => Self::Float,
            "int" => Self::Int,
            "float2" | "half2" => Self::Vec2,
            "float3" | "half3" => Self::Vec3,
            "float4" | "half4" => Self::Vec4,
            "int2" => Self::Int2,
            "int3" => Self::Int3,
            "int4" => Self::Int4,
            "float4x4" | "matrix" => Self::Mat4,
            name if name.starts_with("texture") => Self::Texture,
            _ => Self::Unknown,
        }
    }
}

/// One entry of the uniform buffer layout.
#[derive(Clone, Debug)]
pub struct UniformMeta {
    pub name: String,
    pub kind: ParamKind,
    /// Byte offset inside the `UniformData` block; unused for textures.
    pub offset: u32,
    /// Slot assigned left-to-right over texture-class uniforms only.
    pub texture_slot: Option<u32>,
    /// `[[sampler(k)]]` slot of the sampler this texture is sampled with,
    /// following sampler declaration order. Independent of
    /// `texture_slot`: several textures may share one sampler.
    pub sampler_slot: Option<u32>,
    pub array_count: u32,
    pub default_value: Vec<u8>,
}

/// Formats a vertex input attribute can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float,
    Float2,
    Float3,
    Float4,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }
}

/// One attribute of the vertex input descriptor. Each attribute reads from
/// its own stream buffer, so attribute and buffer indices always coincide.
#[derive(Clone, Copy, Debug)]
pub struct VertexAttribute {
    pub attribute: u32,
    pub buffer: u32,
    pub format: VertexFormat,
    pub stride: u32,
}

/// A vertex stream consumed by a vertex shader, in declaration order.
/// Repeated texcoord inputs fold into a single entry carrying their count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Position,
    Normal,
    Tangent,
    Color,
    Texcoord { count: u32 },
}

impl Stream {
    /// Number of stream buffers this entry binds at draw time.
    pub fn buffer_count(self) -> u32 {
        match self {
            Stream::Texcoord { count } => count,
            _ => 1,
        }
    }
}

/// Everything the device needs to drive a compiled shader.
#[derive(Clone, Debug, Default)]
pub struct ShaderMeta {
    /// Uniform descriptors in declaration order, textures included.
    pub uniforms: Vec<UniformMeta>,
    /// Total byte size of the `UniformData` block, padded to 16.
    pub uniform_block_size: u32,
    /// Vertex input layout; empty for fragment shaders.
    pub vertex_attributes: Vec<VertexAttribute>,
    /// Sampler states in declaration order; empty for vertex shaders.
    pub samplers: Vec<sampler::SamplerDescriptor>,
    /// Number of texture-class uniforms.
    pub texture_count: u32,
    /// Vertex streams consumed by the entry point, in order.
    pub streams: Vec<Stream>,
}

/// The result of a successful transpilation.
#[derive(Clone, Debug)]
pub struct Transpiled {
    pub msl: String,
    pub meta: ShaderMeta,
}

/// Transpile one parsed shader into MSL source plus its metadata record.
pub fn write_string(shader: &ParsedShader, kind: ShaderKind) -> Result<Transpiled, Error> {
    let info = analyze::analyze(shader, kind)?;
    let mut w = writer::Writer::new(shader, &info, kind);
    let msl = w.write()?;
    let meta = w.finish_meta()?;
    Ok(Transpiled { msl, meta })
}

#[test]
fn test_error_size() {
    use std::mem::size_of;
    assert!(size_of::<Error>() <= 64);
}
