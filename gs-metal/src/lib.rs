/*!
Metal 3 backend for the gs graphics subsystem.

The host speaks an immediate-mode, draw-call oriented dialect: bind state
piece by piece, then draw. Metal wants everything up front in pipeline and
pass descriptors. The [`Device`] in this crate is the impedance matcher: it
collects the host's state into a [`state::RenderState`] block, folds it into
descriptors at draw time, caches compiled pipelines by descriptor fingerprint,
defers clears into render-pass load actions, and recycles per-frame dynamic
buffers through a [`pool::BufferPool`].

Shaders arrive in the host's HLSL-like language and are translated by the
[`gs_msl`] crate; the metadata record it produces drives uniform upload,
vertex stream binding and texture/sampler slots here.

All state mutation happens on the host's graphics thread. The single
cross-thread seam is the buffer pool, which command-buffer completion
handlers rotate under a lock.
*/

mod buffer;
mod conv;
mod device;
mod handle;
mod pipeline;
mod pool;
mod sampler;
mod shader;
mod state;
mod surface;
mod texture;

pub use buffer::{IndexBuffer, IndexData, TexCoords, VertexBuffer, VertexData};
pub use conv::{format_pixel_size, format_row_size};
pub use device::{Device, DeviceError};
pub use handle::{Handle, HandleTable};
pub use pipeline::{PipelineCache, PipelineKey};
pub use pool::BufferPool;
pub use sampler::SamplerState;
pub use shader::{Shader, ShaderError, ShaderParam};
pub use state::{BlendState, DepthState, PendingClear, RenderState, StencilFace, StencilState};
pub use surface::SwapChain;
pub use texture::{IoSurfaceRef, StageSurface, Texture, TextureKind, ZStencilBuffer};

/// Texture slots addressable by the host.
pub const MAX_TEXTURE_SLOTS: usize = 8;

/// Host color formats. The mapping to Metal formats lives in `conv`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    #[default]
    Unknown,
    A8,
    R8,
    Rgba,
    Bgrx,
    Bgra,
    R10G10B10A2,
    Rgba16,
    R16,
    Rgba16F,
    Rgba32F,
    Rg16F,
    Rg32F,
    R16F,
    R32F,
    Dxt1,
    Dxt3,
    Dxt5,
    R8G8,
}

/// Host depth/stencil formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ZStencilFormat {
    #[default]
    None,
    Z16,
    Z24S8,
    Z32F,
    Z32FS8X24,
}

/// Index element width. The host enum maps unsigned-short to 16 bits and
/// unsigned-long to 32.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub const fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    #[default]
    Back,
    Front,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
    SrcAlphaSat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthTest {
    Never,
    Less,
    #[default]
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilSide {
    Front,
    Back,
    Both,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Incr,
    Decr,
    Invert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    Tris,
    TriStrip,
}

bitflags::bitflags! {
    /// Clear targets. Tested with `contains`, so combined flags clear
    /// every requested attachment in one pass.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TextureFlags: u32 {
        const BUILD_MIPMAPS = 1 << 0;
        const DYNAMIC = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const SHARED = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Per-channel color write mask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ColorWrite: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorWrite {
    fn default() -> Self {
        Self::all()
    }
}

/// An integer rectangle in framebuffer coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}
