//! Host enum to Metal enum mappings.

use gs_msl::sampler;

use crate::{
    BlendFactor, BlendOp, ColorFormat, ColorWrite, CullMode, DepthTest, DrawMode, IndexType,
    StencilOp, ZStencilFormat,
};

pub fn map_color_format(format: ColorFormat) -> Option<mtl::MTLPixelFormat> {
    use mtl::MTLPixelFormat as Mpf;
    Some(match format {
        ColorFormat::Unknown => return None,
        ColorFormat::A8 => Mpf::A8Unorm,
        ColorFormat::R8 => Mpf::R8Unorm,
        ColorFormat::Rgba => Mpf::RGBA8Unorm,
        ColorFormat::Bgrx | ColorFormat::Bgra => Mpf::BGRA8Unorm,
        ColorFormat::R10G10B10A2 => Mpf::RGB10A2Unorm,
        ColorFormat::Rgba16 => Mpf::RGBA16Unorm,
        ColorFormat::R16 => Mpf::R16Unorm,
        ColorFormat::Rgba16F => Mpf::RGBA16Float,
        ColorFormat::Rgba32F => Mpf::RGBA32Float,
        ColorFormat::Rg16F => Mpf::RG16Float,
        ColorFormat::Rg32F => Mpf::RG32Float,
        ColorFormat::R16F => Mpf::R16Float,
        ColorFormat::R32F => Mpf::R32Float,
        ColorFormat::Dxt1 => Mpf::BC1_RGBA,
        ColorFormat::Dxt3 => Mpf::BC2_RGBA,
        ColorFormat::Dxt5 => Mpf::BC3_RGBA,
        ColorFormat::R8G8 => Mpf::RG8Unorm,
    })
}

pub fn map_zstencil_format(format: ZStencilFormat) -> Option<mtl::MTLPixelFormat> {
    use mtl::MTLPixelFormat as Mpf;
    Some(match format {
        ZStencilFormat::None => return None,
        ZStencilFormat::Z16 => Mpf::Depth16Unorm,
        ZStencilFormat::Z24S8 => Mpf::Depth24Unorm_Stencil8,
        ZStencilFormat::Z32F => Mpf::Depth32Float,
        ZStencilFormat::Z32FS8X24 => Mpf::Depth32Float_Stencil8,
    })
}

/// Whether a depth/stencil format carries stencil bits.
pub fn zstencil_has_stencil(format: ZStencilFormat) -> bool {
    matches!(format, ZStencilFormat::Z24S8 | ZStencilFormat::Z32FS8X24)
}

/// Bytes per pixel for linear formats; `None` for block-compressed ones.
pub fn format_pixel_size(format: ColorFormat) -> Option<u32> {
    Some(match format {
        ColorFormat::Unknown => return None,
        ColorFormat::A8 | ColorFormat::R8 => 1,
        ColorFormat::R16 | ColorFormat::R16F | ColorFormat::R8G8 => 2,
        ColorFormat::Rgba
        | ColorFormat::Bgrx
        | ColorFormat::Bgra
        | ColorFormat::R10G10B10A2
        | ColorFormat::Rg16F
        | ColorFormat::R32F => 4,
        ColorFormat::Rgba16 | ColorFormat::Rgba16F | ColorFormat::Rg32F => 8,
        ColorFormat::Rgba32F => 16,
        ColorFormat::Dxt1 | ColorFormat::Dxt3 | ColorFormat::Dxt5 => return None,
    })
}

/// Row pitch in bytes for one mip level `width` pixels across.
pub fn format_row_size(format: ColorFormat, width: u32) -> u32 {
    match format {
        ColorFormat::Dxt1 => width.div_ceil(4) * 8,
        ColorFormat::Dxt3 | ColorFormat::Dxt5 => width.div_ceil(4) * 16,
        other => format_pixel_size(other).unwrap_or(0) * width,
    }
}

pub fn map_blend_factor(factor: BlendFactor) -> mtl::MTLBlendFactor {
    use mtl::MTLBlendFactor as Mbf;
    match factor {
        BlendFactor::Zero => Mbf::Zero,
        BlendFactor::One => Mbf::One,
        BlendFactor::SrcColor => Mbf::SourceColor,
        BlendFactor::InvSrcColor => Mbf::OneMinusSourceColor,
        BlendFactor::SrcAlpha => Mbf::SourceAlpha,
        BlendFactor::InvSrcAlpha => Mbf::OneMinusSourceAlpha,
        BlendFactor::DstColor => Mbf::DestinationColor,
        BlendFactor::InvDstColor => Mbf::OneMinusDestinationColor,
        BlendFactor::DstAlpha => Mbf::DestinationAlpha,
        BlendFactor::InvDstAlpha => Mbf::OneMinusDestinationAlpha,
        BlendFactor::SrcAlphaSat => Mbf::SourceAlphaSaturated,
    }
}

pub fn map_blend_op(op: BlendOp) -> mtl::MTLBlendOperation {
    use mtl::MTLBlendOperation as Mbo;
    match op {
        BlendOp::Add => Mbo::Add,
        BlendOp::Subtract => Mbo::Subtract,
        BlendOp::ReverseSubtract => Mbo::ReverseSubtract,
        BlendOp::Min => Mbo::Min,
        BlendOp::Max => Mbo::Max,
    }
}

pub fn map_write_mask(mask: ColorWrite) -> mtl::MTLColorWriteMask {
    let mut out = mtl::MTLColorWriteMask::empty();
    out.set(mtl::MTLColorWriteMask::Red, mask.contains(ColorWrite::RED));
    out.set(
        mtl::MTLColorWriteMask::Green,
        mask.contains(ColorWrite::GREEN),
    );
    out.set(mtl::MTLColorWriteMask::Blue, mask.contains(ColorWrite::BLUE));
    out.set(
        mtl::MTLColorWriteMask::Alpha,
        mask.contains(ColorWrite::ALPHA),
    );
    out
}

pub fn map_compare(test: DepthTest) -> mtl::MTLCompareFunction {
    use mtl::MTLCompareFunction as Mcf;
    match test {
        DepthTest::Never => Mcf::Never,
        DepthTest::Less => Mcf::Less,
        DepthTest::LessEqual => Mcf::LessEqual,
        DepthTest::Equal => Mcf::Equal,
        DepthTest::GreaterEqual => Mcf::GreaterEqual,
        DepthTest::Greater => Mcf::Greater,
        DepthTest::NotEqual => Mcf::NotEqual,
        DepthTest::Always => Mcf::Always,
    }
}

pub fn map_stencil_op(op: StencilOp) -> mtl::MTLStencilOperation {
    use mtl::MTLStencilOperation as Mso;
    match op {
        StencilOp::Keep => Mso::Keep,
        StencilOp::Zero => Mso::Zero,
        StencilOp::Replace => Mso::Replace,
        StencilOp::Incr => Mso::IncrementClamp,
        StencilOp::Decr => Mso::DecrementClamp,
        StencilOp::Invert => Mso::Invert,
    }
}

pub fn map_cull_mode(mode: CullMode) -> mtl::MTLCullMode {
    match mode {
        CullMode::Back => mtl::MTLCullMode::Back,
        CullMode::Front => mtl::MTLCullMode::Front,
        CullMode::Off => mtl::MTLCullMode::None,
    }
}

pub fn map_primitive(mode: DrawMode) -> mtl::MTLPrimitiveType {
    use mtl::MTLPrimitiveType as Mpt;
    match mode {
        DrawMode::Points => Mpt::Point,
        DrawMode::Lines => Mpt::Line,
        DrawMode::LineStrip => Mpt::LineStrip,
        DrawMode::Tris => Mpt::Triangle,
        DrawMode::TriStrip => Mpt::TriangleStrip,
    }
}

pub fn map_index_type(ty: IndexType) -> mtl::MTLIndexType {
    match ty {
        IndexType::U16 => mtl::MTLIndexType::UInt16,
        IndexType::U32 => mtl::MTLIndexType::UInt32,
    }
}

pub fn map_vertex_format(format: gs_msl::VertexFormat) -> mtl::MTLVertexFormat {
    use mtl::MTLVertexFormat as Mvf;
    match format {
        gs_msl::VertexFormat::Float => Mvf::Float,
        gs_msl::VertexFormat::Float2 => Mvf::Float2,
        gs_msl::VertexFormat::Float3 => Mvf::Float3,
        gs_msl::VertexFormat::Float4 => Mvf::Float4,
    }
}

fn map_address(address: sampler::Address) -> mtl::MTLSamplerAddressMode {
    use mtl::MTLSamplerAddressMode as Msam;
    match address {
        sampler::Address::ClampToEdge => Msam::ClampToEdge,
        sampler::Address::Repeat => Msam::Repeat,
        sampler::Address::MirrorRepeat => Msam::MirrorRepeat,
        sampler::Address::ClampToBorder => Msam::ClampToBorderColor,
        sampler::Address::MirrorClampToEdge => Msam::MirrorClampToEdge,
    }
}

fn map_min_mag_filter(filter: sampler::Filter) -> mtl::MTLSamplerMinMagFilter {
    match filter {
        sampler::Filter::Nearest => mtl::MTLSamplerMinMagFilter::Nearest,
        sampler::Filter::Linear => mtl::MTLSamplerMinMagFilter::Linear,
    }
}

fn map_border_color(color: [f32; 4]) -> mtl::MTLSamplerBorderColor {
    // Metal only has the three canned border colors; pick the closest.
    if color[3] < 0.5 {
        mtl::MTLSamplerBorderColor::TransparentBlack
    } else if color[0] + color[1] + color[2] < 1.5 {
        mtl::MTLSamplerBorderColor::OpaqueBlack
    } else {
        mtl::MTLSamplerBorderColor::OpaqueWhite
    }
}

pub fn map_sampler(desc: &sampler::SamplerDescriptor) -> mtl::SamplerDescriptor {
    let raw = mtl::SamplerDescriptor::new();
    raw.set_address_mode_s(map_address(desc.address[0]));
    raw.set_address_mode_t(map_address(desc.address[1]));
    raw.set_address_mode_r(map_address(desc.address[2]));
    raw.set_min_filter(map_min_mag_filter(desc.min_filter));
    raw.set_mag_filter(map_min_mag_filter(desc.mag_filter));
    raw.set_mip_filter(match desc.mip_filter {
        sampler::Filter::Nearest => mtl::MTLSamplerMipFilter::Nearest,
        sampler::Filter::Linear => mtl::MTLSamplerMipFilter::Linear,
    });
    raw.set_max_anisotropy(desc.anisotropy() as u64);
    raw.set_border_color(map_border_color(desc.border_color));
    raw
}

pub fn map_clear_color(color: [f32; 4]) -> mtl::MTLClearColor {
    mtl::MTLClearColor::new(
        color[0] as f64,
        color[1] as f64,
        color[2] as f64,
        color[3] as f64,
    )
}
