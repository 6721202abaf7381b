//! End-to-end transpilation fixtures: build a parsed shader the way the
//! upstream parser would, run the writer, and check the emitted MSL and
//! metadata.

use gs_msl::sampler::{SamplerDescriptor, SamplerInfo};
use gs_msl::{
    FunctionDecl, FunctionParam, ParamKind, ParsedShader, SamplerDecl, ShaderKind, Stream,
    StructDecl, StructField, Token, TokenKind, UniformDecl, VertexFormat,
};

/// Stand-in for the external lexer: identifiers and numbers become NAME
/// tokens, punctuation single-character OTHER tokens.
fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\n' {
            tokens.push(Token::new(TokenKind::Newline, "\n"));
            i += 1;
        } else if c == ' ' || c == '\t' {
            let start = i;
            while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
                i += 1;
            }
            tokens.push(Token::new(TokenKind::SpaceTab, &src[start..i]));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::new(TokenKind::Name, &src[start..i]));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_')
            {
                i += 1;
            }
            tokens.push(Token::new(TokenKind::Name, &src[start..i]));
        } else {
            tokens.push(Token::new(TokenKind::Other, &src[i..i + 1]));
            i += 1;
        }
    }
    tokens
}

#[derive(Default)]
struct Builder {
    shader: ParsedShader,
}

impl Builder {
    fn uniform(mut self, name: &str, ty: &str) -> Self {
        self.shader.uniforms.push(UniformDecl {
            name: name.to_string(),
            type_name: ty.to_string(),
            mapping: None,
            is_const: false,
            default_value: Vec::new(),
            array_count: 0,
        });
        self
    }

    fn sampler(mut self, name: &str) -> Self {
        self.shader.samplers.push(SamplerDecl {
            name: name.to_string(),
            info: SamplerInfo::default(),
        });
        self
    }

    fn structure(mut self, name: &str, fields: &[(&str, &str, Option<&str>)]) -> Self {
        self.shader.structs.push(StructDecl {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|&(name, ty, mapping)| StructField {
                    name: name.to_string(),
                    type_name: ty.to_string(),
                    mapping: mapping.map(str::to_string),
                })
                .collect(),
        });
        self
    }

    fn function(
        mut self,
        name: &str,
        return_type: &str,
        params: &[(&str, &str, Option<&str>)],
        body: &str,
    ) -> Self {
        let start = self.shader.tokens.len();
        self.shader.tokens.extend(tokenize(body));
        let end = self.shader.tokens.len();
        self.shader.functions.push(FunctionDecl {
            name: name.to_string(),
            return_type: return_type.to_string(),
            mapping: None,
            params: params
                .iter()
                .map(|&(name, ty, mapping)| FunctionParam {
                    name: name.to_string(),
                    type_name: ty.to_string(),
                    mapping: mapping.map(str::to_string),
                })
                .collect(),
            body: start..end,
        });
        self
    }

    fn build(self) -> ParsedShader {
        self.shader
    }
}

#[test]
fn default_vertex_shader() {
    let shader = Builder::default()
        .uniform("ViewProj", "float4x4")
        .structure(
            "VertInOut",
            &[
                ("pos", "float4", Some("POSITION")),
                ("uv", "float2", Some("TEXCOORD0")),
            ],
        )
        .function(
            "main",
            "VertInOut",
            &[("vert_in", "VertInOut", None)],
            "{\n    VertInOut vert_out;\n    vert_out.pos = mul(float4(vert_in.pos.xyz, 1.0), ViewProj);\n    vert_out.uv = vert_in.uv;\n    return vert_out;\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Vertex).unwrap();
    let msl = &out.msl;

    assert!(msl.contains("struct UniformData {\n    float4x4 ViewProj;\n};"));
    assert!(msl.contains("struct VertInOut_In {\n    float4 pos [[attribute(0)]];\n    float2 uv [[attribute(1)]];\n};"));
    assert!(msl.contains("struct VertInOut_Out {\n    float4 pos [[position]];\n    float2 uv;\n};"));
    assert!(msl.contains(
        "vertex VertInOut_Out _main(VertInOut_In vert_in [[stage_in]], \
         constant UniformData &uniforms [[buffer(30)]])"
    ));
    assert!(msl.contains("VertInOut_Out vert_out;"));
    assert!(msl.contains("vert_out.pos = (float4(vert_in.pos.xyz, 1.0)) * (uniforms.ViewProj);"));

    let meta = &out.meta;
    assert_eq!(meta.uniform_block_size, 64);
    assert_eq!(meta.uniforms.len(), 1);
    assert_eq!(meta.uniforms[0].kind, ParamKind::Mat4);
    assert_eq!(meta.uniforms[0].offset, 0);
    assert_eq!(meta.streams, vec![Stream::Position, Stream::Texcoord { count: 1 }]);
    assert_eq!(meta.vertex_attributes.len(), 2);
    assert_eq!(meta.vertex_attributes[0].format, VertexFormat::Float4);
    assert_eq!(meta.vertex_attributes[0].stride, 16);
    assert_eq!(meta.vertex_attributes[1].format, VertexFormat::Float2);
    assert_eq!(meta.vertex_attributes[1].buffer, 1);
}

#[test]
fn default_fragment_shader() {
    let shader = Builder::default()
        .uniform("image", "texture2d")
        .sampler("def_sampler")
        .structure(
            "VertInOut",
            &[
                ("pos", "float4", Some("POSITION")),
                ("uv", "float2", Some("TEXCOORD0")),
            ],
        )
        .function(
            "main",
            "float4",
            &[("vert_in", "VertInOut", None)],
            "{\n    return image.Sample(def_sampler, vert_in.uv);\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    let msl = &out.msl;

    // A lone texture uniform leaves the uniform block empty, so none is
    // declared and the entry point takes no buffer argument.
    assert!(!msl.contains("UniformData"));
    assert!(msl.contains("struct VertInOut {\n    float4 pos [[position]];\n    float2 uv;\n};"));
    assert!(msl.contains(
        "fragment float4 _main(VertInOut vert_in [[stage_in]], \
         texture2d<float> image [[texture(0)]], sampler def_sampler [[sampler(0)]])"
    ));
    assert!(msl.contains("return image.sample(def_sampler, vert_in.uv);"));

    let meta = &out.meta;
    assert_eq!(meta.texture_count, 1);
    assert_eq!(meta.uniforms[0].texture_slot, Some(0));
    assert_eq!(meta.uniforms[0].sampler_slot, Some(0));
    assert_eq!(meta.samplers.len(), 1);
    assert_eq!(meta.samplers[0], SamplerDescriptor::from_info(&SamplerInfo::default()));
}

#[test]
fn shared_sampler_pairs_by_sample_site() {
    let shader = Builder::default()
        .uniform("base", "texture2d")
        .uniform("overlay", "texture2d")
        .sampler("smp")
        .function(
            "main",
            "float4",
            &[("uv", "float2", Some("TEXCOORD0"))],
            "{\n    return base.Sample(smp, uv) + overlay.Sample(smp, uv);\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    let meta = &out.meta;

    // Texture slots count texture uniforms; both textures sample through
    // the single declared sampler at slot 0.
    assert_eq!(meta.uniforms[0].texture_slot, Some(0));
    assert_eq!(meta.uniforms[1].texture_slot, Some(1));
    assert_eq!(meta.uniforms[0].sampler_slot, Some(0));
    assert_eq!(meta.uniforms[1].sampler_slot, Some(0));
}

#[test]
fn texture_load_rewrites_to_read() {
    let shader = Builder::default()
        .uniform("tex", "texture2d")
        .function(
            "main",
            "float4",
            &[("uv", "float2", Some("TEXCOORD0"))],
            "{\n    return tex.Load(int3(uv.x, uv.y, 0));\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    assert!(out
        .msl
        .contains("return tex.read(uint2(uv.x, uv.y), uint(0));"));
}

#[test]
fn texture_load_vector_argument_forces_level_zero() {
    let shader = Builder::default()
        .uniform("tex", "texture2d")
        .function(
            "main",
            "float4",
            &[("coord", "int2", Some("TEXCOORD0"))],
            "{\n    return tex.Load(coord);\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    assert!(out
        .msl
        .contains("return tex.read(uint2((coord).xy), uint(0));"));
}

#[test]
fn fragment_float3_return_widens() {
    let shader = Builder::default()
        .function(
            "main",
            "float3",
            &[("c", "float3", None)],
            "{\n    return c;\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    assert!(out.msl.contains("fragment float4 _main(float3 c [[stage_in]])"));
    assert!(out.msl.contains("return float4(c, 1);"));
}

#[test]
fn sample_variants() {
    let shader = Builder::default()
        .uniform("tex", "texture2d")
        .sampler("smp")
        .function(
            "main",
            "float4",
            &[("uv", "float2", Some("TEXCOORD0"))],
            "{\n    float4 a = tex.SampleBias(smp, uv, 0.5);\n    float4 b = tex.SampleLevel(smp, uv, 2);\n    float4 c = tex.SampleGrad(smp, uv, ddx(uv), ddy(uv));\n    return a + b + c;\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    assert!(out.msl.contains("tex.sample(smp, uv, bias(0.5))"));
    assert!(out.msl.contains("tex.sample(smp, uv, level(2))"));
    assert!(out.msl.contains("tex.sample(smp, uv, gradient2d(dfdx(uv), dfdy(uv)))"));
}

#[test]
fn helper_functions_thread_uniforms_and_textures() {
    let shader = Builder::default()
        .uniform("gamma", "float")
        .uniform("image", "texture2d")
        .sampler("smp")
        .function(
            "correct",
            "float4",
            &[("c", "float4", None)],
            "{\n    return pow(c, gamma);\n}",
        )
        .function(
            "main",
            "float4",
            &[("uv", "float2", Some("TEXCOORD0"))],
            "{\n    return correct(image.Sample(smp, uv));\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    let msl = &out.msl;

    assert!(msl.contains("float4 correct(float4 c, constant UniformData &uniforms)"));
    assert!(msl.contains("return pow(c, uniforms.gamma);"));
    assert!(msl.contains(
        "fragment float4 _main(float2 uv [[stage_in]], \
         constant UniformData &uniforms [[buffer(30)]], \
         texture2d<float> image [[texture(0)]], sampler smp [[sampler(0)]])"
    ));
    assert!(msl.contains("return correct(image.sample(smp, uv), uniforms);"));
}

#[test]
fn comparisons_reduce_componentwise() {
    let shader = Builder::default()
        .function(
            "main",
            "float4",
            &[("v", "float4", None), ("w", "float4", None)],
            "{\n    if (v == w)\n        return v;\n    return w;\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Vertex).unwrap();
    assert!(out.msl.contains("if (all(v == w))"));
}

#[test]
fn intrinsics_and_glsl_probe() {
    let shader = Builder::default()
        .function(
            "main",
            "float4",
            &[("v", "float4", None)],
            "{\n    if (obs_glsl_compile)\n        return lerp(v, frac(v), 0.5);\n    return mad(v, v, v);\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Vertex).unwrap();
    assert!(out.msl.contains("if (false)"));
    assert!(out.msl.contains("return mix(v, fract(v), 0.5);"));
    assert!(out.msl.contains("return ((v) * (v)) + (v);"));
}

#[test]
fn clip_is_rejected() {
    let shader = Builder::default()
        .function(
            "main",
            "float4",
            &[("v", "float4", None)],
            "{\n    clip(v.a);\n    return v;\n}",
        )
        .build();

    assert!(gs_msl::write_string(&shader, ShaderKind::Fragment).is_err());
}

#[test]
fn half_types_widen_in_bodies() {
    let shader = Builder::default()
        .function(
            "main",
            "float4",
            &[("v", "float4", None)],
            "{\n    half4 h = half4(v);\n    return float4(h);\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Vertex).unwrap();
    assert!(out.msl.contains("float4 h = float4(v);"));
}

#[test]
fn uniform_layout_packs_and_records_offsets() {
    let shader = Builder::default()
        .uniform("scale", "float")
        .uniform("color", "float4")
        .uniform("image", "texture2d")
        .function("main", "float4", &[("v", "float4", None)], "{\n    return v * scale * color;\n}")
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    let meta = &out.meta;

    // `color` cannot straddle the first 16-byte line.
    assert_eq!(meta.uniforms[0].offset, 0);
    assert_eq!(meta.uniforms[1].offset, 16);
    assert_eq!(meta.uniform_block_size, 32);
    // Texture slots count texture-class uniforms only.
    assert_eq!(meta.uniforms[2].texture_slot, Some(0));
    assert_eq!(meta.uniforms[2].kind, ParamKind::Texture);

    // Determinism: a second run yields the identical layout.
    let again = gs_msl::write_string(&shader, ShaderKind::Fragment).unwrap();
    let offsets: Vec<u32> = meta.uniforms.iter().map(|u| u.offset).collect();
    let offsets2: Vec<u32> = again.meta.uniforms.iter().map(|u| u.offset).collect();
    assert_eq!(offsets, offsets2);
}

#[test]
fn texcoord_streams_fold_with_count() {
    let shader = Builder::default()
        .structure(
            "VertIn",
            &[
                ("pos", "float4", Some("POSITION")),
                ("uv0", "float2", Some("TEXCOORD0")),
                ("uv1", "float4", Some("TEXCOORD1")),
                ("color", "float4", Some("COLOR")),
            ],
        )
        .structure(
            "VertOut",
            &[
                ("pos", "float4", Some("POSITION")),
                ("uv0", "float2", Some("TEXCOORD0")),
            ],
        )
        .function(
            "main",
            "VertOut",
            &[("v", "VertIn", None)],
            "{\n    VertOut o;\n    o.pos = v.pos;\n    o.uv0 = v.uv0;\n    return o;\n}",
        )
        .build();

    let out = gs_msl::write_string(&shader, ShaderKind::Vertex).unwrap();
    let meta = &out.meta;
    assert_eq!(
        meta.streams,
        vec![
            Stream::Position,
            Stream::Texcoord { count: 2 },
            Stream::Color
        ]
    );
    assert_eq!(meta.vertex_attributes.len(), 4);
    assert_eq!(meta.vertex_attributes[2].format, VertexFormat::Float4);
    assert_eq!(meta.vertex_attributes[3].attribute, 3);
}
