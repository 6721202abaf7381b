//! C mirror of the upstream shader parser's output tables.
//!
//! The host lexes and parses shader text on its side; what crosses the
//! boundary is the token stream plus the uniform/struct/function/sampler
//! tables, which convert here into the transpiler's input model.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use gs_msl::sampler::{AddressMode, SampleFilter, SamplerInfo};
use gs_msl::{
    FunctionDecl, FunctionParam, ParsedShader, SamplerDecl, StructDecl, StructField, Token,
    TokenKind, UniformDecl,
};

#[repr(C)]
#[derive(Clone, Copy)]
pub struct shader_token {
    /// 0 none, 1 name, 2 other, 3 space/tab, 4 newline.
    pub kind: c_int,
    pub text: *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct shader_var {
    pub type_: *const c_char,
    pub name: *const c_char,
    pub mapping: *const c_char,
    pub is_const: bool,
    pub array_count: u32,
    pub default_val: *const u8,
    pub default_size: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct shader_struct {
    pub name: *const c_char,
    pub vars: *const shader_var,
    pub num_vars: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct shader_func {
    pub name: *const c_char,
    pub return_type: *const c_char,
    pub mapping: *const c_char,
    pub params: *const shader_var,
    pub num_params: usize,
    /// Token range of the body, braces included.
    pub body_start: usize,
    pub body_end: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct gs_sampler_info {
    pub filter: c_int,
    pub address_u: c_int,
    pub address_v: c_int,
    pub address_w: c_int,
    pub max_anisotropy: c_int,
    pub border_color: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct shader_sampler {
    pub name: *const c_char,
    pub info: gs_sampler_info,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct shader_parse {
    pub tokens: *const shader_token,
    pub num_tokens: usize,
    pub uniforms: *const shader_var,
    pub num_uniforms: usize,
    pub structs: *const shader_struct,
    pub num_structs: usize,
    pub funcs: *const shader_func,
    pub num_funcs: usize,
    pub samplers: *const shader_sampler,
    pub num_samplers: usize,
}

pub(crate) unsafe fn cstr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

pub(crate) unsafe fn cstr_opt(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe fn slice<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

fn address_mode_from(value: c_int) -> AddressMode {
    match value {
        1 => AddressMode::Wrap,
        2 => AddressMode::Mirror,
        3 => AddressMode::Border,
        4 => AddressMode::MirrorOnce,
        _ => AddressMode::Clamp,
    }
}

fn sample_filter_from(value: c_int) -> SampleFilter {
    match value {
        1 => SampleFilter::Linear,
        2 => SampleFilter::Anisotropic,
        3 => SampleFilter::MinMagPointMipLinear,
        4 => SampleFilter::MinPointMagLinearMipPoint,
        5 => SampleFilter::MinPointMagMipLinear,
        6 => SampleFilter::MinLinearMagMipPoint,
        7 => SampleFilter::MinLinearMagPointMipLinear,
        8 => SampleFilter::MinMagLinearMipPoint,
        _ => SampleFilter::Point,
    }
}

pub(crate) fn sampler_info_from(info: &gs_sampler_info) -> SamplerInfo {
    SamplerInfo {
        address_u: address_mode_from(info.address_u),
        address_v: address_mode_from(info.address_v),
        address_w: address_mode_from(info.address_w),
        filter: sample_filter_from(info.filter),
        max_anisotropy: info.max_anisotropy.max(1) as u32,
        border_color: info.border_color,
    }
}

unsafe fn var_to_uniform(var: &shader_var) -> UniformDecl {
    UniformDecl {
        name: cstr(var.name),
        type_name: cstr(var.type_),
        mapping: cstr_opt(var.mapping),
        is_const: var.is_const,
        default_value: slice(var.default_val, var.default_size).to_vec(),
        array_count: var.array_count,
    }
}

/// Convert the host parse tables into the transpiler's input model.
pub(crate) unsafe fn parsed_shader_from(parse: &shader_parse) -> ParsedShader {
    let mut shader = ParsedShader::default();

    for token in slice(parse.tokens, parse.num_tokens) {
        let kind = match token.kind {
            1 => TokenKind::Name,
            2 => TokenKind::Other,
            3 => TokenKind::SpaceTab,
            4 => TokenKind::Newline,
            _ => TokenKind::None,
        };
        shader.tokens.push(Token::new(kind, cstr(token.text)));
    }

    for var in slice(parse.uniforms, parse.num_uniforms) {
        shader.uniforms.push(var_to_uniform(var));
    }

    for st in slice(parse.structs, parse.num_structs) {
        shader.structs.push(StructDecl {
            name: cstr(st.name),
            fields: slice(st.vars, st.num_vars)
                .iter()
                .map(|v| StructField {
                    name: cstr(v.name),
                    type_name: cstr(v.type_),
                    mapping: cstr_opt(v.mapping),
                })
                .collect(),
        });
    }

    for func in slice(parse.funcs, parse.num_funcs) {
        shader.functions.push(FunctionDecl {
            name: cstr(func.name),
            return_type: cstr(func.return_type),
            mapping: cstr_opt(func.mapping),
            params: slice(func.params, func.num_params)
                .iter()
                .map(|p| FunctionParam {
                    name: cstr(p.name),
                    type_name: cstr(p.type_),
                    mapping: cstr_opt(p.mapping),
                })
                .collect(),
            body: func.body_start..func.body_end,
        });
    }

    for sampler in slice(parse.samplers, parse.num_samplers) {
        shader.samplers.push(SamplerDecl {
            name: cstr(sampler.name),
            info: sampler_info_from(&sampler.info),
        });
    }

    shader
}
