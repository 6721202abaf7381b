//! Shader entry points and the parameter setter family.

use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};

use glam::Mat4;

use gs_msl::{ParamKind, ShaderKind};

use crate::{
    device_ref, free_object, handle_of, matrix4, new_object, object, parse::parsed_shader_from,
    parse::shader_parse, vec2, vec3, vec4, FfiDevice, GsObject, ObjectKind, SParam,
};

unsafe fn create_shader(
    device: *mut FfiDevice,
    kind: ShaderKind,
    parse: *const shader_parse,
) -> *mut GsObject {
    if parse.is_null() {
        log::error!("shader creation with no parse data");
        return std::ptr::null_mut();
    }
    let dev = device_ref(device);
    let parsed = parsed_shader_from(&*parse);
    match dev.core.create_shader(kind, &parsed) {
        Ok(handle) => {
            let count = dev
                .core
                .shaders
                .get(handle)
                .map_or(0, |s| s.params.len());
            let params = (0..count)
                .map(|index| {
                    let name = dev
                        .core
                        .shaders
                        .get(handle)
                        .map(|s| s.params[index].name.clone())
                        .unwrap_or_default();
                    Box::into_raw(Box::new(SParam {
                        device,
                        shader: handle,
                        index,
                        name: CString::new(name).unwrap_or_else(|_| CString::new("").unwrap()),
                    }))
                })
                .collect();
            dev.shader_params.insert(handle.0, params);
            let object_kind = match kind {
                ShaderKind::Vertex => ObjectKind::VertexShader,
                ShaderKind::Fragment => ObjectKind::PixelShader,
            };
            new_object(device, object_kind, handle)
        }
        Err(err) => {
            log::error!("shader creation failed: {err}");
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_vertexshader_create(
    device: *mut FfiDevice,
    parse: *const shader_parse,
) -> *mut GsObject {
    create_shader(device, ShaderKind::Vertex, parse)
}

#[no_mangle]
pub unsafe extern "C" fn device_pixelshader_create(
    device: *mut FfiDevice,
    parse: *const shader_parse,
) -> *mut GsObject {
    create_shader(device, ShaderKind::Fragment, parse)
}

unsafe fn shader_object(shader: *mut GsObject) -> Option<(&'static mut FfiDevice, gs_metal::Handle)> {
    if shader.is_null() {
        return None;
    }
    match (*shader).kind {
        ObjectKind::VertexShader | ObjectKind::PixelShader => {
            Some((device_ref((*shader).device), (*shader).handle))
        }
        kind => {
            log::error!("object of kind {kind:?} used as shader");
            None
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_destroy(shader: *mut GsObject) {
    if let Some((dev, handle)) = shader_object(shader) {
        dev.core.shaders.remove(handle);
        if let Some(params) = dev.shader_params.remove(&handle.0) {
            for param in params {
                drop(Box::from_raw(param));
            }
        }
        if dev.cur_vertex_shader == shader {
            dev.cur_vertex_shader = std::ptr::null_mut();
            dev.core.state.vertex_shader = None;
        }
        if dev.cur_pixel_shader == shader {
            dev.cur_pixel_shader = std::ptr::null_mut();
            dev.core.state.fragment_shader = None;
        }
    }
    free_object(shader);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_vertexshader(device: *mut FfiDevice, shader: *mut GsObject) {
    let dev = device_ref(device);
    dev.cur_vertex_shader = shader;
    dev.core.state.vertex_shader = handle_of(shader);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_pixelshader(device: *mut FfiDevice, shader: *mut GsObject) {
    let dev = device_ref(device);
    dev.cur_pixel_shader = shader;
    dev.core.state.fragment_shader = handle_of(shader);
}

#[no_mangle]
pub unsafe extern "C" fn device_get_vertex_shader(device: *mut FfiDevice) -> *mut GsObject {
    device_ref(device).cur_vertex_shader
}

#[no_mangle]
pub unsafe extern "C" fn device_get_pixel_shader(device: *mut FfiDevice) -> *mut GsObject {
    device_ref(device).cur_pixel_shader
}

// ---- parameters --------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn gs_shader_get_num_params(shader: *mut GsObject) -> c_int {
    match shader_object(shader) {
        Some((dev, handle)) => dev
            .shader_params
            .get(&handle.0)
            .map_or(0, |p| p.len() as c_int),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_get_param_by_idx(
    shader: *mut GsObject,
    param: u32,
) -> *mut SParam {
    match shader_object(shader) {
        Some((dev, handle)) => dev
            .shader_params
            .get(&handle.0)
            .and_then(|p| p.get(param as usize).copied())
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_get_param_by_name(
    shader: *mut GsObject,
    name: *const c_char,
) -> *mut SParam {
    if name.is_null() {
        return std::ptr::null_mut();
    }
    let wanted = std::ffi::CStr::from_ptr(name);
    match shader_object(shader) {
        Some((dev, handle)) => dev
            .shader_params
            .get(&handle.0)
            .and_then(|params| {
                params
                    .iter()
                    .find(|&&p| (*p).name.as_c_str() == wanted)
                    .copied()
            })
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_get_viewproj_matrix(shader: *mut GsObject) -> *mut SParam {
    gs_shader_get_param_by_name(shader, b"ViewProj\0".as_ptr() as *const c_char)
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_get_world_matrix(shader: *mut GsObject) -> *mut SParam {
    gs_shader_get_param_by_name(shader, b"World\0".as_ptr() as *const c_char)
}

#[repr(C)]
pub struct gs_shader_param_info {
    pub type_: c_int,
    pub name: *const c_char,
}

fn param_type_to(kind: ParamKind) -> c_int {
    match kind {
        ParamKind::Unknown => 0,
        ParamKind::Bool => 1,
        ParamKind::Float => 2,
        ParamKind::Int => 3,
        ParamKind::Vec2 => 5,
        ParamKind::Vec3 => 6,
        ParamKind::Vec4 => 7,
        ParamKind::Int2 => 8,
        ParamKind::Int3 => 9,
        ParamKind::Int4 => 10,
        ParamKind::Mat4 => 11,
        ParamKind::Texture => 12,
    }
}

unsafe fn with_param<R: Default>(
    param: *mut SParam,
    f: impl FnOnce(&mut gs_metal::ShaderParam) -> R,
) -> R {
    if param.is_null() {
        return R::default();
    }
    let sparam = &*param;
    let dev = device_ref(sparam.device);
    match dev.core.shaders.get_mut(sparam.shader) {
        Some(shader) => match shader.params.get_mut(sparam.index) {
            Some(p) => f(p),
            None => R::default(),
        },
        None => {
            log::warn!("shader parameter used after its shader was destroyed");
            R::default()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_get_param_info(
    param: *mut SParam,
    info: *mut gs_shader_param_info,
) {
    if param.is_null() || info.is_null() {
        return;
    }
    let sparam = &*param;
    let kind = with_param(param, |p| p.kind);
    (*info).type_ = param_type_to(kind);
    (*info).name = sparam.name.as_ptr();
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_bool(param: *mut SParam, val: bool) {
    with_param(param, |p| p.set_value(&[val as u8]));
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_float(param: *mut SParam, val: f32) {
    with_param(param, |p| p.set_value(&val.to_ne_bytes()));
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_int(param: *mut SParam, val: c_int) {
    with_param(param, |p| p.set_value(&(val as i32).to_ne_bytes()));
}

unsafe fn set_floats(param: *mut SParam, vals: &[f32]) {
    let bytes =
        std::slice::from_raw_parts(vals.as_ptr() as *const u8, std::mem::size_of_val(vals));
    with_param(param, |p| p.set_value(bytes));
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_vec2(param: *mut SParam, val: *const vec2) {
    if val.is_null() {
        return;
    }
    let v = &*val;
    set_floats(param, &[v.x, v.y]);
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_vec3(param: *mut SParam, val: *const vec3) {
    if val.is_null() {
        return;
    }
    let v = &*val;
    set_floats(param, &[v.x, v.y, v.z]);
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_vec4(param: *mut SParam, val: *const vec4) {
    if val.is_null() {
        return;
    }
    let v = &*val;
    set_floats(param, &[v.x, v.y, v.z, v.w]);
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct matrix3 {
    pub x: vec3,
    pub y: vec3,
    pub z: vec3,
}

/// Matrices upload transposed so the shader's row-vector convention and
/// Metal's column-major storage agree.
unsafe fn set_matrix(param: *mut SParam, mat: Mat4) {
    let cols = mat.transpose().to_cols_array();
    set_floats(param, &cols);
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_matrix3(param: *mut SParam, val: *const matrix3) {
    if val.is_null() {
        return;
    }
    let m = &*val;
    let full = matrix4 {
        x: vec4 {
            x: m.x.x,
            y: m.x.y,
            z: m.x.z,
            w: 0.0,
        },
        y: vec4 {
            x: m.y.x,
            y: m.y.y,
            z: m.y.z,
            w: 0.0,
        },
        z: vec4 {
            x: m.z.x,
            y: m.z.y,
            z: m.z.z,
            w: 0.0,
        },
        t: vec4 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        },
    };
    set_matrix(param, full.to_mat4());
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_matrix4(param: *mut SParam, val: *const matrix4) {
    if val.is_null() {
        return;
    }
    set_matrix(param, (*val).to_mat4());
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_texture(param: *mut SParam, val: *mut GsObject) {
    let handle = handle_of(val);
    with_param(param, |p| p.texture = handle);
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_val(param: *mut SParam, val: *const c_void, size: usize) {
    if val.is_null() {
        return;
    }
    let bytes = std::slice::from_raw_parts(val as *const u8, size);
    with_param(param, |p| p.set_value(bytes));
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_default(param: *mut SParam) {
    with_param(param, |p| {
        let default = p.default.clone();
        p.set_value(&default);
    });
}

#[no_mangle]
pub unsafe extern "C" fn gs_shader_set_next_sampler(param: *mut SParam, sampler: *mut GsObject) {
    let handle = if sampler.is_null() {
        None
    } else if let Some((_, handle)) = object(sampler, ObjectKind::Sampler) {
        Some(handle)
    } else {
        None
    };
    with_param(param, |p| p.next_sampler = handle);
}
