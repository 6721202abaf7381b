//! Resource entry points: vertex/index buffers, textures, depth-stencil
//! buffers, stage surfaces and sampler states.

use std::ffi::c_void;
use std::os::raw::c_int;

use gs_metal::{ColorFormat, IndexData, TexCoords, TextureFlags, VertexData};

use crate::parse::{self, sampler_info_from};
use crate::{
    color_format_from, color_format_to, device_ref, free_object, handle_of, host_free,
    index_type_from, index_type_to, new_object, new_object_with_data, object, vec3,
    zstencil_format_from, FfiDevice, GsObject, ObjectKind,
};

extern "C" {
    /// Host-side destructor for vertex buffer source structs.
    fn gs_vbdata_destroy(data: *mut gs_vb_data);
    /// Find an IOSurface by its global identifier.
    fn IOSurfaceLookup(id: u32) -> *mut c_void;
}

// ---- vertex buffers ----------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy)]
pub struct gs_tvertarray {
    pub width: usize,
    pub array: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct gs_vb_data {
    pub num: usize,
    pub points: *mut vec3,
    pub normals: *mut vec3,
    pub tangents: *mut vec3,
    pub colors: *mut u32,
    pub num_tex: usize,
    pub tvarray: *mut gs_tvertarray,
}

unsafe fn vec3_stream(ptr: *mut vec3, num: usize) -> Option<Vec<[f32; 4]>> {
    if ptr.is_null() {
        return None;
    }
    let src = std::slice::from_raw_parts(ptr as *const [f32; 4], num);
    Some(src.to_vec())
}

/// Copy the host's source struct into the backend's vertex data model.
unsafe fn vertex_data_from(data: &gs_vb_data) -> VertexData {
    let mut texcoords = Vec::with_capacity(data.num_tex);
    if !data.tvarray.is_null() {
        for tv in std::slice::from_raw_parts(data.tvarray, data.num_tex) {
            let floats = data.num * tv.width;
            let array = if tv.array.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(tv.array as *const f32, floats).to_vec()
            };
            texcoords.push(TexCoords {
                width: tv.width as u32,
                data: array,
            });
        }
    }
    VertexData {
        num: data.num,
        points: vec3_stream(data.points, data.num).unwrap_or_default(),
        normals: vec3_stream(data.normals, data.num),
        tangents: vec3_stream(data.tangents, data.num),
        colors: if data.colors.is_null() {
            None
        } else {
            Some(std::slice::from_raw_parts(data.colors, data.num).to_vec())
        },
        texcoords,
    }
}

const GS_DYNAMIC: u32 = 1 << 1;
const GS_RENDER_TARGET: u32 = 1 << 2;
const GS_BUILD_MIPMAPS: u32 = 1 << 0;

#[no_mangle]
pub unsafe extern "C" fn device_vertexbuffer_create(
    device: *mut FfiDevice,
    data: *mut gs_vb_data,
    flags: u32,
) -> *mut GsObject {
    if data.is_null() {
        log::error!("vertex buffer creation with no data");
        return std::ptr::null_mut();
    }
    let dev = device_ref(device);
    let dynamic = flags & GS_DYNAMIC != 0;
    let handle = dev.core.create_vertex_buffer(vertex_data_from(&*data), dynamic);
    new_object_with_data(device, ObjectKind::VertexBuffer, handle, data as *mut _)
}

#[no_mangle]
pub unsafe extern "C" fn gs_vertexbuffer_destroy(vb: *mut GsObject) {
    if let Some((dev, handle)) = object(vb, ObjectKind::VertexBuffer) {
        dev.core.vertex_buffers.remove(handle);
        gs_vbdata_destroy((*vb).host_data as *mut gs_vb_data);
        if dev.cur_vertex_buffer == vb {
            dev.cur_vertex_buffer = std::ptr::null_mut();
            dev.core.state.vertex_buffer = None;
        }
    }
    free_object(vb);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_vertexbuffer(device: *mut FfiDevice, vb: *mut GsObject) {
    let dev = device_ref(device);
    dev.cur_vertex_buffer = vb;
    dev.core.state.vertex_buffer = handle_of(vb);
}

#[no_mangle]
pub unsafe extern "C" fn gs_vertexbuffer_flush(vb: *mut GsObject) {
    let Some((dev, handle)) = object(vb, ObjectKind::VertexBuffer) else {
        return;
    };
    let data = (*vb).host_data as *mut gs_vb_data;
    let converted = if data.is_null() {
        None
    } else {
        Some(vertex_data_from(&*data))
    };
    dev.core.flush_vertex_buffer(handle, converted);
}

#[no_mangle]
pub unsafe extern "C" fn gs_vertexbuffer_flush_direct(vb: *mut GsObject, data: *const gs_vb_data) {
    let Some((dev, handle)) = object(vb, ObjectKind::VertexBuffer) else {
        return;
    };
    if data.is_null() {
        return;
    }
    dev.core
        .flush_vertex_buffer(handle, Some(vertex_data_from(&*data)));
}

#[no_mangle]
pub unsafe extern "C" fn gs_vertexbuffer_get_data(vb: *mut GsObject) -> *mut gs_vb_data {
    if vb.is_null() {
        std::ptr::null_mut()
    } else {
        (*vb).host_data as *mut gs_vb_data
    }
}

// ---- index buffers -----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_indexbuffer_create(
    device: *mut FfiDevice,
    index_type: c_int,
    indices: *mut c_void,
    num: usize,
    flags: u32,
) -> *mut GsObject {
    let dev = device_ref(device);
    let ty = index_type_from(index_type);
    let bytes = if indices.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(indices as *const u8, num * ty.size()).to_vec()
    };
    let handle = dev.core.create_index_buffer(
        IndexData {
            index_type: ty,
            num,
            bytes,
        },
        flags & GS_DYNAMIC != 0,
    );
    new_object_with_data(device, ObjectKind::IndexBuffer, handle, indices)
}

#[no_mangle]
pub unsafe extern "C" fn gs_indexbuffer_destroy(ib: *mut GsObject) {
    if let Some((dev, handle)) = object(ib, ObjectKind::IndexBuffer) {
        dev.core.index_buffers.remove(handle);
        host_free((*ib).host_data);
        if dev.cur_index_buffer == ib {
            dev.cur_index_buffer = std::ptr::null_mut();
            dev.core.state.index_buffer = None;
        }
    }
    free_object(ib);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_indexbuffer(device: *mut FfiDevice, ib: *mut GsObject) {
    let dev = device_ref(device);
    dev.cur_index_buffer = ib;
    dev.core.state.index_buffer = handle_of(ib);
}

#[no_mangle]
pub unsafe extern "C" fn gs_indexbuffer_flush(ib: *mut GsObject) {
    let Some((dev, handle)) = object(ib, ObjectKind::IndexBuffer) else {
        return;
    };
    let host = (*ib).host_data;
    let converted = if host.is_null() {
        None
    } else {
        let (ty, num) = match dev.core.index_buffers.get(handle) {
            Some(buffer) => (buffer.index_type, buffer.num_indices()),
            None => return,
        };
        Some(IndexData {
            index_type: ty,
            num,
            bytes: std::slice::from_raw_parts(host as *const u8, num * ty.size()).to_vec(),
        })
    };
    dev.core.flush_index_buffer(handle, converted);
}

#[no_mangle]
pub unsafe extern "C" fn gs_indexbuffer_flush_direct(ib: *mut GsObject, data: *const c_void) {
    let Some((dev, handle)) = object(ib, ObjectKind::IndexBuffer) else {
        return;
    };
    if data.is_null() {
        return;
    }
    let (ty, num) = match dev.core.index_buffers.get(handle) {
        Some(buffer) => (buffer.index_type, buffer.num_indices()),
        None => return,
    };
    dev.core.flush_index_buffer(
        handle,
        Some(IndexData {
            index_type: ty,
            num,
            bytes: std::slice::from_raw_parts(data as *const u8, num * ty.size()).to_vec(),
        }),
    );
}

#[no_mangle]
pub unsafe extern "C" fn gs_indexbuffer_get_data(ib: *mut GsObject) -> *mut c_void {
    if ib.is_null() {
        std::ptr::null_mut()
    } else {
        (*ib).host_data
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_indexbuffer_get_num_indices(ib: *mut GsObject) -> usize {
    match object(ib, ObjectKind::IndexBuffer) {
        Some((dev, handle)) => dev
            .core
            .index_buffers
            .get(handle)
            .map_or(0, |b| b.num_indices()),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_indexbuffer_get_type(ib: *mut GsObject) -> c_int {
    match object(ib, ObjectKind::IndexBuffer) {
        Some((dev, handle)) => dev
            .core
            .index_buffers
            .get(handle)
            .map_or(0, |b| index_type_to(b.index_type)),
        None => 0,
    }
}

// ---- 2D textures -------------------------------------------------------

fn texture_flags_from(flags: u32) -> TextureFlags {
    let mut out = TextureFlags::empty();
    out.set(TextureFlags::BUILD_MIPMAPS, flags & GS_BUILD_MIPMAPS != 0);
    out.set(TextureFlags::DYNAMIC, flags & GS_DYNAMIC != 0);
    out.set(TextureFlags::RENDER_TARGET, flags & GS_RENDER_TARGET != 0);
    out
}

/// Gather per-mip initial data slices for one face.
unsafe fn level_data(
    data: *const *const u8,
    faces: u32,
    width: u32,
    height: u32,
    format: ColorFormat,
    levels: u32,
) -> Vec<&'static [u8]> {
    if data.is_null() {
        return Vec::new();
    }
    let levels = if levels == 0 { 1 } else { levels };
    let mut out = Vec::new();
    let mut index = 0;
    for _face in 0..faces {
        for level in 0..levels {
            let ptr = *data.add(index);
            index += 1;
            if ptr.is_null() {
                return out;
            }
            let w = (width >> level).max(1);
            let h = (height >> level).max(1);
            let size = gs_metal::format_row_size(format, w) as usize * h as usize;
            out.push(std::slice::from_raw_parts(ptr, size));
        }
    }
    out
}

#[no_mangle]
pub unsafe extern "C" fn device_texture_create(
    device: *mut FfiDevice,
    width: u32,
    height: u32,
    color_format: c_int,
    levels: u32,
    data: *const *const u8,
    flags: u32,
) -> *mut GsObject {
    let dev = device_ref(device);
    let format = color_format_from(color_format);
    let chunks = level_data(data, 1, width, height, format, levels);
    match dev.core.create_texture(
        gs_metal::TextureKind::D2,
        width,
        height,
        format,
        levels,
        &chunks,
        texture_flags_from(flags),
    ) {
        Some(handle) => new_object(device, ObjectKind::Texture, handle),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_destroy(tex: *mut GsObject) {
    if tex.is_null() {
        return;
    }
    let kind = (*tex).kind;
    if kind == ObjectKind::Texture || kind == ObjectKind::CubeTexture {
        let dev = device_ref((*tex).device);
        dev.core.textures.remove((*tex).handle);
        for slot in dev.cur_textures.iter_mut() {
            if *slot == tex {
                *slot = std::ptr::null_mut();
            }
        }
    }
    free_object(tex);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_texture(
    device: *mut FfiDevice,
    tex: *mut GsObject,
    unit: c_int,
) {
    let dev = device_ref(device);
    let unit = unit as usize;
    if unit >= dev.cur_textures.len() {
        log::warn!("texture unit {unit} out of range");
        return;
    }
    dev.cur_textures[unit] = tex;
    dev.core.state.textures[unit] = handle_of(tex);
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_map(
    tex: *mut GsObject,
    ptr: *mut *mut u8,
    linesize: *mut u32,
) -> bool {
    let Some((dev, handle)) = object(tex, ObjectKind::Texture) else {
        return false;
    };
    let Some(texture) = dev.core.textures.get_mut(handle) else {
        return false;
    };
    match texture.map() {
        Some((data, row)) => {
            *ptr = data;
            *linesize = row;
            true
        }
        None => false,
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_unmap(tex: *mut GsObject) {
    if let Some((dev, handle)) = object(tex, ObjectKind::Texture) {
        if let Some(texture) = dev.core.textures.get_mut(handle) {
            texture.unmap();
        }
    }
}

unsafe fn with_texture<R: Default>(
    tex: *mut GsObject,
    f: impl FnOnce(&gs_metal::Texture) -> R,
) -> R {
    if tex.is_null() {
        return R::default();
    }
    let kind = (*tex).kind;
    if kind != ObjectKind::Texture && kind != ObjectKind::CubeTexture {
        return R::default();
    }
    let dev = device_ref((*tex).device);
    dev.core.textures.get((*tex).handle).map(f).unwrap_or_default()
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_get_width(tex: *mut GsObject) -> u32 {
    with_texture(tex, |t| t.width)
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_get_height(tex: *mut GsObject) -> u32 {
    with_texture(tex, |t| t.height)
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_get_color_format(tex: *mut GsObject) -> c_int {
    with_texture(tex, |t| color_format_to(t.format))
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_get_obj(tex: *mut GsObject) -> *mut c_void {
    with_texture(tex, |t| Some(t.raw_handle())).unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn device_get_texture_type(tex: *mut GsObject) -> c_int {
    // GS_TEXTURE_2D / GS_TEXTURE_3D / GS_TEXTURE_CUBE
    if tex.is_null() {
        return 0;
    }
    match (*tex).kind {
        ObjectKind::CubeTexture => 2,
        _ => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_copy_texture(
    device: *mut FfiDevice,
    dst: *mut GsObject,
    src: *mut GsObject,
) {
    let dev = device_ref(device);
    if let (Some(dst), Some(src)) = (handle_of(dst), handle_of(src)) {
        dev.core.copy_texture(dst, src);
    }
}

#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn device_copy_texture_region(
    device: *mut FfiDevice,
    dst: *mut GsObject,
    dst_x: u32,
    dst_y: u32,
    src: *mut GsObject,
    src_x: u32,
    src_y: u32,
    src_w: u32,
    src_h: u32,
) {
    let dev = device_ref(device);
    if let (Some(dst), Some(src)) = (handle_of(dst), handle_of(src)) {
        dev.core
            .copy_texture_region(dst, dst_x, dst_y, src, src_x, src_y, src_w, src_h);
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_stage_texture(
    device: *mut FfiDevice,
    dst: *mut GsObject,
    src: *mut GsObject,
) {
    let dev = device_ref(device);
    if let (Some(dst), Some(src)) = (handle_of(dst), handle_of(src)) {
        dev.core.stage_texture(dst, src);
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_texture_create_from_iosurface(
    device: *mut FfiDevice,
    iosurf: *mut c_void,
) -> *mut GsObject {
    let dev = device_ref(device);
    match dev.core.create_texture_from_iosurface(iosurf) {
        Some(handle) => new_object(device, ObjectKind::Texture, handle),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_texture_rebind_iosurface(
    tex: *mut GsObject,
    iosurf: *mut c_void,
) -> bool {
    match object(tex, ObjectKind::Texture) {
        Some((dev, handle)) => dev.core.rebind_iosurface(handle, iosurf),
        None => false,
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_texture_open_shared(
    device: *mut FfiDevice,
    handle: u32,
) -> *mut GsObject {
    let surface = IOSurfaceLookup(handle);
    if surface.is_null() {
        log::error!("IOSurfaceLookup({handle}) failed");
        return std::ptr::null_mut();
    }
    device_texture_create_from_iosurface(device, surface)
}

// ---- cube textures -----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_cubetexture_create(
    device: *mut FfiDevice,
    size: u32,
    color_format: c_int,
    levels: u32,
    data: *const *const u8,
    flags: u32,
) -> *mut GsObject {
    let dev = device_ref(device);
    let format = color_format_from(color_format);
    let chunks = level_data(data, 6, size, size, format, levels);
    match dev.core.create_texture(
        gs_metal::TextureKind::Cube,
        size,
        size,
        format,
        levels,
        &chunks,
        texture_flags_from(flags),
    ) {
        Some(handle) => new_object(device, ObjectKind::CubeTexture, handle),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_cubetexture_destroy(cubetex: *mut GsObject) {
    gs_texture_destroy(cubetex);
}

#[no_mangle]
pub unsafe extern "C" fn gs_cubetexture_get_size(cubetex: *mut GsObject) -> u32 {
    with_texture(cubetex, |t| t.width)
}

#[no_mangle]
pub unsafe extern "C" fn gs_cubetexture_get_color_format(cubetex: *mut GsObject) -> c_int {
    with_texture(cubetex, |t| color_format_to(t.format))
}

// ---- volume textures (unsupported) ------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_voltexture_create(
    _device: *mut FfiDevice,
    _width: u32,
    _height: u32,
    _depth: u32,
    _color_format: c_int,
    _levels: u32,
    _data: *const *const u8,
    _flags: u32,
) -> *mut GsObject {
    std::ptr::null_mut()
}

#[no_mangle]
pub unsafe extern "C" fn gs_voltexture_destroy(_voltex: *mut GsObject) {}

#[no_mangle]
pub unsafe extern "C" fn gs_voltexture_get_width(_voltex: *mut GsObject) -> u32 {
    0
}

#[no_mangle]
pub unsafe extern "C" fn gs_voltexture_get_height(_voltex: *mut GsObject) -> u32 {
    0
}

#[no_mangle]
pub unsafe extern "C" fn gs_voltexture_get_depth(_voltex: *mut GsObject) -> u32 {
    0
}

#[no_mangle]
pub unsafe extern "C" fn gs_voltexture_get_color_format(_voltex: *mut GsObject) -> c_int {
    0
}

// ---- depth/stencil -----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_zstencil_create(
    device: *mut FfiDevice,
    width: u32,
    height: u32,
    format: c_int,
) -> *mut GsObject {
    let dev = device_ref(device);
    match dev
        .core
        .create_zstencil(width, height, zstencil_format_from(format))
    {
        Some(handle) => new_object(device, ObjectKind::ZStencil, handle),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_zstencil_destroy(zstencil: *mut GsObject) {
    if let Some((dev, handle)) = object(zstencil, ObjectKind::ZStencil) {
        dev.core.zstencils.remove(handle);
        if dev.cur_zstencil == zstencil {
            dev.cur_zstencil = std::ptr::null_mut();
            dev.core.state.zstencil_target = None;
        }
    }
    free_object(zstencil);
}

// ---- stage surfaces ----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_stagesurface_create(
    device: *mut FfiDevice,
    width: u32,
    height: u32,
    color_format: c_int,
) -> *mut GsObject {
    let dev = device_ref(device);
    match dev
        .core
        .create_stage_surface(width, height, color_format_from(color_format))
    {
        Some(handle) => new_object(device, ObjectKind::StageSurface, handle),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_stagesurface_destroy(stagesurf: *mut GsObject) {
    if let Some((dev, handle)) = object(stagesurf, ObjectKind::StageSurface) {
        dev.core.stage_surfaces.remove(handle);
    }
    free_object(stagesurf);
}

#[no_mangle]
pub unsafe extern "C" fn gs_stagesurface_map(
    stagesurf: *mut GsObject,
    data: *mut *mut u8,
    linesize: *mut u32,
) -> bool {
    let Some((dev, handle)) = object(stagesurf, ObjectKind::StageSurface) else {
        return false;
    };
    let Some(surface) = dev.core.stage_surfaces.get_mut(handle) else {
        return false;
    };
    match surface.map() {
        Some((ptr, row)) => {
            *data = ptr;
            *linesize = row;
            true
        }
        None => false,
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_stagesurface_unmap(stagesurf: *mut GsObject) {
    if let Some((dev, handle)) = object(stagesurf, ObjectKind::StageSurface) {
        if let Some(surface) = dev.core.stage_surfaces.get_mut(handle) {
            surface.unmap();
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_stagesurface_get_width(stagesurf: *mut GsObject) -> u32 {
    match object(stagesurf, ObjectKind::StageSurface) {
        Some((dev, handle)) => dev.core.stage_surfaces.get(handle).map_or(0, |s| s.width),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_stagesurface_get_height(stagesurf: *mut GsObject) -> u32 {
    match object(stagesurf, ObjectKind::StageSurface) {
        Some((dev, handle)) => dev.core.stage_surfaces.get(handle).map_or(0, |s| s.height),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_stagesurface_get_color_format(stagesurf: *mut GsObject) -> c_int {
    match object(stagesurf, ObjectKind::StageSurface) {
        Some((dev, handle)) => dev
            .core
            .stage_surfaces
            .get(handle)
            .map_or(0, |s| color_format_to(s.format)),
        None => 0,
    }
}

// ---- sampler states ----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_samplerstate_create(
    device: *mut FfiDevice,
    info: *const parse::gs_sampler_info,
) -> *mut GsObject {
    let dev = device_ref(device);
    let info = if info.is_null() {
        Default::default()
    } else {
        sampler_info_from(&*info)
    };
    let handle = dev.core.create_sampler(info);
    new_object(device, ObjectKind::Sampler, handle)
}

#[no_mangle]
pub unsafe extern "C" fn gs_samplerstate_destroy(samplerstate: *mut GsObject) {
    if let Some((dev, handle)) = object(samplerstate, ObjectKind::Sampler) {
        dev.core.samplers.remove(handle);
    }
    free_object(samplerstate);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_samplerstate(
    device: *mut FfiDevice,
    samplerstate: *mut GsObject,
    unit: c_int,
) {
    let dev = device_ref(device);
    let unit = unit as usize;
    if unit >= dev.cur_samplers.len() {
        log::warn!("sampler unit {unit} out of range");
        return;
    }
    dev.cur_samplers[unit] = samplerstate;
    dev.core.state.samplers[unit] = handle_of(samplerstate);
}
