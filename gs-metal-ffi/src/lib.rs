/*!
C ABI surface of the gs Metal backend.

Every handle returned to the host is an opaque pointer to a stable-address
[`GsObject`]: device identity, resource kind, and the small-integer handle
the backend's tables use. The host never dereferences them; they simply
round-trip. Invalid handles are soft failures that log and return a
sentinel, matching the host's value-returning error model.
*/

#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

use glam::Mat4;
use rustc_hash::FxHashMap;

use gs_metal::{
    BlendFactor, BlendOp, ClearFlags, ColorFormat, CullMode, DepthTest, Device, DrawMode, Handle,
    IndexType, Rect, StencilOp, StencilSide, ZStencilFormat, MAX_TEXTURE_SLOTS,
};

mod parse;
mod resource;
mod shader;

pub use parse::*;
pub use resource::*;
pub use shader::*;

/// Collaborators living in the host process.
extern "C" {
    /// Current world transform of the host's matrix stack.
    fn gs_matrix_get(dst: *mut matrix4);
    /// Active effect, if a technique pass is being rendered.
    fn gs_get_effect() -> *mut c_void;
    /// Ask the effect system to push its pending parameter values.
    fn gs_effect_update_params(effect: *mut c_void);
    /// Host allocator free.
    fn bfree(ptr: *mut c_void);
}

// ---- C-side value types ------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct vec2 {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct matrix4 {
    pub x: vec4,
    pub y: vec4,
    pub z: vec4,
    pub t: vec4,
}

impl matrix4 {
    fn rows(&self) -> [[f32; 4]; 4] {
        [
            [self.x.x, self.x.y, self.x.z, self.x.w],
            [self.y.x, self.y.y, self.y.z, self.y.w],
            [self.z.x, self.z.y, self.z.z, self.z.w],
            [self.t.x, self.t.y, self.t.z, self.t.w],
        ]
    }

    /// The host's matrices are row-vector convention; loading its rows as
    /// columns yields the column-vector equivalent.
    fn to_mat4(self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.rows())
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct gs_rect {
    pub x: c_int,
    pub y: c_int,
    pub cx: c_int,
    pub cy: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct gs_window {
    pub view: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct gs_init_data {
    pub window: gs_window,
    pub cx: u32,
    pub cy: u32,
    pub num_backbuffers: u32,
    pub format: c_int,
    pub zsformat: c_int,
    pub adapter: u32,
}

// ---- opaque handle encoding -------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    VertexBuffer,
    IndexBuffer,
    Texture,
    CubeTexture,
    ZStencil,
    StageSurface,
    Sampler,
    VertexShader,
    PixelShader,
    SwapChain,
}

/// The stable-address wrapper behind every resource pointer the host
/// holds. Owned by this crate; freed on the matching destroy call.
pub struct GsObject {
    pub device: *mut FfiDevice,
    pub kind: ObjectKind,
    pub handle: Handle,
    /// Host-side source struct retained for `get_data` style accessors
    /// and dynamic re-flushes; owned by this object once created.
    pub host_data: *mut c_void,
}

/// A shader parameter pointer: shader handle plus parameter index. The
/// name is cached NUL-terminated so `get_param_info` can hand out a
/// stable pointer.
pub struct SParam {
    pub device: *mut FfiDevice,
    pub shader: Handle,
    pub index: usize,
    pub name: std::ffi::CString,
}

/// The device the host sees, wrapping the backend device plus the host
/// pointers needed to answer getters with the exact values it passed in.
pub struct FfiDevice {
    pub core: Device,
    pub cur_render_target: *mut GsObject,
    pub cur_zstencil: *mut GsObject,
    pub cur_vertex_buffer: *mut GsObject,
    pub cur_index_buffer: *mut GsObject,
    pub cur_vertex_shader: *mut GsObject,
    pub cur_pixel_shader: *mut GsObject,
    pub cur_swap_chain: *mut GsObject,
    pub cur_textures: [*mut GsObject; MAX_TEXTURE_SLOTS],
    pub cur_samplers: [*mut GsObject; MAX_TEXTURE_SLOTS],
    /// Parameter objects per shader handle, freed with the shader.
    pub shader_params: FxHashMap<u32, Vec<*mut SParam>>,
}

pub(crate) unsafe fn device_ref<'a>(device: *mut FfiDevice) -> &'a mut FfiDevice {
    &mut *device
}

/// Resolve an object pointer against a kind, logging on mismatch.
pub(crate) unsafe fn object<'a>(
    ptr: *mut GsObject,
    kind: ObjectKind,
) -> Option<(&'a mut FfiDevice, Handle)> {
    if ptr.is_null() {
        return None;
    }
    let obj = &*ptr;
    if obj.kind != kind {
        log::error!("object of kind {:?} used as {:?}", obj.kind, kind);
        return None;
    }
    Some((&mut *obj.device, obj.handle))
}

pub(crate) fn new_object(device: *mut FfiDevice, kind: ObjectKind, handle: Handle) -> *mut GsObject {
    new_object_with_data(device, kind, handle, std::ptr::null_mut())
}

pub(crate) fn new_object_with_data(
    device: *mut FfiDevice,
    kind: ObjectKind,
    handle: Handle,
    host_data: *mut c_void,
) -> *mut GsObject {
    Box::into_raw(Box::new(GsObject {
        device,
        kind,
        handle,
        host_data,
    }))
}

pub(crate) unsafe fn free_object(ptr: *mut GsObject) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

pub(crate) unsafe fn handle_of(ptr: *mut GsObject) -> Option<Handle> {
    if ptr.is_null() {
        None
    } else {
        Some((*ptr).handle)
    }
}

pub(crate) unsafe fn host_free(ptr: *mut c_void) {
    if !ptr.is_null() {
        bfree(ptr);
    }
}

// ---- enum conversion ---------------------------------------------------

pub(crate) fn color_format_from(value: c_int) -> ColorFormat {
    match value {
        1 => ColorFormat::A8,
        2 => ColorFormat::R8,
        3 => ColorFormat::Rgba,
        4 => ColorFormat::Bgrx,
        5 => ColorFormat::Bgra,
        6 => ColorFormat::R10G10B10A2,
        7 => ColorFormat::Rgba16,
        8 => ColorFormat::R16,
        9 => ColorFormat::Rgba16F,
        10 => ColorFormat::Rgba32F,
        11 => ColorFormat::Rg16F,
        12 => ColorFormat::Rg32F,
        13 => ColorFormat::R16F,
        14 => ColorFormat::R32F,
        15 => ColorFormat::Dxt1,
        16 => ColorFormat::Dxt3,
        17 => ColorFormat::Dxt5,
        18 => ColorFormat::R8G8,
        _ => ColorFormat::Unknown,
    }
}

pub(crate) fn color_format_to(format: ColorFormat) -> c_int {
    match format {
        ColorFormat::Unknown => 0,
        ColorFormat::A8 => 1,
        ColorFormat::R8 => 2,
        ColorFormat::Rgba => 3,
        ColorFormat::Bgrx => 4,
        ColorFormat::Bgra => 5,
        ColorFormat::R10G10B10A2 => 6,
        ColorFormat::Rgba16 => 7,
        ColorFormat::R16 => 8,
        ColorFormat::Rgba16F => 9,
        ColorFormat::Rgba32F => 10,
        ColorFormat::Rg16F => 11,
        ColorFormat::Rg32F => 12,
        ColorFormat::R16F => 13,
        ColorFormat::R32F => 14,
        ColorFormat::Dxt1 => 15,
        ColorFormat::Dxt3 => 16,
        ColorFormat::Dxt5 => 17,
        ColorFormat::R8G8 => 18,
    }
}

pub(crate) fn zstencil_format_from(value: c_int) -> ZStencilFormat {
    match value {
        1 => ZStencilFormat::Z16,
        2 => ZStencilFormat::Z24S8,
        3 => ZStencilFormat::Z32F,
        4 => ZStencilFormat::Z32FS8X24,
        _ => ZStencilFormat::None,
    }
}

fn blend_factor_from(value: c_int) -> BlendFactor {
    match value {
        0 => BlendFactor::Zero,
        1 => BlendFactor::One,
        2 => BlendFactor::SrcColor,
        3 => BlendFactor::InvSrcColor,
        4 => BlendFactor::SrcAlpha,
        5 => BlendFactor::InvSrcAlpha,
        6 => BlendFactor::DstColor,
        7 => BlendFactor::InvDstColor,
        8 => BlendFactor::DstAlpha,
        9 => BlendFactor::InvDstAlpha,
        _ => BlendFactor::SrcAlphaSat,
    }
}

fn blend_op_from(value: c_int) -> BlendOp {
    match value {
        1 => BlendOp::Subtract,
        2 => BlendOp::ReverseSubtract,
        3 => BlendOp::Min,
        4 => BlendOp::Max,
        _ => BlendOp::Add,
    }
}

fn depth_test_from(value: c_int) -> DepthTest {
    match value {
        0 => DepthTest::Never,
        1 => DepthTest::Less,
        2 => DepthTest::LessEqual,
        3 => DepthTest::Equal,
        4 => DepthTest::GreaterEqual,
        5 => DepthTest::Greater,
        6 => DepthTest::NotEqual,
        _ => DepthTest::Always,
    }
}

fn stencil_side_from(value: c_int) -> StencilSide {
    match value {
        1 => StencilSide::Front,
        2 => StencilSide::Back,
        _ => StencilSide::Both,
    }
}

fn stencil_op_from(value: c_int) -> StencilOp {
    match value {
        1 => StencilOp::Zero,
        2 => StencilOp::Replace,
        3 => StencilOp::Incr,
        4 => StencilOp::Decr,
        5 => StencilOp::Invert,
        _ => StencilOp::Keep,
    }
}

fn cull_mode_from(value: c_int) -> CullMode {
    match value {
        0 => CullMode::Back,
        1 => CullMode::Front,
        _ => CullMode::Off,
    }
}

fn cull_mode_to(mode: CullMode) -> c_int {
    match mode {
        CullMode::Back => 0,
        CullMode::Front => 1,
        CullMode::Off => 2,
    }
}

fn draw_mode_from(value: c_int) -> DrawMode {
    match value {
        0 => DrawMode::Points,
        1 => DrawMode::Lines,
        2 => DrawMode::LineStrip,
        4 => DrawMode::TriStrip,
        _ => DrawMode::Tris,
    }
}

pub(crate) fn index_type_from(value: c_int) -> IndexType {
    // Unsigned-short is the 16-bit type, unsigned-long the 32-bit one.
    match value {
        0 => IndexType::U16,
        _ => IndexType::U32,
    }
}

pub(crate) fn index_type_to(ty: IndexType) -> c_int {
    match ty {
        IndexType::U16 => 0,
        IndexType::U32 => 1,
    }
}

// ---- lifecycle ---------------------------------------------------------

pub const GS_SUCCESS: c_int = 0;
pub const GS_ERROR_FAIL: c_int = -1;

#[no_mangle]
pub unsafe extern "C" fn device_create(out: *mut *mut FfiDevice, _adapter: u32) -> c_int {
    match Device::new() {
        Ok(core) => {
            let device = Box::new(FfiDevice {
                core,
                cur_render_target: std::ptr::null_mut(),
                cur_zstencil: std::ptr::null_mut(),
                cur_vertex_buffer: std::ptr::null_mut(),
                cur_index_buffer: std::ptr::null_mut(),
                cur_vertex_shader: std::ptr::null_mut(),
                cur_pixel_shader: std::ptr::null_mut(),
                cur_swap_chain: std::ptr::null_mut(),
                cur_textures: [std::ptr::null_mut(); MAX_TEXTURE_SLOTS],
                cur_samplers: [std::ptr::null_mut(); MAX_TEXTURE_SLOTS],
                shader_params: FxHashMap::default(),
            });
            *out = Box::into_raw(device);
            GS_SUCCESS
        }
        Err(err) => {
            log::error!("device creation failed: {err}");
            GS_ERROR_FAIL
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_destroy(device: *mut FfiDevice) {
    if device.is_null() {
        return;
    }
    let mut boxed = Box::from_raw(device);
    boxed.core.flush();
    for params in boxed.shader_params.values() {
        for &param in params {
            drop(Box::from_raw(param));
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_get_name(_device: *mut FfiDevice) -> *const c_char {
    b"Metal\0".as_ptr() as *const c_char
}

#[no_mangle]
pub unsafe extern "C" fn device_get_type(_device: *mut FfiDevice) -> c_int {
    // GS_DEVICE_METAL
    2
}

#[no_mangle]
pub unsafe extern "C" fn device_preprocessor_name() -> *const c_char {
    b"_Metal\0".as_ptr() as *const c_char
}

#[no_mangle]
pub unsafe extern "C" fn device_enter_context(_device: *mut FfiDevice) {}

#[no_mangle]
pub unsafe extern "C" fn device_leave_context(_device: *mut FfiDevice) {}

// ---- scene -------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_begin_frame(_device: *mut FfiDevice) {}

#[no_mangle]
pub unsafe extern "C" fn device_begin_scene(device: *mut FfiDevice) {
    device_ref(device).core.begin_scene();
}

#[no_mangle]
pub unsafe extern "C" fn device_end_scene(device: *mut FfiDevice) {
    device_ref(device).core.end_scene();
}

#[no_mangle]
pub unsafe extern "C" fn device_draw(
    device: *mut FfiDevice,
    draw_mode: c_int,
    start_vert: u32,
    num_verts: u32,
) {
    let device = device_ref(device);

    // Let the effect system push pending parameter values, then pick up
    // the host's current world transform.
    let effect = gs_get_effect();
    if !effect.is_null() {
        gs_effect_update_params(effect);
    }
    let mut world = matrix4::default();
    gs_matrix_get(&mut world);
    device.core.set_world_matrix(world.to_mat4());

    device
        .core
        .draw(draw_mode_from(draw_mode), start_vert, num_verts);
}

#[no_mangle]
pub unsafe extern "C" fn device_clear(
    device: *mut FfiDevice,
    clear_flags: u32,
    color: *const vec4,
    depth: f32,
    stencil: u8,
) {
    let flags = ClearFlags::from_bits_truncate(clear_flags);
    let color = if color.is_null() {
        [0.0; 4]
    } else {
        let c = &*color;
        [c.x, c.y, c.z, c.w]
    };
    device_ref(device).core.clear(flags, color, depth, stencil);
}

#[no_mangle]
pub unsafe extern "C" fn device_present(device: *mut FfiDevice) {
    device_ref(device).core.present();
}

#[no_mangle]
pub unsafe extern "C" fn device_flush(device: *mut FfiDevice) {
    device_ref(device).core.flush();
}

#[no_mangle]
pub unsafe extern "C" fn device_is_present_ready(device: *mut FfiDevice) -> bool {
    device_ref(device).core.is_present_ready()
}

// ---- render targets ----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_set_render_target(
    device: *mut FfiDevice,
    tex: *mut GsObject,
    zstencil: *mut GsObject,
) {
    let dev = device_ref(device);
    dev.cur_render_target = tex;
    dev.cur_zstencil = zstencil;
    let tex_handle = handle_of(tex);
    let zs_handle = handle_of(zstencil);
    dev.core.set_render_target(tex_handle, zs_handle);
}

#[no_mangle]
pub unsafe extern "C" fn device_set_render_target_with_color_space(
    device: *mut FfiDevice,
    tex: *mut GsObject,
    zstencil: *mut GsObject,
    _space: c_int,
) {
    device_set_render_target(device, tex, zstencil);
}

#[no_mangle]
pub unsafe extern "C" fn device_get_render_target(device: *mut FfiDevice) -> *mut GsObject {
    device_ref(device).cur_render_target
}

#[no_mangle]
pub unsafe extern "C" fn device_get_zstencil_target(device: *mut FfiDevice) -> *mut GsObject {
    device_ref(device).cur_zstencil
}

#[no_mangle]
pub unsafe extern "C" fn device_set_cube_render_target(
    _device: *mut FfiDevice,
    _cubetex: *mut GsObject,
    _side: c_int,
    _zstencil: *mut GsObject,
) {
    log::warn!("cube render targets are not supported");
}

#[no_mangle]
pub unsafe extern "C" fn device_enable_framebuffer_srgb(_device: *mut FfiDevice, _enable: bool) {}

#[no_mangle]
pub unsafe extern "C" fn device_framebuffer_srgb_enabled(_device: *mut FfiDevice) -> bool {
    false
}

// ---- pipeline state ----------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_enable_blending(device: *mut FfiDevice, enable: bool) {
    device_ref(device).core.state.blend.enabled = enable;
}

#[no_mangle]
pub unsafe extern "C" fn device_blend_function(device: *mut FfiDevice, src: c_int, dest: c_int) {
    let blend = &mut device_ref(device).core.state.blend;
    blend.src_color = blend_factor_from(src);
    blend.src_alpha = blend.src_color;
    blend.dst_color = blend_factor_from(dest);
    blend.dst_alpha = blend.dst_color;
}

#[no_mangle]
pub unsafe extern "C" fn device_blend_function_separate(
    device: *mut FfiDevice,
    src_c: c_int,
    dest_c: c_int,
    src_a: c_int,
    dest_a: c_int,
) {
    let blend = &mut device_ref(device).core.state.blend;
    blend.src_color = blend_factor_from(src_c);
    blend.dst_color = blend_factor_from(dest_c);
    blend.src_alpha = blend_factor_from(src_a);
    blend.dst_alpha = blend_factor_from(dest_a);
}

#[no_mangle]
pub unsafe extern "C" fn device_blend_op(device: *mut FfiDevice, op: c_int) {
    device_ref(device).core.state.blend.op = blend_op_from(op);
}

#[no_mangle]
pub unsafe extern "C" fn device_enable_color(
    device: *mut FfiDevice,
    red: bool,
    green: bool,
    blue: bool,
    alpha: bool,
) {
    use gs_metal::ColorWrite;
    let mut mask = ColorWrite::empty();
    mask.set(ColorWrite::RED, red);
    mask.set(ColorWrite::GREEN, green);
    mask.set(ColorWrite::BLUE, blue);
    mask.set(ColorWrite::ALPHA, alpha);
    device_ref(device).core.state.color_write_mask = mask;
}

#[no_mangle]
pub unsafe extern "C" fn device_enable_depth_test(device: *mut FfiDevice, enable: bool) {
    device_ref(device).core.state.depth.test_enabled = enable;
}

#[no_mangle]
pub unsafe extern "C" fn device_enable_depth_write(device: *mut FfiDevice, enable: bool) {
    device_ref(device).core.state.depth.write_enabled = enable;
}

#[no_mangle]
pub unsafe extern "C" fn device_depth_function(device: *mut FfiDevice, test: c_int) {
    device_ref(device).core.state.depth.function = depth_test_from(test);
}

#[no_mangle]
pub unsafe extern "C" fn device_enable_stencil_test(device: *mut FfiDevice, enable: bool) {
    device_ref(device).core.state.stencil.test_enabled = enable;
}

#[no_mangle]
pub unsafe extern "C" fn device_enable_stencil_write(device: *mut FfiDevice, enable: bool) {
    device_ref(device).core.state.stencil.write_enabled = enable;
}

#[no_mangle]
pub unsafe extern "C" fn device_stencil_function(
    device: *mut FfiDevice,
    side: c_int,
    test: c_int,
) {
    device_ref(device)
        .core
        .set_stencil_function(stencil_side_from(side), depth_test_from(test));
}

#[no_mangle]
pub unsafe extern "C" fn device_stencil_op(
    device: *mut FfiDevice,
    side: c_int,
    fail: c_int,
    zfail: c_int,
    zpass: c_int,
) {
    device_ref(device).core.set_stencil_op(
        stencil_side_from(side),
        stencil_op_from(fail),
        stencil_op_from(zfail),
        stencil_op_from(zpass),
    );
}

#[no_mangle]
pub unsafe extern "C" fn device_set_cull_mode(device: *mut FfiDevice, mode: c_int) {
    device_ref(device).core.state.cull_mode = cull_mode_from(mode);
}

#[no_mangle]
pub unsafe extern "C" fn device_get_cull_mode(device: *mut FfiDevice) -> c_int {
    cull_mode_to(device_ref(device).core.state.cull_mode)
}

#[no_mangle]
pub unsafe extern "C" fn device_set_viewport(
    device: *mut FfiDevice,
    x: c_int,
    y: c_int,
    width: c_int,
    height: c_int,
) {
    device_ref(device).core.state.viewport = Rect::new(x, y, width, height);
}

#[no_mangle]
pub unsafe extern "C" fn device_get_viewport(device: *mut FfiDevice, rect: *mut gs_rect) {
    let vp = device_ref(device).core.state.viewport;
    *rect = gs_rect {
        x: vp.x,
        y: vp.y,
        cx: vp.width,
        cy: vp.height,
    };
}

#[no_mangle]
pub unsafe extern "C" fn device_set_scissor_rect(device: *mut FfiDevice, rect: *const gs_rect) {
    let state = &mut device_ref(device).core.state;
    if rect.is_null() {
        state.scissor_enabled = false;
    } else {
        let rect = &*rect;
        state.scissor_enabled = true;
        state.scissor = Rect::new(rect.x, rect.y, rect.cx, rect.cy);
    }
}

// ---- projection --------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_ortho(
    device: *mut FfiDevice,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    near: f32,
    far: f32,
) {
    device_ref(device)
        .core
        .state
        .set_ortho(left, right, top, bottom, near, far);
}

#[no_mangle]
pub unsafe extern "C" fn device_frustum(
    device: *mut FfiDevice,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    near: f32,
    far: f32,
) {
    device_ref(device)
        .core
        .state
        .set_frustum(left, right, top, bottom, near, far);
}

#[no_mangle]
pub unsafe extern "C" fn device_projection_push(device: *mut FfiDevice) {
    device_ref(device).core.state.push_projection();
}

#[no_mangle]
pub unsafe extern "C" fn device_projection_pop(device: *mut FfiDevice) {
    device_ref(device).core.state.pop_projection();
}

// ---- swap chains -------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_swapchain_create(
    device: *mut FfiDevice,
    data: *const gs_init_data,
) -> *mut GsObject {
    let dev = device_ref(device);
    let data = &*data;
    let format = color_format_from(data.format);
    match dev.core.create_swap_chain(
        data.window.view as *mut _,
        data.cx,
        data.cy,
        format,
    ) {
        Some(handle) => new_object(device, ObjectKind::SwapChain, handle),
        None => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn gs_swapchain_destroy(swap: *mut GsObject) {
    if let Some((dev, handle)) = object(swap, ObjectKind::SwapChain) {
        dev.core.destroy_swap_chain(handle);
        if dev.cur_swap_chain == swap {
            dev.cur_swap_chain = std::ptr::null_mut();
        }
    }
    free_object(swap);
}

#[no_mangle]
pub unsafe extern "C" fn device_load_swapchain(device: *mut FfiDevice, swap: *mut GsObject) {
    let dev = device_ref(device);
    dev.cur_swap_chain = swap;
    dev.cur_render_target = std::ptr::null_mut();
    dev.cur_zstencil = std::ptr::null_mut();
    dev.core.load_swap_chain(handle_of(swap));
}

#[no_mangle]
pub unsafe extern "C" fn device_resize(device: *mut FfiDevice, cx: u32, cy: u32) {
    device_ref(device).core.resize_swap_chain(cx, cy);
}

#[no_mangle]
pub unsafe extern "C" fn device_get_size(device: *mut FfiDevice, cx: *mut u32, cy: *mut u32) {
    let (width, height) = device_ref(device).core.swap_chain_size();
    if !cx.is_null() {
        *cx = width;
    }
    if !cy.is_null() {
        *cy = height;
    }
}

#[no_mangle]
pub unsafe extern "C" fn device_get_width(device: *mut FfiDevice) -> u32 {
    device_ref(device).core.swap_chain_size().0
}

#[no_mangle]
pub unsafe extern "C" fn device_get_height(device: *mut FfiDevice) -> u32 {
    device_ref(device).core.swap_chain_size().1
}

// ---- capability probes -------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_shared_texture_available() -> bool {
    true
}

#[no_mangle]
pub unsafe extern "C" fn device_is_monitor_hdr(_device: *mut FfiDevice, _monitor: *mut c_void) -> bool {
    false
}

#[no_mangle]
pub unsafe extern "C" fn device_get_color_space(_device: *mut FfiDevice) -> c_int {
    // GS_CS_SRGB
    0
}

#[no_mangle]
pub unsafe extern "C" fn device_update_color_space(_device: *mut FfiDevice) {}

// ---- stubs -------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn device_load_default_samplerstate(
    _device: *mut FfiDevice,
    _b_3d: bool,
    _unit: c_int,
) {
}

#[no_mangle]
pub unsafe extern "C" fn device_timer_create(_device: *mut FfiDevice) -> *mut c_void {
    std::ptr::null_mut()
}

#[no_mangle]
pub unsafe extern "C" fn device_timer_range_create(_device: *mut FfiDevice) -> *mut c_void {
    std::ptr::null_mut()
}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_destroy(_timer: *mut c_void) {}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_begin(_timer: *mut c_void) {}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_end(_timer: *mut c_void) {}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_get_data(_timer: *mut c_void, _ticks: *mut u64) -> bool {
    false
}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_range_destroy(_range: *mut c_void) {}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_range_begin(_range: *mut c_void) {}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_range_end(_range: *mut c_void) {}

#[no_mangle]
pub unsafe extern "C" fn gs_timer_range_get_data(
    _range: *mut c_void,
    _disjoint: *mut bool,
    _frequency: *mut u64,
) -> bool {
    false
}

#[no_mangle]
pub unsafe extern "C" fn device_debug_marker_begin(
    _device: *mut FfiDevice,
    _marker_name: *const c_char,
    _color: *const f32,
) {
}

#[no_mangle]
pub unsafe extern "C" fn device_debug_marker_end(_device: *mut FfiDevice) {}
