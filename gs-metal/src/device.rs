//! The device: owner of every resource table, the mutable render state,
//! and the draw/clear/present/flush engine.
//!
//! One frame looks like: `begin_scene` allocates a command buffer; state
//! setters and resource loads mutate [`crate::RenderState`]; `clear` only
//! queues a record; every `draw` opens a render command encoder scoped to
//! that one primitive draw, folding queued clears into the pass's load
//! actions; `present` schedules the drawable and commits, and the
//! completion handler rotates the transient pool.

use std::sync::Arc;

use block::ConcreteBlock;
use glam::Mat4;

use gs_msl::{ParamKind, ParsedShader, ShaderKind, MAX_INLINE_UNIFORM_SIZE, UNIFORM_BUFFER_SLOT};

use crate::buffer::{IndexBuffer, IndexData, VertexBuffer, VertexData};
use crate::conv;
use crate::handle::{Handle, HandleTable};
use crate::pipeline::{PipelineCache, PipelineKey};
use crate::pool::BufferPool;
use crate::sampler::SamplerState;
use crate::shader::{Shader, ShaderError};
use crate::state::{PendingClear, RenderState};
use crate::surface::SwapChain;
use crate::texture::{IoSurfaceRef, StageSurface, Texture, TextureKind, ZStencilBuffer};
use crate::{
    ClearFlags, ColorFormat, DrawMode, Rect, StencilSide, TextureFlags, ZStencilFormat,
};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no Metal device available")]
    NoDevice,
}

pub struct Device {
    raw: mtl::Device,
    queue: mtl::CommandQueue,
    pool: Arc<BufferPool>,
    cmd_buffer: Option<mtl::CommandBuffer>,

    pub vertex_buffers: HandleTable<VertexBuffer>,
    pub index_buffers: HandleTable<IndexBuffer>,
    pub textures: HandleTable<Texture>,
    pub zstencils: HandleTable<ZStencilBuffer>,
    pub stage_surfaces: HandleTable<StageSurface>,
    pub samplers: HandleTable<SamplerState>,
    pub shaders: HandleTable<Shader>,
    pub swap_chains: HandleTable<SwapChain>,

    pub pipelines: PipelineCache,
    pub state: RenderState,
}

impl Device {
    #[allow(clippy::arc_with_non_send_sync)]
    pub fn new() -> Result<Device, DeviceError> {
        let raw = mtl::Device::system_default().ok_or(DeviceError::NoDevice)?;
        log::info!("Metal device: {}", raw.name());
        let queue = raw.new_command_queue();
        Ok(Device {
            raw,
            queue,
            pool: Arc::new(BufferPool::new()),
            cmd_buffer: None,
            vertex_buffers: HandleTable::new("vertex buffer"),
            index_buffers: HandleTable::new("index buffer"),
            textures: HandleTable::new("texture"),
            zstencils: HandleTable::new("zstencil"),
            stage_surfaces: HandleTable::new("stage surface"),
            samplers: HandleTable::new("sampler"),
            shaders: HandleTable::new("shader"),
            swap_chains: HandleTable::new("swap chain"),
            pipelines: PipelineCache::new(),
            state: RenderState::new(),
        })
    }

    pub fn name(&self) -> String {
        self.raw.name().to_string()
    }

    pub fn metal_device(&self) -> &mtl::Device {
        &self.raw
    }

    // ---- scene control ------------------------------------------------

    pub fn begin_scene(&mut self) {
        let raw = objc::rc::autoreleasepool(|| self.queue.new_command_buffer().to_owned());
        self.cmd_buffer = Some(raw);
    }

    pub fn end_scene(&mut self) {
        // Scene state intentionally carries over; only the command buffer
        // is scoped to the scene.
    }

    /// The current command buffer, or a fresh one for hosts that issue
    /// uploads before the first `begin_scene`.
    fn ensure_cmd_buffer(&mut self) -> mtl::CommandBuffer {
        if self.cmd_buffer.is_none() {
            self.begin_scene();
        }
        self.cmd_buffer.clone().unwrap()
    }

    // ---- resources ----------------------------------------------------

    pub fn create_vertex_buffer(&mut self, data: VertexData, dynamic: bool) -> Handle {
        let vb = VertexBuffer::new(&self.raw, data, dynamic);
        self.vertex_buffers.insert(vb)
    }

    pub fn flush_vertex_buffer(&mut self, handle: Handle, data: Option<VertexData>) {
        let Some(vb) = self.vertex_buffers.get_mut(handle) else {
            log::warn!("vertex buffer flush on a dead handle");
            return;
        };
        vb.flush(&self.raw, &self.pool, data);
    }

    pub fn create_index_buffer(&mut self, data: IndexData, dynamic: bool) -> Handle {
        let ib = IndexBuffer::new(&self.raw, data, dynamic);
        self.index_buffers.insert(ib)
    }

    pub fn flush_index_buffer(&mut self, handle: Handle, data: Option<IndexData>) {
        let Some(ib) = self.index_buffers.get_mut(handle) else {
            log::warn!("index buffer flush on a dead handle");
            return;
        };
        ib.flush(&self.raw, &self.pool, data);
    }

    pub fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
        format: ColorFormat,
        levels: u32,
        data: &[&[u8]],
        flags: TextureFlags,
    ) -> Option<Handle> {
        let texture = Texture::new(&self.raw, kind, width, height, format, levels, data, flags)?;
        let build_mips = flags.contains(TextureFlags::BUILD_MIPMAPS) && !data.is_empty();
        let handle = self.textures.insert(texture);
        if build_mips {
            self.generate_mipmaps(handle);
        }
        Some(handle)
    }

    pub fn create_texture_from_iosurface(&mut self, surface: IoSurfaceRef) -> Option<Handle> {
        let texture = Texture::from_iosurface(&self.raw, surface)?;
        Some(self.textures.insert(texture))
    }

    pub fn rebind_iosurface(&mut self, handle: Handle, surface: IoSurfaceRef) -> bool {
        let raw = self.raw.clone();
        match self.textures.get_mut(handle) {
            Some(texture) => texture.rebind_iosurface(&raw, surface),
            None => false,
        }
    }

    fn generate_mipmaps(&mut self, handle: Handle) {
        let cmd = self.ensure_cmd_buffer();
        let Some(texture) = self.textures.get(handle) else {
            return;
        };
        objc::rc::autoreleasepool(|| {
            let blit = cmd.new_blit_command_encoder();
            blit.generate_mipmaps(texture.raw());
            blit.end_encoding();
        });
    }

    pub fn create_zstencil(
        &mut self,
        width: u32,
        height: u32,
        format: ZStencilFormat,
    ) -> Option<Handle> {
        let zs = ZStencilBuffer::new(&self.raw, width, height, format)?;
        Some(self.zstencils.insert(zs))
    }

    pub fn create_stage_surface(
        &mut self,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Option<Handle> {
        let surface = StageSurface::new(&self.raw, width, height, format)?;
        Some(self.stage_surfaces.insert(surface))
    }

    pub fn create_sampler(&mut self, info: gs_msl::sampler::SamplerInfo) -> Handle {
        let sampler = SamplerState::new(&self.raw, info);
        self.samplers.insert(sampler)
    }

    pub fn create_shader(
        &mut self,
        kind: ShaderKind,
        parsed: &ParsedShader,
    ) -> Result<Handle, ShaderError> {
        let shader = Shader::new(&self.raw, kind, parsed)?;
        Ok(self.shaders.insert(shader))
    }

    /// Copy the full source texture into the destination.
    pub fn copy_texture(&mut self, dst: Handle, src: Handle) {
        let (width, height) = match self.textures.get(src) {
            Some(texture) => (texture.width, texture.height),
            None => {
                log::warn!("texture copy from a dead handle");
                return;
            }
        };
        self.copy_texture_region(dst, 0, 0, src, 0, 0, width, height);
    }

    /// Blit-copy a region between textures. The destination must be able
    /// to hold the region.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_texture_region(
        &mut self,
        dst: Handle,
        dst_x: u32,
        dst_y: u32,
        src: Handle,
        src_x: u32,
        src_y: u32,
        mut width: u32,
        mut height: u32,
    ) {
        let cmd = self.ensure_cmd_buffer();
        let (Some(dst_tex), Some(src_tex)) = (self.textures.get(dst), self.textures.get(src))
        else {
            log::warn!("texture copy on a dead handle");
            return;
        };
        if width == 0 {
            width = src_tex.width - src_x;
        }
        if height == 0 {
            height = src_tex.height - src_y;
        }
        assert!(
            dst_x + width <= dst_tex.width && dst_y + height <= dst_tex.height,
            "texture copy destination too small"
        );
        objc::rc::autoreleasepool(|| {
            let blit = cmd.new_blit_command_encoder();
            blit.copy_from_texture(
                src_tex.raw(),
                0,
                0,
                mtl::MTLOrigin {
                    x: src_x as u64,
                    y: src_y as u64,
                    z: 0,
                },
                mtl::MTLSize {
                    width: width as u64,
                    height: height as u64,
                    depth: 1,
                },
                dst_tex.raw(),
                0,
                0,
                mtl::MTLOrigin {
                    x: dst_x as u64,
                    y: dst_y as u64,
                    z: 0,
                },
            );
            blit.end_encoding();
        });
    }

    /// Copy a render target into a stage surface and make it visible to
    /// the CPU.
    pub fn stage_texture(&mut self, dst: Handle, src: Handle) {
        let cmd = self.ensure_cmd_buffer();
        let (Some(stage), Some(src_tex)) = (self.stage_surfaces.get(dst), self.textures.get(src))
        else {
            log::warn!("stage on a dead handle");
            return;
        };
        objc::rc::autoreleasepool(|| {
            let blit = cmd.new_blit_command_encoder();
            blit.copy_from_texture(
                src_tex.raw(),
                0,
                0,
                mtl::MTLOrigin { x: 0, y: 0, z: 0 },
                mtl::MTLSize {
                    width: src_tex.width.min(stage.width) as u64,
                    height: src_tex.height.min(stage.height) as u64,
                    depth: 1,
                },
                stage.raw(),
                0,
                0,
                mtl::MTLOrigin { x: 0, y: 0, z: 0 },
            );
            blit.synchronize_resource(stage.raw());
            blit.end_encoding();
        });
    }

    // ---- swap chains --------------------------------------------------

    /// # Safety
    ///
    /// `view` must be a valid `NSView` pointer; main thread only.
    pub unsafe fn create_swap_chain(
        &mut self,
        view: *mut objc::runtime::Object,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Option<Handle> {
        let placeholder = Texture::new(
            &self.raw,
            TextureKind::D2,
            width,
            height,
            format,
            1,
            &[],
            TextureFlags::RENDER_TARGET,
        )?;
        let texture = self.textures.insert(placeholder);
        let chain = SwapChain::new(&self.raw, view, width, height, format, texture);
        Some(self.swap_chains.insert(chain))
    }

    pub fn destroy_swap_chain(&mut self, handle: Handle) {
        if let Some(chain) = self.swap_chains.remove(handle) {
            self.textures.remove(chain.texture);
            if self.state.swap_chain == Some(handle) {
                self.state.swap_chain = None;
                self.state.render_target = None;
            }
        }
    }

    /// Make a swap chain current, acquiring its next drawable and
    /// rebinding the drawable's texture into the chain's texture slot.
    pub fn load_swap_chain(&mut self, handle: Option<Handle>) {
        self.state.swap_chain = handle;
        let Some(handle) = handle else {
            self.state.render_target = None;
            self.state.zstencil_target = None;
            return;
        };
        let Some(chain) = self.swap_chains.get_mut(handle) else {
            log::warn!("load of a dead swap chain");
            return;
        };
        if chain.drawable.is_none() {
            if let Some(raw_texture) = chain.acquire() {
                let format = chain.format;
                let slot = chain.texture;
                self.textures
                    .replace(slot, Texture::from_raw(raw_texture, format));
            }
        }
        let texture = self.swap_chains.get(handle).unwrap().texture;
        self.state.render_target = Some(texture);
        self.state.zstencil_target = None;
    }

    pub fn resize_swap_chain(&mut self, width: u32, height: u32) {
        let Some(handle) = self.state.swap_chain else {
            log::warn!("resize with no current swap chain");
            return;
        };
        if let Some(chain) = self.swap_chains.get_mut(handle) {
            chain.drawable = None;
            chain.resize(width, height);
        }
    }

    pub fn swap_chain_size(&self) -> (u32, u32) {
        self.state
            .swap_chain
            .and_then(|h| self.swap_chains.get(h))
            .map(SwapChain::size)
            .unwrap_or((0, 0))
    }

    // ---- state setters ------------------------------------------------

    pub fn set_render_target(&mut self, texture: Option<Handle>, zstencil: Option<Handle>) {
        self.state.render_target = texture;
        self.state.zstencil_target = zstencil;
    }

    pub fn set_world_matrix(&mut self, world: Mat4) {
        self.state.world = world;
    }

    pub fn set_stencil_function(&mut self, side: StencilSide, function: crate::DepthTest) {
        if matches!(side, StencilSide::Front | StencilSide::Both) {
            self.state.stencil.front.function = function;
        }
        if matches!(side, StencilSide::Back | StencilSide::Both) {
            self.state.stencil.back.function = function;
        }
    }

    pub fn set_stencil_op(
        &mut self,
        side: StencilSide,
        fail: crate::StencilOp,
        depth_fail: crate::StencilOp,
        pass: crate::StencilOp,
    ) {
        if matches!(side, StencilSide::Front | StencilSide::Both) {
            let face = &mut self.state.stencil.front;
            face.fail = fail;
            face.depth_fail = depth_fail;
            face.pass = pass;
        }
        if matches!(side, StencilSide::Back | StencilSide::Both) {
            let face = &mut self.state.stencil.back;
            face.fail = fail;
            face.depth_fail = depth_fail;
            face.pass = pass;
        }
    }

    // ---- clears and draws ---------------------------------------------

    /// Record a clear against the current render target. No GPU work
    /// happens here; the next matching draw (or the present path) turns
    /// it into a load action.
    pub fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u8) {
        self.state.enqueue_clear(PendingClear {
            target: self.state.render_target,
            flags,
            color,
            depth,
            stencil,
        });
    }

    /// Build the render pass for the current target, folding in a queued
    /// clear when it is due.
    fn build_render_pass(&mut self) -> Option<mtl::RenderPassDescriptor> {
        let target = self.state.render_target;
        let color_texture = target.and_then(|h| self.textures.get(h))?;
        let clear = self.state.take_pending_clear(target);

        let descriptor = mtl::RenderPassDescriptor::new().to_owned();
        let at = descriptor.color_attachments().object_at(0).unwrap();
        at.set_texture(Some(color_texture.raw()));
        at.set_store_action(mtl::MTLStoreAction::Store);
        match clear {
            Some(c) if c.flags.contains(ClearFlags::COLOR) => {
                at.set_clear_color(conv::map_clear_color(c.color));
                at.set_load_action(mtl::MTLLoadAction::Clear);
            }
            _ => at.set_load_action(mtl::MTLLoadAction::Load),
        }

        if let Some(zs) = self.state.zstencil_target.and_then(|h| self.zstencils.get(h)) {
            let depth_at = descriptor.depth_attachment().unwrap();
            depth_at.set_texture(Some(zs.raw()));
            depth_at.set_store_action(mtl::MTLStoreAction::Store);
            match clear {
                Some(c) if c.flags.contains(ClearFlags::DEPTH) => {
                    depth_at.set_clear_depth(c.depth as f64);
                    depth_at.set_load_action(mtl::MTLLoadAction::Clear);
                }
                _ => depth_at.set_load_action(mtl::MTLLoadAction::Load),
            }
            if conv::zstencil_has_stencil(zs.format) {
                let stencil_at = descriptor.stencil_attachment().unwrap();
                stencil_at.set_texture(Some(zs.raw()));
                stencil_at.set_store_action(mtl::MTLStoreAction::Store);
                match clear {
                    Some(c) if c.flags.contains(ClearFlags::STENCIL) => {
                        stencil_at.set_clear_stencil(c.stencil as u32);
                        stencil_at.set_load_action(mtl::MTLLoadAction::Clear);
                    }
                    _ => stencil_at.set_load_action(mtl::MTLLoadAction::Load),
                }
            }
        }
        Some(descriptor)
    }

    fn resolve_pipeline(&mut self, vs_handle: Handle, fs_handle: Handle) -> mtl::RenderPipelineState {
        let color_format = self
            .state
            .render_target
            .and_then(|h| self.textures.get(h))
            .map(Texture::raw_format);
        let (depth_format, stencil_format) = match self
            .state
            .zstencil_target
            .and_then(|h| self.zstencils.get(h))
        {
            Some(zs) => (
                Some(zs.raw_format()),
                conv::zstencil_has_stencil(zs.format).then(|| zs.raw_format()),
            ),
            None => (None, None),
        };
        let key = PipelineKey {
            color_format: color_format.map_or(0, |f| f as u64),
            depth_format: depth_format.map_or(0, |f| f as u64),
            stencil_format: stencil_format.map_or(0, |f| f as u64),
            blend: self.state.blend,
            color_write_mask: self.state.color_write_mask,
            vertex_shader: vs_handle,
            fragment_shader: fs_handle,
        };

        let raw = &self.raw;
        let shaders = &self.shaders;
        let blend = self.state.blend;
        let mask = self.state.color_write_mask;
        self.pipelines.get_or_create(key, || {
            let vs = shaders.get(vs_handle).expect("dead vertex shader handle");
            let fs = shaders.get(fs_handle).expect("dead fragment shader handle");
            let descriptor = mtl::RenderPipelineDescriptor::new();
            descriptor.set_vertex_function(Some(vs.function()));
            descriptor.set_fragment_function(Some(fs.function()));
            if let Some(vd) = vs.vertex_descriptor() {
                descriptor.set_vertex_descriptor(Some(vd));
            }

            let at = descriptor.color_attachments().object_at(0).unwrap();
            if let Some(format) = color_format {
                at.set_pixel_format(format);
            }
            at.set_blending_enabled(blend.enabled);
            at.set_source_rgb_blend_factor(conv::map_blend_factor(blend.src_color));
            at.set_destination_rgb_blend_factor(conv::map_blend_factor(blend.dst_color));
            at.set_source_alpha_blend_factor(conv::map_blend_factor(blend.src_alpha));
            at.set_destination_alpha_blend_factor(conv::map_blend_factor(blend.dst_alpha));
            at.set_rgb_blend_operation(conv::map_blend_op(blend.op));
            at.set_alpha_blend_operation(conv::map_blend_op(blend.op));
            at.set_write_mask(conv::map_write_mask(mask));

            if let Some(format) = depth_format {
                descriptor.set_depth_attachment_pixel_format(format);
            }
            if let Some(format) = stencil_format {
                descriptor.set_stencil_attachment_pixel_format(format);
            }
            raw.new_render_pipeline_state(&descriptor)
        })
    }

    fn build_depth_stencil_state(&self) -> mtl::DepthStencilState {
        let descriptor = mtl::DepthStencilDescriptor::new();
        let depth = self.state.depth;
        if depth.test_enabled {
            descriptor.set_depth_compare_function(conv::map_compare(depth.function));
        } else {
            descriptor.set_depth_compare_function(mtl::MTLCompareFunction::Always);
        }
        descriptor.set_depth_write_enabled(depth.write_enabled);

        let stencil = self.state.stencil;
        if stencil.test_enabled {
            let write_mask = if stencil.write_enabled { !0u32 } else { 0 };
            for (face, is_front) in [(stencil.front, true), (stencil.back, false)] {
                let face_desc = mtl::StencilDescriptor::new();
                face_desc.set_stencil_compare_function(conv::map_compare(face.function));
                face_desc.set_stencil_failure_operation(conv::map_stencil_op(face.fail));
                face_desc.set_depth_failure_operation(conv::map_stencil_op(face.depth_fail));
                face_desc.set_depth_stencil_pass_operation(conv::map_stencil_op(face.pass));
                face_desc.set_read_mask(!0);
                face_desc.set_write_mask(write_mask);
                if is_front {
                    descriptor.set_front_face_stencil(Some(&face_desc));
                } else {
                    descriptor.set_back_face_stencil(Some(&face_desc));
                }
            }
        }
        self.raw.new_depth_stencil_state(&descriptor)
    }

    /// Encode one primitive draw. Silently ignored when no command buffer
    /// is active; missing vertex buffer or shaders is a host bug and
    /// fatal.
    pub fn draw(&mut self, mode: DrawMode, start: u32, count: u32) {
        let Some(cmd) = self.cmd_buffer.clone() else {
            return;
        };
        let vb_handle = self.state.vertex_buffer.expect("draw without a vertex buffer");
        let vs_handle = self.state.vertex_shader.expect("draw without a vertex shader");
        let fs_handle = self
            .state
            .fragment_shader
            .expect("draw without a fragment shader");

        let pipeline = self.resolve_pipeline(vs_handle, fs_handle);
        let Some(pass) = self.build_render_pass() else {
            log::error!("draw with no render target bound");
            return;
        };

        let encoder =
            objc::rc::autoreleasepool(|| cmd.new_render_command_encoder(&pass).to_owned());
        encoder.set_render_pipeline_state(&pipeline);
        encoder.set_front_facing_winding(mtl::MTLWinding::CounterClockwise);
        encoder.set_cull_mode(conv::map_cull_mode(self.state.cull_mode));

        let vp = self.state.viewport;
        encoder.set_viewport(mtl::MTLViewport {
            originX: vp.x as f64,
            originY: vp.y as f64,
            width: vp.width as f64,
            height: vp.height as f64,
            znear: 0.0,
            zfar: 1.0,
        });
        if self.state.scissor_enabled {
            let rect = self.state.scissor;
            encoder.set_scissor_rect(mtl::MTLScissorRect {
                x: rect.x.max(0) as u64,
                y: rect.y.max(0) as u64,
                width: rect.width.max(0) as u64,
                height: rect.height.max(0) as u64,
            });
        }
        if self.state.zstencil_target.is_some() {
            let dss = self.build_depth_stencil_state();
            encoder.set_depth_stencil_state(&dss);
        }

        // The view-projection product lands in the vertex shader's
        // ViewProj uniform, transposed for the shader's row-vector
        // convention.
        let viewproj = self.state.view_projection().transpose();
        if let Some(shader) = self.shaders.get_mut(vs_handle) {
            if let Some(idx) = shader.param_by_name("ViewProj") {
                shader.params[idx].set_value(bytemuck::cast_slice(&viewproj.to_cols_array()));
            }
        }

        self.apply_shader(&encoder, vs_handle);
        self.apply_shader(&encoder, fs_handle);

        // Vertex streams, in the order the shader consumes them.
        {
            let vs = self.shaders.get(vs_handle).unwrap();
            let vb = self
                .vertex_buffers
                .get(vb_handle)
                .expect("dead vertex buffer handle at draw");
            let buffers = vb.buffers_for_shader(&vs.meta.streams);
            for (index, buffer) in buffers.iter().enumerate() {
                encoder.set_vertex_buffer(index as u64, Some(buffer), 0);
            }
        }

        // Device-level texture and sampler slots.
        for (slot, handle) in self.state.textures.iter().enumerate() {
            if let Some(texture) = handle.and_then(|h| self.textures.get(h)) {
                encoder.set_fragment_texture(slot as u64, Some(texture.raw()));
            }
        }
        for (slot, handle) in self.state.samplers.iter().enumerate() {
            if let Some(sampler) = handle.and_then(|h| self.samplers.get(h)) {
                encoder.set_fragment_sampler_state(slot as u64, Some(sampler.raw()));
            }
        }

        let index_buffer = self.state.index_buffer.and_then(|h| self.index_buffers.get(h));
        match index_buffer {
            Some(ib) => {
                let raw = ib.raw().expect("index buffer never flushed");
                let count = if count == 0 {
                    ib.num_indices() as u64
                } else {
                    count as u64
                };
                let offset = start as u64 * ib.index_type.size() as u64;
                encoder.draw_indexed_primitives(
                    conv::map_primitive(mode),
                    count,
                    conv::map_index_type(ib.index_type),
                    raw,
                    offset,
                );
            }
            None => {
                encoder.draw_primitives(conv::map_primitive(mode), start as u64, count as u64);
            }
        }
        encoder.end_encoding();
        self.state.frame_draws += 1;
    }

    /// Upload one shader's uniforms and bind its parameter-attached
    /// textures and samplers.
    fn apply_shader(&mut self, encoder: &mtl::RenderCommandEncoder, handle: Handle) {
        let Some(shader) = self.shaders.get_mut(handle) else {
            return;
        };
        shader.flush_params();
        let kind = shader.kind;

        let bindings: Vec<(u32, Option<u32>, Option<Handle>, Option<Handle>)> = shader
            .params
            .iter()
            .filter(|p| p.kind == ParamKind::Texture)
            .filter_map(|p| {
                p.texture_slot
                    .map(|slot| (slot, p.sampler_slot, p.texture, p.next_sampler))
            })
            .collect();

        // Declared sampler states bind first so a parameter's next-sampler
        // override wins at its paired slot.
        let shader = self.shaders.get(handle).unwrap();
        if kind == ShaderKind::Fragment {
            for (slot, sampler) in shader.samplers.iter().enumerate() {
                encoder.set_fragment_sampler_state(slot as u64, Some(sampler));
            }
        }
        for (slot, sampler_slot, texture, sampler) in bindings {
            if let Some(texture) = texture.and_then(|h| self.textures.get(h)) {
                encoder.set_fragment_texture(slot as u64, Some(texture.raw()));
            }
            let Some(sampler_slot) = sampler_slot else {
                continue;
            };
            if let Some(sampler) = sampler.and_then(|h| self.samplers.get(h)) {
                encoder.set_fragment_sampler_state(sampler_slot as u64, Some(sampler.raw()));
            }
        }

        let scratch = &shader.scratch;
        if scratch.is_empty() {
            return;
        }
        if scratch.len() < MAX_INLINE_UNIFORM_SIZE {
            match kind {
                ShaderKind::Vertex => encoder.set_vertex_bytes(
                    UNIFORM_BUFFER_SLOT,
                    scratch.len() as u64,
                    scratch.as_ptr() as *const _,
                ),
                ShaderKind::Fragment => encoder.set_fragment_bytes(
                    UNIFORM_BUFFER_SLOT,
                    scratch.len() as u64,
                    scratch.as_ptr() as *const _,
                ),
            }
        } else {
            let buffer = self.pool.buffer_for_size(&self.raw, scratch.len() as u64);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    scratch.as_ptr(),
                    buffer.contents() as *mut u8,
                    scratch.len(),
                );
            }
            match kind {
                ShaderKind::Vertex => {
                    encoder.set_vertex_buffer(UNIFORM_BUFFER_SLOT, Some(&buffer), 0)
                }
                ShaderKind::Fragment => {
                    encoder.set_fragment_buffer(UNIFORM_BUFFER_SLOT, Some(&buffer), 0)
                }
            }
        }
    }

    // ---- frame end ----------------------------------------------------

    /// A drawable needs at least one pass touching it; when a frame was
    /// clear-only, synthesize that pass here.
    fn flush_clear_only_frame(&mut self, cmd: &mtl::CommandBuffer) {
        if self.state.frame_draws != 0 {
            return;
        }
        if !self.state.has_pending_clears() {
            self.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0, 0);
        }
        if let Some(pass) = self.build_render_pass() {
            objc::rc::autoreleasepool(|| {
                let encoder = cmd.new_render_command_encoder(&pass);
                encoder.end_encoding();
            });
        }
    }

    /// Schedule the drawable present and commit the frame. The completion
    /// handler rotates the transient pool on an arbitrary driver thread.
    pub fn present(&mut self) {
        let Some(cmd) = self.cmd_buffer.take() else {
            log::warn!("present without an active command buffer");
            return;
        };
        self.flush_clear_only_frame(&cmd);

        if let Some(chain) = self.state.swap_chain.and_then(|h| self.swap_chains.get_mut(h)) {
            if let Some(drawable) = chain.take_drawable() {
                cmd.present_drawable(&drawable);
            }
        }

        let pool = Arc::clone(&self.pool);
        let block = ConcreteBlock::new(move |_: &mtl::CommandBufferRef| {
            pool.rotate();
        })
        .copy();
        cmd.add_completed_handler(&block);
        cmd.commit();

        self.state.discard_pending_clears();
        self.state.frame_draws = 0;
    }

    /// Commit and block until the GPU is done, rotating the pool
    /// synchronously.
    pub fn flush(&mut self) {
        let Some(cmd) = self.cmd_buffer.take() else {
            return;
        };
        cmd.commit();
        cmd.wait_until_completed();
        self.pool.rotate();
        self.state.discard_pending_clears();
        self.state.frame_draws = 0;
    }

    pub fn is_present_ready(&self) -> bool {
        true
    }

    // ---- state getters ------------------------------------------------

    pub fn viewport(&self) -> Rect {
        self.state.viewport
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}
