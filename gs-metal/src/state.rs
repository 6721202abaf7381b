//! The mutable state block behind the immediate-mode setters.
//!
//! Everything here is plain data; the draw engine folds it into Metal
//! descriptors at draw time. Keeping it free of GPU objects also makes the
//! clear-queue and projection-stack semantics testable on their own.

use std::collections::VecDeque;

use glam::Mat4;

use crate::{
    BlendFactor, BlendOp, ClearFlags, ColorWrite, CullMode, DepthTest, Handle, Rect, StencilOp,
    MAX_TEXTURE_SLOTS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub op: BlendOp,
}

impl Default for BlendState {
    fn default() -> Self {
        BlendState {
            enabled: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::InvSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::InvSrcAlpha,
            op: BlendOp::Add,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub function: DepthTest,
}

impl Default for DepthState {
    fn default() -> Self {
        DepthState {
            test_enabled: false,
            // Writes default on so enabling the test alone behaves.
            write_enabled: true,
            function: DepthTest::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StencilFace {
    pub function: DepthTest,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StencilState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub front: StencilFace,
    pub back: StencilFace,
}

/// A clear recorded against a render target, waiting to become the next
/// matching draw's load action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingClear {
    /// Render target the clear was issued against; `None` means the
    /// default target slot was empty at clear time.
    pub target: Option<Handle>,
    pub flags: ClearFlags,
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u8,
}

#[derive(Debug)]
pub struct RenderState {
    pub render_target: Option<Handle>,
    pub zstencil_target: Option<Handle>,
    pub swap_chain: Option<Handle>,

    pub vertex_buffer: Option<Handle>,
    pub index_buffer: Option<Handle>,
    pub vertex_shader: Option<Handle>,
    pub fragment_shader: Option<Handle>,
    pub textures: [Option<Handle>; MAX_TEXTURE_SLOTS],
    pub samplers: [Option<Handle>; MAX_TEXTURE_SLOTS],

    pub viewport: Rect,
    pub scissor_enabled: bool,
    pub scissor: Rect,
    pub cull_mode: CullMode,
    pub blend: BlendState,
    pub color_write_mask: ColorWrite,
    pub depth: DepthState,
    pub stencil: StencilState,

    pub projection: Mat4,
    projection_stack: Vec<Mat4>,
    /// World transform, refreshed by the host before each draw.
    pub world: Mat4,

    pending_clears: VecDeque<PendingClear>,
    /// Draws encoded since the last present/flush.
    pub frame_draws: u32,
}

impl Default for RenderState {
    fn default() -> Self {
        RenderState {
            render_target: None,
            zstencil_target: None,
            swap_chain: None,
            vertex_buffer: None,
            index_buffer: None,
            vertex_shader: None,
            fragment_shader: None,
            textures: [None; MAX_TEXTURE_SLOTS],
            samplers: [None; MAX_TEXTURE_SLOTS],
            viewport: Rect::default(),
            scissor_enabled: false,
            scissor: Rect::default(),
            cull_mode: CullMode::default(),
            blend: BlendState::default(),
            color_write_mask: ColorWrite::default(),
            depth: DepthState::default(),
            stencil: StencilState::default(),
            projection: Mat4::IDENTITY,
            projection_stack: Vec::new(),
            world: Mat4::IDENTITY,
            pending_clears: VecDeque::new(),
            frame_draws: 0,
        }
    }
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_projection(&mut self) {
        self.projection_stack.push(self.projection);
    }

    pub fn pop_projection(&mut self) {
        debug_assert!(
            !self.projection_stack.is_empty(),
            "projection stack underflow"
        );
        match self.projection_stack.pop() {
            Some(m) => self.projection = m,
            None => log::warn!("projection stack underflow"),
        }
    }

    pub fn enqueue_clear(&mut self, clear: PendingClear) {
        self.pending_clears.push_back(clear);
    }

    /// Take the queued clear for `target` if it is the next one due.
    ///
    /// Only the head of the queue is eligible: clears against other targets
    /// stay queued in order, so interleaved clear/draw sequences against
    /// multiple targets resolve exactly as submitted.
    pub fn take_pending_clear(&mut self, target: Option<Handle>) -> Option<PendingClear> {
        if self.pending_clears.front()?.target == target {
            self.pending_clears.pop_front()
        } else {
            None
        }
    }

    pub fn has_pending_clears(&self) -> bool {
        !self.pending_clears.is_empty()
    }

    /// Frame-end discard of clears that never matched a draw.
    pub fn discard_pending_clears(&mut self) {
        if !self.pending_clears.is_empty() {
            log::debug!(
                "discarding {} unmatched clear(s) at frame end",
                self.pending_clears.len()
            );
            self.pending_clears.clear();
        }
    }

    /// Orthographic projection matching the host's row-vector convention:
    /// `(left, top)` maps to `(-1, 1)` and `(right, bottom)` to `(1, -1)`.
    pub fn set_ortho(&mut self, left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) {
        let rml = right - left;
        let bmt = bottom - top;
        let fmn = far - near;
        self.projection = Mat4::from_cols_array(&[
            2.0 / rml,
            0.0,
            0.0,
            (left + right) / -rml,
            0.0,
            2.0 / -bmt,
            0.0,
            (bottom + top) / bmt,
            0.0,
            0.0,
            1.0 / fmn,
            near / -fmn,
            0.0,
            0.0,
            0.0,
            1.0,
        ])
        .transpose();
    }

    /// Off-axis perspective projection.
    pub fn set_frustum(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        let rml = right - left;
        let tmb = top - bottom;
        let fmn = far - near;
        let nearx2 = 2.0 * near;
        self.projection = Mat4::from_cols_array(&[
            nearx2 / rml,
            0.0,
            (left + right) / -rml,
            0.0,
            0.0,
            nearx2 / tmb,
            (top + bottom) / -tmb,
            0.0,
            0.0,
            0.0,
            far / fmn,
            near * far / -fmn,
            0.0,
            0.0,
            1.0,
            0.0,
        ])
        .transpose();
    }

    /// The matrix written into a vertex shader's `ViewProj` uniform.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn clear_for(target: Option<Handle>) -> PendingClear {
        PendingClear {
            target,
            flags: ClearFlags::COLOR,
            color: [0.0; 4],
            depth: 1.0,
            stencil: 0,
        }
    }

    #[test]
    fn projection_push_pop_restores() {
        let mut state = RenderState::new();
        state.set_ortho(0.0, 100.0, 0.0, 50.0, -1.0, 1.0);
        let saved = state.projection;
        state.push_projection();
        state.projection = Mat4::IDENTITY;
        state.pop_projection();
        assert_eq!(state.projection, saved);
    }

    #[test]
    fn ortho_maps_corners_to_clip_space() {
        let (w, h) = (1280.0f32, 720.0f32);
        let mut state = RenderState::new();
        state.set_ortho(0.0, w, 0.0, h, -1.0, 1.0);
        let m = state.projection;

        let top_left = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((top_left.x + 1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);

        let bottom_right = m * Vec4::new(w, h, 0.0, 1.0);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y + 1.0).abs() < 1e-6);

        // Depth range maps [-1, 1] onto [0, 1].
        let near = m * Vec4::new(0.0, 0.0, -1.0, 1.0);
        let far = m * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert!(near.z.abs() < 1e-6);
        assert!((far.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pending_clear_matches_only_head_target() {
        let a = Some(Handle(1));
        let b = Some(Handle(2));
        let mut state = RenderState::new();
        state.enqueue_clear(clear_for(a));
        state.enqueue_clear(clear_for(b));

        // A draw against b does not consume a's clear.
        assert_eq!(state.take_pending_clear(b), None);
        assert_eq!(state.take_pending_clear(a), Some(clear_for(a)));
        assert_eq!(state.take_pending_clear(b), Some(clear_for(b)));
        assert!(!state.has_pending_clears());
    }

    #[test]
    fn second_draw_to_same_target_loads() {
        let a = Some(Handle(1));
        let mut state = RenderState::new();
        state.enqueue_clear(clear_for(a));
        assert!(state.take_pending_clear(a).is_some());
        assert_eq!(state.take_pending_clear(a), None);
    }

    #[test]
    fn combined_clear_flags_are_preserved() {
        let mut state = RenderState::new();
        let mut clear = clear_for(None);
        clear.flags = ClearFlags::COLOR | ClearFlags::DEPTH;
        state.enqueue_clear(clear);
        let taken = state.take_pending_clear(None).unwrap();
        assert!(taken.flags.contains(ClearFlags::COLOR));
        assert!(taken.flags.contains(ClearFlags::DEPTH));
    }
}
