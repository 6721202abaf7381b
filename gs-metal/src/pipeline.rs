//! Memoization of compiled render pipeline states.
//!
//! A pipeline is identified by every field that feeds its descriptor:
//! attachment formats, the blend configuration, the write mask and the two
//! shader identities (which in turn pin down the vertex layout). Identical
//! fingerprints share one compiled pipeline.

use rustc_hash::FxHashMap;

use crate::state::BlendState;
use crate::{ColorWrite, Handle};

/// Fingerprint of a render pipeline descriptor. Pixel formats are stored
/// raw so the key stays hashable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub color_format: u64,
    pub depth_format: u64,
    pub stencil_format: u64,
    pub blend: BlendState,
    pub color_write_mask: ColorWrite,
    pub vertex_shader: Handle,
    pub fragment_shader: Handle,
}

#[derive(Default)]
pub struct PipelineCache {
    map: FxHashMap<PipelineKey, mtl::RenderPipelineState>,
    created: u32,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the pipeline for `key`, compiling it on a miss. Compilation
    /// failure is fatal: the descriptor is structurally invalid and the
    /// host has no recovery path.
    pub fn get_or_create(
        &mut self,
        key: PipelineKey,
        build: impl FnOnce() -> Result<mtl::RenderPipelineState, String>,
    ) -> mtl::RenderPipelineState {
        if let Some(pipeline) = self.map.get(&key) {
            return pipeline.clone();
        }
        let pipeline = match build() {
            Ok(pipeline) => pipeline,
            Err(err) => panic!("render pipeline compilation failed: {err}"),
        };
        self.created += 1;
        self.map.insert(key, pipeline.clone());
        pipeline
    }

    /// Number of pipelines compiled since creation; cache hits do not
    /// increment it.
    pub fn pipelines_created(&self) -> u32 {
        self.created
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlendFactor;

    fn key() -> PipelineKey {
        PipelineKey {
            color_format: 80, // BGRA8Unorm
            depth_format: 0,
            stencil_format: 0,
            blend: BlendState::default(),
            color_write_mask: ColorWrite::default(),
            vertex_shader: Handle(1),
            fragment_shader: Handle(2),
        }
    }

    #[test]
    fn identical_state_shares_a_fingerprint() {
        let a = key();
        let b = key();
        assert_eq!(a, b);
        let mut set = FxHashMap::default();
        set.insert(a, ());
        assert!(set.contains_key(&b));
    }

    #[test]
    fn blend_config_changes_the_fingerprint() {
        let a = key();
        let mut b = key();
        b.blend.src_color = BlendFactor::One;
        assert_ne!(a, b);

        let mut c = key();
        c.color_write_mask = ColorWrite::RED;
        assert_ne!(a, c);

        let mut d = key();
        d.fragment_shader = Handle(9);
        assert_ne!(a, d);
    }
}
