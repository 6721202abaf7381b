//! Sampler state objects. Immutable once created.

use gs_msl::sampler::{SamplerDescriptor, SamplerInfo};

use crate::conv;

pub struct SamplerState {
    raw: mtl::SamplerState,
    pub info: SamplerInfo,
}

impl SamplerState {
    pub fn new(device: &mtl::Device, info: SamplerInfo) -> SamplerState {
        let desc = SamplerDescriptor::from_info(&info);
        SamplerState {
            raw: device.new_sampler(&conv::map_sampler(&desc)),
            info,
        }
    }

    pub fn raw(&self) -> &mtl::SamplerState {
        &self.raw
    }
}
