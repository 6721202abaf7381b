//! Translation of the host's legacy sampler-info block into a decomposed
//! sampler descriptor.
//!
//! The source language declares samplers with a combined min/mag/mip filter
//! enum and a packed 32-bit border color; Metal wants each axis spelled out.

/// Host addressing modes, one per texture axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Clamp,
    Wrap,
    Mirror,
    Border,
    MirrorOnce,
}

impl Default for AddressMode {
    fn default() -> Self {
        Self::Clamp
    }
}

/// Host combined filter modes, straight from the legacy enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFilter {
    Point,
    Linear,
    Anisotropic,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinPointMagMipLinear,
    MinLinearMagMipPoint,
    MinLinearMagPointMipLinear,
    MinMagLinearMipPoint,
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self::Point
    }
}

/// The legacy sampler-info block attached to a sampler declaration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerInfo {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub filter: SampleFilter,
    pub max_anisotropy: u32,
    /// Packed `0xAARRGGBB`.
    pub border_color: u32,
}

/// Per-axis filter after decomposing the combined host enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

impl Default for Filter {
    fn default() -> Self {
        Self::Nearest
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
    ClampToBorder,
    MirrorClampToEdge,
}

impl Default for Address {
    fn default() -> Self {
        Self::ClampToEdge
    }
}

impl Address {
    fn from_mode(mode: AddressMode) -> Self {
        match mode {
            AddressMode::Clamp => Self::ClampToEdge,
            AddressMode::Wrap => Self::Repeat,
            AddressMode::Mirror => Self::MirrorRepeat,
            AddressMode::Border => Self::ClampToBorder,
            AddressMode::MirrorOnce => Self::MirrorClampToEdge,
        }
    }
}

/// A fully decomposed sampler description, ready to back a GPU sampler
/// state object.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SamplerDescriptor {
    /// Addressing per axis, in u/v/w order.
    pub address: [Address; 3],
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub max_anisotropy: u32,
    /// Unpacked border color, RGBA in [0, 1].
    pub border_color: [f32; 4],
}

impl SamplerDescriptor {
    pub fn from_info(info: &SamplerInfo) -> Self {
        use SampleFilter as F;
        let (min, mag, mip) = match info.filter {
            F::Point => (Filter::Nearest, Filter::Nearest, Filter::Nearest),
            F::Linear | F::Anisotropic => (Filter::Linear, Filter::Linear, Filter::Linear),
            F::MinMagPointMipLinear => (Filter::Nearest, Filter::Nearest, Filter::Linear),
            F::MinPointMagLinearMipPoint => (Filter::Nearest, Filter::Linear, Filter::Nearest),
            F::MinPointMagMipLinear => (Filter::Nearest, Filter::Linear, Filter::Linear),
            F::MinLinearMagMipPoint => (Filter::Linear, Filter::Nearest, Filter::Nearest),
            F::MinLinearMagPointMipLinear => (Filter::Linear, Filter::Nearest, Filter::Linear),
            F::MinMagLinearMipPoint => (Filter::Linear, Filter::Linear, Filter::Nearest),
        };
        let c = info.border_color;
        SamplerDescriptor {
            address: [
                Address::from_mode(info.address_u),
                Address::from_mode(info.address_v),
                Address::from_mode(info.address_w),
            ],
            min_filter: min,
            mag_filter: mag,
            mip_filter: mip,
            max_anisotropy: info.max_anisotropy.max(1),
            border_color: [
                ((c >> 16) & 0xff) as f32 / 255.0,
                ((c >> 8) & 0xff) as f32 / 255.0,
                (c & 0xff) as f32 / 255.0,
                ((c >> 24) & 0xff) as f32 / 255.0,
            ],
        }
    }

    /// Anisotropic filtering only applies when the host asked for it and the
    /// aniso degree is above one.
    pub fn anisotropy(&self) -> u32 {
        self.max_anisotropy.clamp(1, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_decomposition() {
        let info = SamplerInfo {
            filter: SampleFilter::MinPointMagMipLinear,
            ..Default::default()
        };
        let desc = SamplerDescriptor::from_info(&info);
        assert_eq!(desc.min_filter, Filter::Nearest);
        assert_eq!(desc.mag_filter, Filter::Linear);
        assert_eq!(desc.mip_filter, Filter::Linear);
    }

    #[test]
    fn border_color_unpacks_argb() {
        let info = SamplerInfo {
            border_color: 0x80ff0000,
            ..Default::default()
        };
        let desc = SamplerDescriptor::from_info(&info);
        assert_eq!(desc.border_color[0], 1.0);
        assert_eq!(desc.border_color[1], 0.0);
        assert_eq!(desc.border_color[2], 0.0);
        assert!((desc.border_color[3] - 128.0 / 255.0).abs() < 1e-6);
    }
}
