//! Texture objects: sampled 2D/cube textures, depth-stencil attachments,
//! and CPU-readable stage surfaces.

use objc::{msg_send, sel, sel_impl};

use crate::conv;
use crate::{ColorFormat, TextureFlags, ZStencilFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    Cube,
}

/// An IOSurface handle owned by the host; treated as opaque here.
pub type IoSurfaceRef = *mut std::ffi::c_void;

#[link(name = "IOSurface", kind = "framework")]
extern "C" {
    fn IOSurfaceGetWidth(surface: IoSurfaceRef) -> usize;
    fn IOSurfaceGetHeight(surface: IoSurfaceRef) -> usize;
    fn IOSurfaceGetPixelFormat(surface: IoSurfaceRef) -> u32;
}

const FOURCC_BGRA: u32 = u32::from_be_bytes(*b"BGRA");
const FOURCC_L10R: u32 = u32::from_be_bytes(*b"l10r");

pub struct Texture {
    raw: mtl::Texture,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: ColorFormat,
    raw_format: mtl::MTLPixelFormat,
    pub flags: TextureFlags,
    /// Backing surface for textures opened from an IOSurface.
    pub iosurface: Option<IoSurfaceRef>,
    /// Level-0 download cache for map/unmap.
    mapped: Option<Vec<u8>>,
}

fn level_count(width: u32, height: u32, requested: u32) -> u32 {
    if requested != 0 {
        return requested;
    }
    // Zero means the full chain down to 1x1.
    (32 - width.max(height).leading_zeros()).max(1)
}

fn texture_descriptor(
    kind: TextureKind,
    width: u32,
    height: u32,
    raw_format: mtl::MTLPixelFormat,
    levels: u32,
    render_target: bool,
) -> mtl::TextureDescriptor {
    let descriptor = mtl::TextureDescriptor::new();
    descriptor.set_texture_type(match kind {
        TextureKind::D2 => mtl::MTLTextureType::D2,
        TextureKind::Cube => mtl::MTLTextureType::Cube,
    });
    descriptor.set_pixel_format(raw_format);
    descriptor.set_width(width as u64);
    descriptor.set_height(height as u64);
    descriptor.set_mipmap_level_count(levels as u64);
    descriptor.set_storage_mode(mtl::MTLStorageMode::Managed);
    let mut usage = mtl::MTLTextureUsage::ShaderRead;
    if render_target {
        usage |= mtl::MTLTextureUsage::RenderTarget;
    }
    descriptor.set_usage(usage);
    descriptor
}

impl Texture {
    /// Create a texture, uploading initial mip data when supplied. For cube
    /// textures the data runs face-major: all of face 0's mips, then face 1.
    pub fn new(
        device: &mtl::Device,
        kind: TextureKind,
        width: u32,
        height: u32,
        format: ColorFormat,
        levels: u32,
        data: &[&[u8]],
        flags: TextureFlags,
    ) -> Option<Texture> {
        let raw_format = match conv::map_color_format(format) {
            Some(f) => f,
            None => {
                log::error!("texture creation with unsupported format {format:?}");
                return None;
            }
        };
        let levels = level_count(width, height, levels);
        let descriptor = texture_descriptor(
            kind,
            width,
            height,
            raw_format,
            levels,
            flags.contains(TextureFlags::RENDER_TARGET),
        );
        let raw = device.new_texture(&descriptor);
        let texture = Texture {
            raw,
            kind,
            width,
            height,
            levels,
            format,
            raw_format,
            flags,
            iosurface: None,
            mapped: None,
        };
        texture.upload_initial(data);
        Some(texture)
    }

    /// Wrap an external Metal texture (a drawable's backing store).
    pub fn from_raw(raw: mtl::Texture, format: ColorFormat) -> Texture {
        let width = raw.width() as u32;
        let height = raw.height() as u32;
        Texture {
            raw,
            kind: TextureKind::D2,
            width,
            height,
            levels: 1,
            format,
            raw_format: conv::map_color_format(format)
                .unwrap_or(mtl::MTLPixelFormat::BGRA8Unorm),
            flags: TextureFlags::RENDER_TARGET,
            iosurface: None,
            mapped: None,
        }
    }

    /// Wrap an externally owned IOSurface. The pixel format derives from
    /// the surface's FourCC.
    pub fn from_iosurface(device: &mtl::Device, surface: IoSurfaceRef) -> Option<Texture> {
        let (width, height, fourcc) = unsafe {
            (
                IOSurfaceGetWidth(surface) as u32,
                IOSurfaceGetHeight(surface) as u32,
                IOSurfaceGetPixelFormat(surface),
            )
        };
        let (format, raw_format) = match fourcc {
            FOURCC_BGRA => (ColorFormat::Bgra, mtl::MTLPixelFormat::BGRA8Unorm),
            FOURCC_L10R => (ColorFormat::R10G10B10A2, mtl::MTLPixelFormat::BGR10A2Unorm),
            other => {
                log::error!("IOSurface with unsupported pixel format {other:#x}");
                return None;
            }
        };
        let descriptor = texture_descriptor(TextureKind::D2, width, height, raw_format, 1, false);
        let raw = unsafe { Self::wrap_iosurface(device, &descriptor, surface)? };
        Some(Texture {
            raw,
            kind: TextureKind::D2,
            width,
            height,
            levels: 1,
            format,
            raw_format,
            flags: TextureFlags::SHARED,
            iosurface: Some(surface),
            mapped: None,
        })
    }

    /// Swap the backing surface of a shared texture in place.
    pub fn rebind_iosurface(&mut self, device: &mtl::Device, surface: IoSurfaceRef) -> bool {
        let descriptor = texture_descriptor(
            TextureKind::D2,
            self.width,
            self.height,
            self.raw_format,
            1,
            false,
        );
        match unsafe { Self::wrap_iosurface(device, &descriptor, surface) } {
            Some(raw) => {
                self.raw = raw;
                self.iosurface = Some(surface);
                true
            }
            None => false,
        }
    }

    unsafe fn wrap_iosurface(
        device: &mtl::Device,
        descriptor: &mtl::TextureDescriptor,
        surface: IoSurfaceRef,
    ) -> Option<mtl::Texture> {
        use foreign_types::ForeignType;
        // metal-rs has no binding for the IOSurface initializer.
        let device_obj = device.as_ptr() as *mut objc::runtime::Object;
        let descriptor_obj = descriptor.as_ptr() as *mut std::ffi::c_void;
        let raw: *mut objc::runtime::Object = msg_send![
            device_obj,
            newTextureWithDescriptor: descriptor_obj
            iosurface: surface
            plane: 0usize
        ];
        if raw.is_null() {
            log::error!("newTextureWithDescriptor:iosurface: failed");
            None
        } else {
            Some(mtl::Texture::from_ptr(raw as *mut _))
        }
    }

    fn upload_initial(&self, data: &[&[u8]]) {
        if data.is_empty() {
            return;
        }
        let faces = match self.kind {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        };
        let mut chunk = 0;
        for face in 0..faces {
            for level in 0..self.levels {
                let Some(bytes) = data.get(chunk) else {
                    return;
                };
                chunk += 1;
                self.upload_level(face, level, bytes);
            }
        }
    }

    pub fn upload_level(&self, face: u32, level: u32, bytes: &[u8]) {
        let width = (self.width >> level).max(1);
        let height = (self.height >> level).max(1);
        let row = conv::format_row_size(self.format, width) as u64;
        let region = mtl::MTLRegion {
            origin: mtl::MTLOrigin { x: 0, y: 0, z: 0 },
            size: mtl::MTLSize {
                width: width as u64,
                height: height as u64,
                depth: 1,
            },
        };
        if face == 0 {
            self.raw
                .replace_region(region, level as u64, row, bytes.as_ptr() as *const _);
        } else {
            // Only the slice variant reaches cube faces past the first.
            unsafe {
                use foreign_types::ForeignType;
                let texture_obj = self.raw.as_ptr() as *mut objc::runtime::Object;
                let () = msg_send![
                    texture_obj,
                    replaceRegion: region
                    mipmapLevel: level as u64
                    slice: face as u64
                    withBytes: bytes.as_ptr() as *const std::ffi::c_void
                    bytesPerRow: row
                    bytesPerImage: 0u64
                ];
            }
        }
    }

    /// Download the level-0 image into the CPU cache and expose it.
    /// Returns the pointer and the row pitch.
    pub fn map(&mut self) -> Option<(*mut u8, u32)> {
        if self.kind != TextureKind::D2 {
            log::error!("map on a non-2D texture");
            return None;
        }
        let row = conv::format_row_size(self.format, self.width);
        let size = row as usize * self.height as usize;
        let mut cache = self.mapped.take().unwrap_or_default();
        cache.resize(size, 0);
        let region = mtl::MTLRegion {
            origin: mtl::MTLOrigin { x: 0, y: 0, z: 0 },
            size: mtl::MTLSize {
                width: self.width as u64,
                height: self.height as u64,
                depth: 1,
            },
        };
        self.raw
            .get_bytes(cache.as_mut_ptr() as *mut _, region, 0, row as u64);
        self.mapped = Some(cache);
        Some((self.mapped.as_mut().unwrap().as_mut_ptr(), row))
    }

    /// Re-upload whatever the host wrote into the mapped cache.
    pub fn unmap(&mut self) {
        let Some(cache) = self.mapped.take() else {
            log::warn!("unmap without a prior map");
            return;
        };
        self.upload_level(0, 0, &cache);
        self.mapped = Some(cache);
    }

    pub fn raw(&self) -> &mtl::Texture {
        &self.raw
    }

    /// The underlying `MTLTexture` pointer, for hosts that pass GPU
    /// objects across API boundaries.
    pub fn raw_handle(&self) -> *mut std::ffi::c_void {
        use foreign_types::ForeignType;
        self.raw.as_ptr() as *mut _
    }

    pub fn raw_format(&self) -> mtl::MTLPixelFormat {
        self.raw_format
    }
}

/// A depth/stencil attachment. Lives in private storage; the CPU never
/// touches it.
pub struct ZStencilBuffer {
    raw: mtl::Texture,
    pub width: u32,
    pub height: u32,
    pub format: ZStencilFormat,
    raw_format: mtl::MTLPixelFormat,
}

impl ZStencilBuffer {
    pub fn new(
        device: &mtl::Device,
        width: u32,
        height: u32,
        format: ZStencilFormat,
    ) -> Option<ZStencilBuffer> {
        let raw_format = conv::map_zstencil_format(format)?;
        let descriptor = mtl::TextureDescriptor::new();
        descriptor.set_texture_type(mtl::MTLTextureType::D2);
        descriptor.set_pixel_format(raw_format);
        descriptor.set_width(width as u64);
        descriptor.set_height(height as u64);
        descriptor.set_storage_mode(mtl::MTLStorageMode::Private);
        descriptor.set_usage(mtl::MTLTextureUsage::RenderTarget);
        Some(ZStencilBuffer {
            raw: device.new_texture(&descriptor),
            width,
            height,
            format,
            raw_format,
        })
    }

    pub fn raw(&self) -> &mtl::Texture {
        &self.raw
    }

    pub fn raw_format(&self) -> mtl::MTLPixelFormat {
        self.raw_format
    }
}

/// A CPU-readable staging surface. Managed storage so a blit synchronize
/// makes GPU writes visible to `get_bytes`.
pub struct StageSurface {
    raw: mtl::Texture,
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    mapped: Option<Vec<u8>>,
}

impl StageSurface {
    pub fn new(
        device: &mtl::Device,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Option<StageSurface> {
        let raw_format = conv::map_color_format(format)?;
        let descriptor = texture_descriptor(TextureKind::D2, width, height, raw_format, 1, false);
        Some(StageSurface {
            raw: device.new_texture(&descriptor),
            width,
            height,
            format,
            mapped: None,
        })
    }

    /// Read the surface contents back. The caller is responsible for having
    /// synchronized and completed the GPU work that produced them.
    pub fn map(&mut self) -> Option<(*mut u8, u32)> {
        let row = conv::format_row_size(self.format, self.width);
        let size = row as usize * self.height as usize;
        let mut cache = self.mapped.take().unwrap_or_default();
        cache.resize(size, 0);
        let region = mtl::MTLRegion {
            origin: mtl::MTLOrigin { x: 0, y: 0, z: 0 },
            size: mtl::MTLSize {
                width: self.width as u64,
                height: self.height as u64,
                depth: 1,
            },
        };
        self.raw
            .get_bytes(cache.as_mut_ptr() as *mut _, region, 0, row as u64);
        self.mapped = Some(cache);
        Some((self.mapped.as_mut().unwrap().as_mut_ptr(), row))
    }

    pub fn unmap(&mut self) {
        self.mapped = None;
    }

    pub fn raw(&self) -> &mtl::Texture {
        &self.raw
    }
}
