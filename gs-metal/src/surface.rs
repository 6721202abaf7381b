//! Swap-chain layer bound to a host view.

use core_graphics_types::geometry::CGSize;
use foreign_types::ForeignType;
use objc::runtime::Object;
use objc::{msg_send, sel, sel_impl};

use crate::conv;
use crate::{ColorFormat, Handle};

pub struct SwapChain {
    layer: mtl::MetalLayer,
    /// The drawable acquired for the frame in flight, if any.
    pub drawable: Option<mtl::MetalDrawable>,
    /// Texture-table slot rebound to each acquired drawable's texture.
    pub texture: Handle,
    pub format: ColorFormat,
    width: u32,
    height: u32,
}

impl SwapChain {
    /// Create the layer and attach it to the host's view. `texture` is the
    /// slot the device allocated for the drawable's backing texture.
    ///
    /// # Safety
    ///
    /// `view` must be a valid `NSView` pointer, called on the main thread.
    pub unsafe fn new(
        device: &mtl::Device,
        view: *mut Object,
        width: u32,
        height: u32,
        format: ColorFormat,
        texture: Handle,
    ) -> SwapChain {
        let layer = mtl::MetalLayer::new();
        layer.set_device(device);
        if let Some(raw_format) = conv::map_color_format(format) {
            layer.set_pixel_format(raw_format);
        }
        layer.set_framebuffer_only(false);
        layer.set_presents_with_transaction(false);
        layer.set_drawable_size(CGSize::new(width as f64, height as f64));

        let () = msg_send![view, setWantsLayer: true];
        let layer_obj = layer.as_ptr() as *mut std::ffi::c_void;
        let () = msg_send![view, setLayer: layer_obj];

        SwapChain {
            layer,
            drawable: None,
            texture,
            format,
            width,
            height,
        }
    }

    /// Acquire the next drawable. May stall at display refresh; returns
    /// the drawable's backing texture for the device to rebind.
    pub fn acquire(&mut self) -> Option<mtl::Texture> {
        objc::rc::autoreleasepool(|| {
            let drawable = self.layer.next_drawable()?.to_owned();
            let texture = drawable.texture().to_owned();
            self.drawable = Some(drawable);
            Some(texture)
        })
    }

    pub fn take_drawable(&mut self) -> Option<mtl::MetalDrawable> {
        self.drawable.take()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.layer
            .set_drawable_size(CGSize::new(width as f64, height as f64));
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
