//! Vertex and index buffer objects.
//!
//! A vertex buffer is a bundle of parallel per-vertex streams: positions,
//! optional normals/tangents/colors, and any number of texcoord streams.
//! Static buffers get one private-ish GPU buffer per stream, filled once.
//! Dynamic buffers own no GPU storage of their own; every flush borrows
//! fresh buffers from the transient pool and copies the CPU-side arrays in.

use arrayvec::ArrayVec;

use crate::pool::BufferPool;
use crate::IndexType;

/// Stream buffers bound per draw: position, normal, tangent, color, plus
/// texcoord units.
pub const MAX_STREAMS: usize = 4 + 8;

/// One texture-coordinate stream, `width` floats per vertex.
#[derive(Clone, Debug, Default)]
pub struct TexCoords {
    pub width: u32,
    pub data: Vec<f32>,
}

/// The host-supplied source arrays for a vertex buffer. The host's 3-float
/// vectors arrive padded to four floats, so position-class streams upload
/// with a 16-byte stride directly.
#[derive(Clone, Debug, Default)]
pub struct VertexData {
    pub num: usize,
    pub points: Vec<[f32; 4]>,
    pub normals: Option<Vec<[f32; 4]>>,
    pub tangents: Option<Vec<[f32; 4]>>,
    /// Packed RGBA8, unpacked to four floats at upload time.
    pub colors: Option<Vec<u32>>,
    pub texcoords: Vec<TexCoords>,
}

pub struct VertexBuffer {
    pub dynamic: bool,
    data: VertexData,
    points: Option<mtl::Buffer>,
    normals: Option<mtl::Buffer>,
    tangents: Option<mtl::Buffer>,
    colors: Option<mtl::Buffer>,
    texcoords: Vec<Option<mtl::Buffer>>,
    /// Scratch for RGBA8 -> float4 expansion, kept to avoid realloc on
    /// every dynamic flush.
    color_scratch: Vec<[f32; 4]>,
}

fn upload(device: &mtl::Device, bytes: &[u8]) -> mtl::Buffer {
    device.new_buffer_with_data(
        bytes.as_ptr() as *const _,
        bytes.len() as u64,
        mtl::MTLResourceOptions::StorageModeShared
            | mtl::MTLResourceOptions::CPUCacheModeWriteCombined,
    )
}

fn pool_upload(device: &mtl::Device, pool: &BufferPool, bytes: &[u8]) -> mtl::Buffer {
    let buffer = pool.buffer_for_size(device, bytes.len() as u64);
    unsafe {
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            buffer.contents() as *mut u8,
            bytes.len(),
        );
    }
    buffer
}

fn unpack_colors(colors: &[u32], out: &mut Vec<[f32; 4]>) {
    out.clear();
    out.extend(colors.iter().map(|&c| {
        [
            (c & 0xff) as f32 / 255.0,
            ((c >> 8) & 0xff) as f32 / 255.0,
            ((c >> 16) & 0xff) as f32 / 255.0,
            ((c >> 24) & 0xff) as f32 / 255.0,
        ]
    }));
}

impl VertexBuffer {
    /// Wrap a host source struct. Static buffers upload all streams here;
    /// dynamic buffers wait for their first flush.
    pub fn new(device: &mtl::Device, data: VertexData, dynamic: bool) -> Self {
        let mut vb = VertexBuffer {
            dynamic,
            texcoords: vec![None; data.texcoords.len()],
            data,
            points: None,
            normals: None,
            tangents: None,
            colors: None,
            color_scratch: Vec::new(),
        };
        if !dynamic {
            vb.upload_static(device);
        }
        vb
    }

    fn upload_static(&mut self, device: &mtl::Device) {
        self.points = Some(upload(device, bytemuck::cast_slice(&self.data.points)));
        if let Some(ref normals) = self.data.normals {
            self.normals = Some(upload(device, bytemuck::cast_slice(normals)));
        }
        if let Some(ref tangents) = self.data.tangents {
            self.tangents = Some(upload(device, bytemuck::cast_slice(tangents)));
        }
        if let Some(ref colors) = self.data.colors {
            unpack_colors(colors, &mut self.color_scratch);
            self.colors = Some(upload(device, bytemuck::cast_slice(&self.color_scratch)));
        }
        for (i, tc) in self.data.texcoords.iter().enumerate() {
            self.texcoords[i] = Some(upload(device, bytemuck::cast_slice(&tc.data)));
        }
    }

    /// Refresh a dynamic buffer's GPU storage from its CPU arrays, through
    /// the transient pool. `data` replaces the retained source first when
    /// the host flushed with new contents.
    pub fn flush(&mut self, device: &mtl::Device, pool: &BufferPool, data: Option<VertexData>) {
        assert!(self.dynamic, "flush on a static vertex buffer");
        if let Some(data) = data {
            self.texcoords.resize(data.texcoords.len(), None);
            self.data = data;
        }
        self.points = Some(pool_upload(
            device,
            pool,
            bytemuck::cast_slice(&self.data.points),
        ));
        if let Some(ref normals) = self.data.normals {
            self.normals = Some(pool_upload(device, pool, bytemuck::cast_slice(normals)));
        }
        if let Some(ref tangents) = self.data.tangents {
            self.tangents = Some(pool_upload(device, pool, bytemuck::cast_slice(tangents)));
        }
        if let Some(ref colors) = self.data.colors {
            unpack_colors(colors, &mut self.color_scratch);
            self.colors = Some(pool_upload(
                device,
                pool,
                bytemuck::cast_slice(&self.color_scratch),
            ));
        }
        for (i, tc) in self.data.texcoords.iter().enumerate() {
            self.texcoords[i] = Some(pool_upload(device, pool, bytemuck::cast_slice(&tc.data)));
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.data.num
    }

    pub fn data(&self) -> &VertexData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut VertexData {
        &mut self.data
    }

    /// Collect stream buffers in the order the vertex shader consumes
    /// them. A stream the shader wants but the buffer lacks is a host
    /// contract violation.
    pub fn buffers_for_shader(
        &self,
        streams: &[gs_msl::Stream],
    ) -> ArrayVec<mtl::Buffer, MAX_STREAMS> {
        let mut out = ArrayVec::new();
        for stream in streams {
            match *stream {
                gs_msl::Stream::Position => {
                    out.push(self.points.clone().expect("vertex buffer has no positions"))
                }
                gs_msl::Stream::Normal => out.push(
                    self.normals
                        .clone()
                        .expect("vertex shader requires normals the buffer lacks"),
                ),
                gs_msl::Stream::Tangent => out.push(
                    self.tangents
                        .clone()
                        .expect("vertex shader requires tangents the buffer lacks"),
                ),
                gs_msl::Stream::Color => out.push(
                    self.colors
                        .clone()
                        .expect("vertex shader requires colors the buffer lacks"),
                ),
                gs_msl::Stream::Texcoord { count } => {
                    for unit in 0..count as usize {
                        out.push(
                            self.texcoords
                                .get(unit)
                                .and_then(Clone::clone)
                                .unwrap_or_else(|| {
                                    panic!(
                                        "vertex shader requires texcoord stream {unit} the buffer lacks"
                                    )
                                }),
                        );
                    }
                }
            }
        }
        out
    }
}

/// The host-supplied source for an index buffer.
#[derive(Clone, Debug)]
pub struct IndexData {
    pub index_type: IndexType,
    pub num: usize,
    pub bytes: Vec<u8>,
}

pub struct IndexBuffer {
    pub dynamic: bool,
    pub index_type: IndexType,
    data: IndexData,
    raw: Option<mtl::Buffer>,
}

impl IndexBuffer {
    pub fn new(device: &mtl::Device, data: IndexData, dynamic: bool) -> Self {
        let mut ib = IndexBuffer {
            dynamic,
            index_type: data.index_type,
            data,
            raw: None,
        };
        if !dynamic {
            ib.raw = Some(upload(device, &ib.data.bytes));
        }
        ib
    }

    pub fn flush(&mut self, device: &mtl::Device, pool: &BufferPool, data: Option<IndexData>) {
        assert!(self.dynamic, "flush on a static index buffer");
        if let Some(data) = data {
            self.index_type = data.index_type;
            self.data = data;
        }
        self.raw = Some(pool_upload(device, pool, &self.data.bytes));
    }

    pub fn num_indices(&self) -> usize {
        self.data.num
    }

    pub fn data(&self) -> &IndexData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut IndexData {
        &mut self.data
    }

    pub fn raw(&self) -> Option<&mtl::Buffer> {
        self.raw.as_ref()
    }
}
