//! Raw video frame buffers.
//!
//! Buffers share their planes through `Arc<Vec<u8>>`: cloning a frame to
//! hand it to several sinks is cheap, and a holder that wants to write
//! gets its own copy through `Arc::make_mut`.

use std::fmt;
use std::sync::Arc;

/// Pixel layout of a [`VideoFrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFrameBufferType {
    Argb,
    I420,
    Nv12,
    Native,
}

/// Packed 32-bit ARGB, stored little-endian (B, G, R, A in memory).
#[derive(Clone, PartialEq, Eq)]
pub struct ArgbBuffer {
    width: u32,
    height: u32,
    stride: u32,
    data: Arc<Vec<u8>>,
}

impl ArgbBuffer {
    /// Allocate a zeroed buffer with a tight stride. `None` when a row of
    /// `width` pixels does not fit a `u32` stride.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let stride = width.checked_mul(4)?;
        Some(Self {
            width,
            height,
            stride,
            data: Arc::new(vec![0; plane_len(stride, height)?]),
        })
    }

    /// Wrap existing pixels. Returns `None` if `data` is too short for
    /// `stride * height` or the stride cannot hold a row.
    pub fn from_raw(width: u32, height: u32, stride: u32, data: Vec<u8>) -> Option<Self> {
        if u64::from(stride) < u64::from(width) * 4 || data.len() < plane_len(stride, height)? {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            data: Arc::new(data),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Convert to I420 using BT.601 limited-range coefficients.
    ///
    /// Chroma is computed from the average of each 2x2 block; odd edges
    /// reuse the last row/column.
    pub fn to_i420(&self) -> I420Buffer {
        let w = self.width as usize;
        let h = self.height as usize;
        let stride = self.stride as usize;
        let mut out = I420Buffer::new(self.width, self.height);

        let pixel = |row: usize, col: usize| -> (i32, i32, i32) {
            let idx = row * stride + col * 4;
            let b = self.data[idx] as i32;
            let g = self.data[idx + 1] as i32;
            let r = self.data[idx + 2] as i32;
            (r, g, b)
        };

        let (stride_y, stride_u, stride_v) = out.strides();
        let (stride_y, stride_u, stride_v) = (stride_y as usize, stride_u as usize, stride_v as usize);

        {
            let y_plane = out.data_y_mut();
            for row in 0..h {
                for col in 0..w {
                    let (r, g, b) = pixel(row, col);
                    y_plane[row * stride_y + col] = luma(r, g, b);
                }
            }
        }

        let chroma_w = w.div_ceil(2);
        let chroma_h = h.div_ceil(2);
        let mut u_values = vec![0u8; chroma_w * chroma_h];
        let mut v_values = vec![0u8; chroma_w * chroma_h];
        for crow in 0..chroma_h {
            for ccol in 0..chroma_w {
                let rows = [crow * 2, (crow * 2 + 1).min(h - 1)];
                let cols = [ccol * 2, (ccol * 2 + 1).min(w - 1)];
                let (mut r, mut g, mut b) = (0, 0, 0);
                for row in rows {
                    for col in cols {
                        let (pr, pg, pb) = pixel(row, col);
                        r += pr;
                        g += pg;
                        b += pb;
                    }
                }
                let (r, g, b) = ((r + 2) / 4, (g + 2) / 4, (b + 2) / 4);
                u_values[crow * chroma_w + ccol] = chroma_u(r, g, b);
                v_values[crow * chroma_w + ccol] = chroma_v(r, g, b);
            }
        }

        {
            let u_plane = out.data_u_mut();
            for crow in 0..chroma_h {
                u_plane[crow * stride_u..crow * stride_u + chroma_w]
                    .copy_from_slice(&u_values[crow * chroma_w..(crow + 1) * chroma_w]);
            }
        }
        {
            let v_plane = out.data_v_mut();
            for crow in 0..chroma_h {
                v_plane[crow * stride_v..crow * stride_v + chroma_w]
                    .copy_from_slice(&v_values[crow * chroma_w..(crow + 1) * chroma_w]);
            }
        }

        out
    }
}

impl fmt::Debug for ArgbBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgbBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

/// Bytes taken by `rows` rows of `stride` bytes, if addressable.
fn plane_len(stride: u32, rows: u32) -> Option<usize> {
    usize::try_from(u64::from(stride) * u64::from(rows)).ok()
}

fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Planar YUV 4:2:0.
#[derive(Clone, PartialEq, Eq)]
pub struct I420Buffer {
    width: u32,
    height: u32,
    stride_y: u32,
    stride_u: u32,
    stride_v: u32,
    y: Arc<Vec<u8>>,
    u: Arc<Vec<u8>>,
    v: Arc<Vec<u8>>,
}

impl I420Buffer {
    /// Allocate a black frame (Y = 16, U = V = 128) with tight strides.
    ///
    /// # Panics
    ///
    /// If the planes are larger than the address space, like `vec!`.
    pub fn new(width: u32, height: u32) -> Self {
        let chroma_w = width.div_ceil(2);
        let chroma_h = height.div_ceil(2);
        let luma_len = plane_len(width, height).unwrap_or(usize::MAX);
        let chroma_len = plane_len(chroma_w, chroma_h).unwrap_or(usize::MAX);
        Self {
            width,
            height,
            stride_y: width,
            stride_u: chroma_w,
            stride_v: chroma_w,
            y: Arc::new(vec![16; luma_len]),
            u: Arc::new(vec![128; chroma_len]),
            v: Arc::new(vec![128; chroma_len]),
        }
    }

    /// Wrap existing planes. Returns `None` when a plane is too short for
    /// its stride.
    pub fn from_planes(
        width: u32,
        height: u32,
        (stride_y, stride_u, stride_v): (u32, u32, u32),
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    ) -> Option<Self> {
        let chroma_w = width.div_ceil(2);
        let chroma_h = height.div_ceil(2);
        if stride_y < width || stride_u < chroma_w || stride_v < chroma_w {
            return None;
        }
        if y.len() < plane_len(stride_y, height)?
            || u.len() < plane_len(stride_u, chroma_h)?
            || v.len() < plane_len(stride_v, chroma_h)?
        {
            return None;
        }
        Some(Self {
            width,
            height,
            stride_y,
            stride_u,
            stride_v,
            y: Arc::new(y),
            u: Arc::new(u),
            v: Arc::new(v),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn strides(&self) -> (u32, u32, u32) {
        (self.stride_y, self.stride_u, self.stride_v)
    }

    pub fn data(&self) -> (&[u8], &[u8], &[u8]) {
        (&self.y, &self.u, &self.v)
    }

    pub fn data_y_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.y).as_mut_slice()
    }

    pub fn data_u_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.u).as_mut_slice()
    }

    pub fn data_v_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.v).as_mut_slice()
    }
}

impl fmt::Debug for I420Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("I420Buffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("strides", &self.strides())
            .finish_non_exhaustive()
    }
}

/// Y plane followed by an interleaved UV plane.
#[derive(Clone, PartialEq, Eq)]
pub struct Nv12Buffer {
    width: u32,
    height: u32,
    stride_y: u32,
    stride_uv: u32,
    y: Arc<Vec<u8>>,
    uv: Arc<Vec<u8>>,
}

impl Nv12Buffer {
    /// `None` when the interleaved chroma stride overflows.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let stride_uv = width.div_ceil(2).checked_mul(2)?;
        Some(Self {
            width,
            height,
            stride_y: width,
            stride_uv,
            y: Arc::new(vec![16; plane_len(width, height)?]),
            uv: Arc::new(vec![128; plane_len(stride_uv, height.div_ceil(2))?]),
        })
    }

    pub fn from_planes(
        width: u32,
        height: u32,
        stride_y: u32,
        stride_uv: u32,
        y: Vec<u8>,
        uv: Vec<u8>,
    ) -> Option<Self> {
        if stride_y < width || u64::from(stride_uv) < u64::from(width.div_ceil(2)) * 2 {
            return None;
        }
        if y.len() < plane_len(stride_y, height)?
            || uv.len() < plane_len(stride_uv, height.div_ceil(2))?
        {
            return None;
        }
        Some(Self {
            width,
            height,
            stride_y,
            stride_uv,
            y: Arc::new(y),
            uv: Arc::new(uv),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn strides(&self) -> (u32, u32) {
        (self.stride_y, self.stride_uv)
    }

    pub fn data(&self) -> (&[u8], &[u8]) {
        (&self.y, &self.uv)
    }

    pub fn data_y_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.y).as_mut_slice()
    }

    pub fn data_uv_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.uv).as_mut_slice()
    }

    /// Split the interleaved chroma plane into separate U and V planes.
    pub fn to_i420(&self) -> I420Buffer {
        let w = self.width as usize;
        let h = self.height as usize;
        let chroma_w = w.div_ceil(2);
        let chroma_h = h.div_ceil(2);
        let mut out = I420Buffer::new(self.width, self.height);
        let (sy, su, sv) = out.strides();
        let (sy, su, sv) = (sy as usize, su as usize, sv as usize);
        let src_sy = self.stride_y as usize;
        let src_suv = self.stride_uv as usize;

        {
            let y = out.data_y_mut();
            for row in 0..h {
                y[row * sy..row * sy + w].copy_from_slice(&self.y[row * src_sy..row * src_sy + w]);
            }
        }
        {
            let u = out.data_u_mut();
            for row in 0..chroma_h {
                for col in 0..chroma_w {
                    u[row * su + col] = self.uv[row * src_suv + col * 2];
                }
            }
        }
        {
            let v = out.data_v_mut();
            for row in 0..chroma_h {
                for col in 0..chroma_w {
                    v[row * sv + col] = self.uv[row * src_suv + col * 2 + 1];
                }
            }
        }
        out
    }
}

impl fmt::Debug for Nv12Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nv12Buffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("strides", &self.strides())
            .finish_non_exhaustive()
    }
}

/// Platform-specific frame representation (GPU texture, pixel buffer
/// reference, ...). Conversion to I420 is optional.
pub trait NativeBuffer: Send + Sync + fmt::Debug {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Read the frame back into memory. `None` when the platform cannot.
    fn to_i420(&self) -> Option<I420Buffer> {
        None
    }
}

/// Closed set of frame buffer layouts.
#[derive(Clone, Debug)]
pub enum VideoFrameBuffer {
    Argb(ArgbBuffer),
    I420(I420Buffer),
    Nv12(Nv12Buffer),
    Native(Arc<dyn NativeBuffer>),
}

impl VideoFrameBuffer {
    pub fn buffer_type(&self) -> VideoFrameBufferType {
        match self {
            Self::Argb(_) => VideoFrameBufferType::Argb,
            Self::I420(_) => VideoFrameBufferType::I420,
            Self::Nv12(_) => VideoFrameBufferType::Nv12,
            Self::Native(_) => VideoFrameBufferType::Native,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Argb(b) => b.width(),
            Self::I420(b) => b.width(),
            Self::Nv12(b) => b.width(),
            Self::Native(b) => b.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Argb(b) => b.height(),
            Self::I420(b) => b.height(),
            Self::Nv12(b) => b.height(),
            Self::Native(b) => b.height(),
        }
    }

    /// Convert to I420. Returns `None` when the layout cannot be read back.
    pub fn to_i420(&self) -> Option<I420Buffer> {
        match self {
            Self::Argb(b) => Some(b.to_i420()),
            Self::I420(b) => Some(b.clone()),
            Self::Nv12(b) => Some(b.to_i420()),
            Self::Native(b) => {
                let converted = b.to_i420();
                if converted.is_none() {
                    tracing::debug!("native frame buffer has no i420 conversion");
                }
                converted
            }
        }
    }

    pub fn as_argb(&self) -> Option<&ArgbBuffer> {
        match self {
            Self::Argb(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i420(&self) -> Option<&I420Buffer> {
        match self {
            Self::I420(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_nv12(&self) -> Option<&Nv12Buffer> {
        match self {
            Self::Nv12(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<&Arc<dyn NativeBuffer>> {
        match self {
            Self::Native(b) => Some(b),
            _ => None,
        }
    }
}

/// A decoded video frame with its capture timestamp.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    buffer: VideoFrameBuffer,
    timestamp_us: i64,
}

impl VideoFrame {
    pub fn new(buffer: VideoFrameBuffer, timestamp_us: i64) -> Self {
        Self {
            buffer,
            timestamp_us,
        }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn buffer(&self) -> &VideoFrameBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> VideoFrameBuffer {
        self.buffer
    }
}
