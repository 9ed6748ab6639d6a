//! Camera frames and the frame buffer pool
//!
//! A [`Frame`] exclusively owns its [`FrameBuffer`]. Buffers acquired from a
//! [`FramePool`] hand their storage back to the pool when dropped, so a frame
//! is released exactly once whichever stage ends up dropping it (pipeline
//! completion, failure, cancellation, or a scheduler drop).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Luma plane followed by an interleaved VU plane at half resolution
    Nv21,
    Gray8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Nv21 | PixelFormat::Gray8 => 1,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Minimum buffer length for the given geometry
    pub fn min_buffer_len(self, height: u32, stride: usize) -> usize {
        let luma = height as usize * stride;
        match self {
            PixelFormat::Nv21 => luma + (height as usize).div_ceil(2) * stride,
            PixelFormat::Gray8 | PixelFormat::Rgba8 => luma,
        }
    }
}

/// Clockwise rotation to apply for upright display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame dimensions must be non-zero ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },

    #[error("Row stride {stride} shorter than row of {row_bytes} bytes")]
    StrideTooSmall { stride: usize, row_bytes: usize },

    #[error("Buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
}

/// Frame geometry and pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first plane
    pub stride: usize,
    pub format: PixelFormat,
}

impl FrameLayout {
    /// Tightly packed layout (stride = width × bytes per pixel)
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
        }
    }

    fn validate(&self, buffer_len: usize) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::ZeroDimension {
                width: self.width,
                height: self.height,
            });
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        if self.stride < row_bytes {
            return Err(FrameError::StrideTooSmall {
                stride: self.stride,
                row_bytes,
            });
        }
        let needed = self.format.min_buffer_len(self.height, self.stride);
        if buffer_len < needed {
            return Err(FrameError::BufferTooSmall {
                needed,
                actual: buffer_len,
            });
        }
        Ok(())
    }
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
    max_retained: usize,
}

/// Pool of reusable frame byte buffers
///
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Create a pool that keeps at most `max_retained` idle buffers
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                outstanding: AtomicUsize::new(0),
                max_retained,
            }),
        }
    }

    /// Take a zeroed buffer of `len` bytes
    pub fn acquire(&self, len: usize) -> FrameBuffer {
        let mut data = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default();
        data.clear();
        data.resize(len, 0);
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        FrameBuffer {
            data,
            pool: Some(Arc::downgrade(&self.inner)),
        }
    }

    /// Take a buffer holding a copy of `bytes`
    pub fn acquire_copy(&self, bytes: &[u8]) -> FrameBuffer {
        let mut buffer = self.acquire(bytes.len());
        buffer.as_mut_slice().copy_from_slice(bytes);
        buffer
    }

    /// Buffers handed out and not yet returned
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Idle buffers ready for reuse
    pub fn idle(&self) -> usize {
        self.inner.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("outstanding", &self.outstanding())
            .field("idle", &self.idle())
            .field("max_retained", &self.inner.max_retained)
            .finish()
    }
}

/// Pixel storage of one frame
pub struct FrameBuffer {
    data: Vec<u8>,
    pool: Option<Weak<PoolInner>>,
}

impl FrameBuffer {
    /// Buffer not backed by a pool
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pool: None }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        pool.outstanding.fetch_sub(1, Ordering::SeqCst);
        let mut free = pool.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < pool.max_retained {
            free.push(std::mem::take(&mut self.data));
        }
    }
}

/// One captured camera frame
#[derive(Debug)]
pub struct Frame {
    buffer: FrameBuffer,
    layout: FrameLayout,
    rotation: Rotation,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(
        buffer: FrameBuffer,
        layout: FrameLayout,
        rotation: Rotation,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, FrameError> {
        layout.validate(buffer.len())?;
        Ok(Self {
            buffer,
            layout,
            rotation,
            captured_at,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn stride(&self) -> usize {
        self.layout.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.layout.format
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}
