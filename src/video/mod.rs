//! Video sources feeding the hand detector.

pub mod webcam;

use std::{fmt, time::Instant};

use crate::{error::Result, timer::Timer};

/// Width and height of a video frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub const RES_720P: Self = Self::new(1280, 720);
    pub const RES_1080P: Self = Self::new(1920, 1080);

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoding of a [`Frame`]'s data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixelFormat {
    /// A JFIF JPEG or Motion-JPEG frame.
    Jpeg,
    /// Uncompressed RGBA, 8 bits per channel.
    Rgba8,
}

/// A single frame captured by a [`VideoSource`].
///
/// The frame data is passed to the detector as-is.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    resolution: Resolution,
    format: PixelFormat,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, resolution: Resolution, format: PixelFormat) -> Self {
        Self {
            data,
            resolution,
            format,
            captured_at: Instant::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// A camera (or other video device) that can be opened for capture.
pub trait VideoSource: Send + 'static {
    /// Opens the device and starts streaming.
    ///
    /// Fails with [`Error::PermissionDenied`] if access to the device is refused, and with
    /// [`Error::DeviceUnavailable`] if no usable device exists.
    ///
    /// [`Error::PermissionDenied`]: crate::Error::PermissionDenied
    /// [`Error::DeviceUnavailable`]: crate::Error::DeviceUnavailable
    fn acquire(&mut self) -> Result<Box<dyn FrameStream>>;
}

/// A running video stream.
///
/// Streams are created and consumed on the detection loop's thread, so they need not be [`Send`].
pub trait FrameStream {
    /// Reads the next frame, blocking until one is available.
    fn read(&mut self) -> Result<Frame>;

    /// Returns profiling timers for the stream's internals, logged alongside the detection loop's
    /// own timers.
    fn timers(&self) -> &[Timer] {
        &[]
    }
}
