//! Capture hardware abstractions.
//!
//! - [`capabilities`]: the [`CaptureSource`] trait every camera backend implements
//! - [`resolution`]: preview size negotiation against the screen resolution
//! - [`mock`]: a simulated camera for tests and the CLI

pub mod capabilities;
pub mod mock;
pub mod resolution;

pub use capabilities::{AutofocusCallback, CaptureSource, FrameCallback};
pub use resolution::{
    find_best_preview_size, select_camera_resolution, CameraParameters, Resolution,
};

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Android-style code for `YCbCr_420_SP` (NV21).
pub const FORMAT_CODE_YUV420SP: i32 = 17;
/// Android-style code for `YCbCr_422_SP` (NV16).
pub const FORMAT_CODE_YUV422SP: i32 = 16;
/// Vendor name some devices report instead of the semi-planar code.
pub const VENDOR_YUV420P: &str = "yuv420p";

/// Pixel layout of a preview frame as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// `YCbCr_420_SP`: full luma plane followed by interleaved chroma.
    Yuv420SemiPlanar,
    /// `YCbCr_422_SP`: full luma plane followed by interleaved chroma.
    Yuv422SemiPlanar,
    /// Anything else, identified by its numeric code and the device's format string.
    Other {
        /// Platform format code.
        code: i32,
        /// `preview-format` string, when the device sent one.
        name: Option<String>,
    },
}

impl PixelFormat {
    /// Build the format from the numeric code and string a device advertises.
    pub fn from_parameters(code: i32, name: Option<&str>) -> Self {
        match code {
            FORMAT_CODE_YUV420SP => PixelFormat::Yuv420SemiPlanar,
            FORMAT_CODE_YUV422SP => PixelFormat::Yuv422SemiPlanar,
            _ => PixelFormat::Other {
                code,
                name: name.map(str::to_string),
            },
        }
    }

    /// True when the buffer starts with a contiguous `width * height` luma plane.
    ///
    /// Only the Y channel is needed for decoding, so the two semi-planar formats and
    /// the planar vendor variant are all acceptable.
    pub fn is_luma_first(&self) -> bool {
        match self {
            PixelFormat::Yuv420SemiPlanar | PixelFormat::Yuv422SemiPlanar => true,
            PixelFormat::Other { name, .. } => name.as_deref() == Some(VENDOR_YUV420P),
        }
    }

    /// Total buffer size in bytes for a frame of the given size, when known.
    pub fn buffer_len(&self, width: u32, height: u32) -> Option<usize> {
        let luma = width as usize * height as usize;
        match self {
            PixelFormat::Yuv420SemiPlanar => Some(luma + luma / 2),
            PixelFormat::Yuv422SemiPlanar => Some(luma * 2),
            PixelFormat::Other { name, .. } if name.as_deref() == Some(VENDOR_YUV420P) => {
                Some(luma + luma / 2)
            }
            PixelFormat::Other { .. } => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Yuv420SemiPlanar => write!(f, "{}/yuv420sp", FORMAT_CODE_YUV420SP),
            PixelFormat::Yuv422SemiPlanar => write!(f, "{}/yuv422sp", FORMAT_CODE_YUV422SP),
            PixelFormat::Other { code, name } => {
                write!(f, "{}/{}", code, name.as_deref().unwrap_or("null"))
            }
        }
    }
}

impl FromStr for PixelFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Ok(match name.as_str() {
            "yuv420sp" | "nv21" => PixelFormat::Yuv420SemiPlanar,
            "yuv422sp" | "nv16" => PixelFormat::Yuv422SemiPlanar,
            _ => PixelFormat::Other {
                code: 0,
                name: Some(name),
            },
        })
    }
}

/// Where the camera draws its preview, plus the display it lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceTarget {
    /// Identifier of the render surface.
    pub name: String,
    /// Display resolution, used only to size the scan region.
    pub screen: Resolution,
}

impl SurfaceTarget {
    /// Create a surface target for the given display resolution.
    pub fn new(name: impl Into<String>, screen: Resolution) -> Self {
        Self {
            name: name.into(),
            screen,
        }
    }
}

/// One still preview frame.
///
/// The buffer is immutable and reference counted, so moving a frame to the decode
/// worker never copies pixel data and the capture side cannot mutate it afterwards.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel bytes, luma plane first for supported formats.
    pub data: Bytes,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout tag.
    pub format: PixelFormat,
    /// Device frame counter.
    pub sequence: u64,
}

impl Frame {
    /// Wrap a captured buffer.
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            sequence,
        }
    }

    /// Size of the leading luma plane in bytes.
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
