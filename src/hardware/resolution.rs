//! Preview size negotiation.
//!
//! Cameras advertise the preview sizes they support as a comma separated list of
//! `WIDTHxHEIGHT` entries. The size closest to the screen (by L1 distance) wins, so
//! the preview needs as little scaling as possible. When the device advertises
//! nothing usable, the screen resolution is used, rounded down to a multiple of 8
//! along each axis since the screen may not be.

use super::PixelFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Integer width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Horizontal size.
    pub width: u32,
    /// Vertical size.
    pub height: u32,
}

impl Resolution {
    /// Create a resolution.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// L1 distance between two resolutions.
    pub fn manhattan_distance(&self, other: &Resolution) -> u64 {
        u64::from(self.width.abs_diff(other.width)) + u64::from(self.height.abs_diff(other.height))
    }

    /// Round each axis down to a multiple of 8.
    pub fn rounded_down_to_8(&self) -> Resolution {
        Resolution::new(self.width & !7, self.height & !7)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Error for a malformed `WIDTHxHEIGHT` string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Bad preview-size: {0}")]
pub struct ResolutionParseError(pub String);

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (x, y) = trimmed
            .split_once('x')
            .ok_or_else(|| ResolutionParseError(trimmed.to_string()))?;
        let width = x
            .parse::<u32>()
            .map_err(|_| ResolutionParseError(trimmed.to_string()))?;
        let height = y
            .parse::<u32>()
            .map_err(|_| ResolutionParseError(trimmed.to_string()))?;
        Ok(Resolution::new(width, height))
    }
}

/// Values read once from the device when it is first opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraParameters {
    /// `preview-size-values`: the usual list of supported sizes.
    pub preview_size_values: Option<String>,
    /// `preview-size-value`: the singular key some devices use instead.
    pub preview_size_value: Option<String>,
    /// Native preview format.
    pub preview_format: PixelFormat,
}

impl CameraParameters {
    /// Parameters advertising the given size list in 4:2:0 semi-planar.
    pub fn with_sizes(sizes: impl Into<String>) -> Self {
        Self {
            preview_size_values: Some(sizes.into()),
            preview_size_value: None,
            preview_format: PixelFormat::Yuv420SemiPlanar,
        }
    }

    /// The advertised size list, preferring the plural key.
    pub fn advertised_sizes(&self) -> Option<&str> {
        self.preview_size_values
            .as_deref()
            .or(self.preview_size_value.as_deref())
    }

    /// Negotiate the capture size for the given screen.
    pub fn camera_resolution(&self, screen: Resolution) -> Resolution {
        select_camera_resolution(self.advertised_sizes(), screen)
    }
}

impl Default for CameraParameters {
    fn default() -> Self {
        Self {
            preview_size_values: None,
            preview_size_value: None,
            preview_format: PixelFormat::Yuv420SemiPlanar,
        }
    }
}

/// Pick the capture resolution for `screen` from an optional advertised list.
pub fn select_camera_resolution(advertised: Option<&str>, screen: Resolution) -> Resolution {
    let best = advertised.and_then(|sizes| {
        tracing::debug!(sizes, "preview-size-values parameter");
        find_best_preview_size(sizes, screen)
    });

    best.unwrap_or_else(|| screen.rounded_down_to_8())
}

/// Candidate closest to `screen` by L1 distance.
///
/// Ties go to the first candidate seen; an exact match ends the search. Malformed
/// entries are skipped. Returns `None` when no candidate with two non-zero
/// dimensions was found.
pub fn find_best_preview_size(sizes: &str, screen: Resolution) -> Option<Resolution> {
    let mut best: Option<(Resolution, u64)> = None;

    for entry in sizes.split(',') {
        let candidate = match entry.parse::<Resolution>() {
            Ok(candidate) => candidate,
            Err(err) => {
                tracing::warn!("{err}");
                continue;
            }
        };

        let diff = candidate.manhattan_distance(&screen);
        if diff == 0 {
            best = Some((candidate, 0));
            break;
        }
        if best.map_or(true, |(_, best_diff)| diff < best_diff) {
            best = Some((candidate, diff));
        }
    }

    best.map(|(resolution, _)| resolution)
        .filter(|r| r.width > 0 && r.height > 0)
}
