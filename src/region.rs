//! Scan region geometry.
//!
//! The scan region is the rectangle the UI frames for the user and the only part of
//! each preview frame handed to the decoder. It is sized at three quarters of the
//! screen, clamped so it stays big enough to aim at and small enough to force the
//! user to hold the device far enough away for the image to be in focus.

use crate::hardware::Resolution;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest scan region width in display pixels.
pub const MIN_FRAME_WIDTH: u32 = 240;
/// Smallest scan region height in display pixels.
pub const MIN_FRAME_HEIGHT: u32 = 240;
/// Largest scan region width in display pixels.
pub const MAX_FRAME_WIDTH: u32 = 480;
/// Largest scan region height in display pixels.
pub const MAX_FRAME_HEIGHT: u32 = 360;

/// Axis-aligned rectangle, right and bottom exclusive.
///
/// Coordinates are signed: on a screen smaller than the minimum region the
/// centered rectangle starts left of (or above) the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    /// First column inside.
    pub left: i32,
    /// First row inside.
    pub top: i32,
    /// First column past the right edge.
    pub right: i32,
    /// First row past the bottom edge.
    pub bottom: i32,
}

impl Rect {
    /// Create a rectangle from its edges.
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent.
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Vertical extent.
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}, {} - {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Clamp bounds for the scan region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPolicy {
    /// Narrowest region, display pixels.
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    /// Shortest region, display pixels.
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    /// Widest region, display pixels.
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// Tallest region, display pixels.
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

fn default_min_width() -> u32 {
    MIN_FRAME_WIDTH
}

fn default_min_height() -> u32 {
    MIN_FRAME_HEIGHT
}

fn default_max_width() -> u32 {
    MAX_FRAME_WIDTH
}

fn default_max_height() -> u32 {
    MAX_FRAME_HEIGHT
}

impl Default for RegionPolicy {
    fn default() -> Self {
        Self {
            min_width: MIN_FRAME_WIDTH,
            min_height: MIN_FRAME_HEIGHT,
            max_width: MAX_FRAME_WIDTH,
            max_height: MAX_FRAME_HEIGHT,
        }
    }
}

impl RegionPolicy {
    /// Centered display-space rectangle for `screen`.
    ///
    /// If a minimum exceeds its maximum the maximum wins.
    pub fn scan_region(&self, screen: Resolution) -> Rect {
        let width = three_quarters(screen.width)
            .max(self.min_width)
            .min(self.max_width);
        let height = three_quarters(screen.height)
            .max(self.min_height)
            .min(self.max_height);

        let left = (screen.width as i32 - width as i32) / 2;
        let top = (screen.height as i32 - height as i32) / 2;
        Rect::new(left, top, left + width as i32, top + height as i32)
    }
}

fn three_quarters(v: u32) -> u32 {
    (u64::from(v) * 3 / 4) as u32
}

/// Display-space scan region using the default sizing policy.
pub fn compute_scan_region(screen: Resolution) -> Rect {
    RegionPolicy::default().scan_region(screen)
}

/// Map a display-space rectangle into camera-buffer coordinates.
///
/// Each edge is scaled by `camera / screen` along its own axis.
pub fn project_to_camera_space(rect: Rect, screen: Resolution, camera: Resolution) -> Rect {
    let scale = |v: i32, cam: u32, scr: u32| -> i32 {
        if scr == 0 {
            return 0;
        }
        (i64::from(v) * i64::from(cam) / i64::from(scr)) as i32
    };

    Rect::new(
        scale(rect.left, camera.width, screen.width),
        scale(rect.top, camera.height, screen.height),
        scale(rect.right, camera.width, screen.width),
        scale(rect.bottom, camera.height, screen.height),
    )
}

/// The scan region in both coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRegion {
    /// Where the UI draws the viewfinder.
    pub display: Rect,
    /// The part of each camera buffer handed to the decoder.
    pub preview: Rect,
}

/// Lazily computed scan region, kept until either resolution changes.
#[derive(Debug, Clone, Default)]
pub struct RegionCache {
    policy: RegionPolicy,
    cached: Option<(Resolution, Resolution, ScanRegion)>,
}

impl RegionCache {
    /// Create an empty cache using `policy`.
    pub fn new(policy: RegionPolicy) -> Self {
        Self {
            policy,
            cached: None,
        }
    }

    /// Scan region for the given resolutions, computing it only when they changed.
    pub fn region(&mut self, screen: Resolution, camera: Resolution) -> ScanRegion {
        if let Some((s, c, region)) = self.cached {
            if s == screen && c == camera {
                return region;
            }
        }

        let display_rect = self.policy.scan_region(screen);
        let preview_rect = project_to_camera_space(display_rect, screen, camera);
        tracing::debug!(
            display = %display_rect,
            preview = %preview_rect,
            "Calculated scan region"
        );

        let region = ScanRegion {
            display: display_rect,
            preview: preview_rect,
        };
        self.cached = Some((screen, camera, region));
        region
    }

    /// Last computed region, if any.
    pub fn current(&self) -> Option<ScanRegion> {
        self.cached.map(|(_, _, region)| region)
    }

    /// Drop the cached region.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn portrait_phone_region() {
        let screen = Resolution::new(480, 800);
        let display = compute_scan_region(screen);
        assert_eq!(display, Rect::new(60, 220, 420, 580));

        let preview = project_to_camera_space(display, screen, Resolution::new(640, 960));
        assert_eq!(preview, Rect::new(80, 264, 560, 696));
    }

    #[test]
    fn large_screen_hits_maximum() {
        let display = compute_scan_region(Resolution::new(1920, 1080));
        assert_eq!(display.width(), 480);
        assert_eq!(display.height(), 360);
        assert_eq!(display, Rect::new(720, 360, 1200, 720));
    }

    #[test]
    fn tiny_screen_hits_minimum_and_stays_centered() {
        let display = compute_scan_region(Resolution::new(200, 100));
        assert_eq!(display.width(), 240);
        assert_eq!(display.height(), 240);
        assert_eq!(display.left, -20);
        assert_eq!(display.top, -70);
    }

    #[test]
    fn inverted_bounds_fall_back_to_maximum() {
        let policy = RegionPolicy {
            min_width: 500,
            min_height: 400,
            max_width: 300,
            max_height: 200,
        };
        let display = policy.scan_region(Resolution::new(480, 800));
        assert_eq!(display.width(), 300);
        assert_eq!(display.height(), 200);
        assert_eq!(display, Rect::new(90, 300, 390, 500));
    }

    #[test]
    fn cache_recomputes_only_on_change() {
        let mut cache = RegionCache::default();
        assert!(cache.current().is_none());

        let screen = Resolution::new(480, 800);
        let first = cache.region(screen, Resolution::new(640, 960));
        let again = cache.region(screen, Resolution::new(640, 960));
        assert_eq!(first, again);

        let other = cache.region(screen, Resolution::new(480, 800));
        assert_eq!(other.display, first.display);
        assert_eq!(other.preview, other.display);

        cache.invalidate();
        assert!(cache.current().is_none());
    }

    proptest! {
        #[test]
        fn region_is_clamped_and_centered(w in 1u32..8192, h in 1u32..8192) {
            let screen = Resolution::new(w, h);
            let r = compute_scan_region(screen);

            prop_assert!((240..=480).contains(&r.width()));
            prop_assert!((240..=360).contains(&r.height()));

            // Symmetric margins, up to the integer-division remainder.
            let right_margin = w as i32 - r.right;
            let bottom_margin = h as i32 - r.bottom;
            prop_assert!((r.left - right_margin).abs() <= 1);
            prop_assert!((r.top - bottom_margin).abs() <= 1);
        }

        #[test]
        fn identity_projection_is_noop(w in 1u32..4096, h in 1u32..4096) {
            let screen = Resolution::new(w, h);
            let r = compute_scan_region(screen);
            prop_assert_eq!(project_to_camera_space(r, screen, screen), r);
        }
    }
}
