//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/default.toml` (base configuration)
//! 2. Environment variables prefixed with `RUST_SCAN_`, nested keys separated by `__`
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration.
//!
//! # Example
//! ```no_run
//! use rust_scan::config::ScanConfig;
//!
//! let config = ScanConfig::load()?;
//! config.validate()?;
//! println!("Formats: {}", config.symbologies.mask().describe());
//! # Ok::<(), rust_scan::error::ScanError>(())
//! ```
//!
//! `RUST_SCAN_PIPELINE__AUTOFOCUS_INTERVAL_MS=2000` overrides
//! `pipeline.autofocus_interval_ms`.

use crate::decode::SymbologyMask;
use crate::error::{ScanError, ScanResult};
use crate::hardware::mock::MockCameraConfig;
use crate::hardware::{CameraParameters, PixelFormat, Resolution};
use crate::region::RegionPolicy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "RUST_SCAN_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Name and logging
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Symbologies the decoder looks for
    #[serde(default)]
    pub symbologies: SymbologyConfig,
    /// Coordinator tuning
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Scan region clamp bounds
    #[serde(default)]
    pub region: RegionPolicy,
    /// Simulated camera used by the CLI
    #[serde(default)]
    pub camera: CameraSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Per-symbology switches, read once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbologyConfig {
    /// QR Code
    #[serde(default = "default_enabled")]
    pub qr_code: bool,
    /// Data Matrix
    #[serde(default = "default_enabled")]
    pub data_matrix: bool,
    /// EAN-8, EAN-13, UPC-A and UPC-E
    #[serde(default = "default_enabled")]
    pub ean: bool,
    /// Code 39
    #[serde(default = "default_enabled")]
    pub code39: bool,
    /// Code 128
    #[serde(default = "default_enabled")]
    pub code128: bool,
}

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Minimum spacing between autofocus requests in milliseconds
    #[serde(default = "default_autofocus_interval")]
    pub autofocus_interval_ms: u64,
    /// Payload marker that triggers an internal restart
    #[serde(default = "default_sentinel")]
    pub sentinel: char,
    /// UI command channel capacity
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

/// Mock camera settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Simulated display width in pixels
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    /// Simulated display height in pixels
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Advertised preview sizes, e.g. `"320x480,640x960"`
    #[serde(default)]
    pub preview_size_values: Option<String>,
    /// Preview format name (yuv420sp, yuv422sp, yuv420p, ...)
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    /// Delay before a requested frame is delivered
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    /// Delay before an autofocus request completes
    #[serde(default = "default_autofocus_latency")]
    pub autofocus_latency_ms: u64,
}

// Default value functions
fn default_name() -> String {
    "Rust Scan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_autofocus_interval() -> u64 {
    1500
}

fn default_sentinel() -> char {
    '*'
}

fn default_command_capacity() -> usize {
    32
}

fn default_screen_width() -> u32 {
    480
}

fn default_screen_height() -> u32 {
    800
}

fn default_pixel_format() -> String {
    "yuv420sp".to_string()
}

fn default_frame_interval() -> u64 {
    33
}

fn default_autofocus_latency() -> u64 {
    200
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SymbologyConfig {
    fn default() -> Self {
        Self {
            qr_code: true,
            data_matrix: true,
            ean: true,
            code39: true,
            code128: true,
        }
    }
}

impl SymbologyConfig {
    /// Format mask handed to the decoder.
    pub fn mask(&self) -> SymbologyMask {
        let mut mask = SymbologyMask::empty();
        mask.set(SymbologyMask::QR_CODE, self.qr_code);
        mask.set(SymbologyMask::DATA_MATRIX, self.data_matrix);
        mask.set(SymbologyMask::EAN, self.ean);
        mask.set(SymbologyMask::CODE39, self.code39);
        mask.set(SymbologyMask::CODE128, self.code128);
        mask
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            autofocus_interval_ms: default_autofocus_interval(),
            sentinel: default_sentinel(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            preview_size_values: None,
            pixel_format: default_pixel_format(),
            frame_interval_ms: default_frame_interval(),
            autofocus_latency_ms: default_autofocus_latency(),
        }
    }
}

impl CameraSettings {
    /// Simulated display size.
    pub fn screen(&self) -> Resolution {
        Resolution::new(self.screen_width, self.screen_height)
    }

    /// Parameters the simulated device advertises.
    pub fn parameters(&self) -> CameraParameters {
        let format = self
            .pixel_format
            .parse::<PixelFormat>()
            .unwrap_or(PixelFormat::Yuv420SemiPlanar);
        CameraParameters {
            preview_size_values: self.preview_size_values.clone(),
            preview_size_value: None,
            preview_format: format,
        }
    }

    /// Mock device configuration for these settings.
    pub fn mock_config(&self) -> MockCameraConfig {
        MockCameraConfig {
            parameters: self.parameters(),
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            autofocus_latency: Duration::from_millis(self.autofocus_latency_ms),
            ..Default::default()
        }
    }
}

impl ScanConfig {
    /// Load configuration from `config/default.toml` and environment variables
    pub fn load() -> ScanResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let config = Figment::from(Serialized::defaults(ScanConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ScanResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ScanError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.pipeline.autofocus_interval_ms == 0 {
            return Err(ScanError::Configuration(
                "autofocus_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.command_capacity == 0 {
            return Err(ScanError::Configuration(
                "command_capacity must be greater than 0".to_string(),
            ));
        }

        let r = &self.region;
        if r.min_width > r.max_width || r.min_height > r.max_height {
            return Err(ScanError::Configuration(format!(
                "Invalid region bounds: min {}x{} exceeds max {}x{}",
                r.min_width, r.min_height, r.max_width, r.max_height
            )));
        }

        if self.symbologies.mask().is_empty() {
            return Err(ScanError::Configuration(
                "At least one symbology must be enabled".to_string(),
            ));
        }

        if self.camera.screen_width == 0 || self.camera.screen_height == 0 {
            return Err(ScanError::Configuration(
                "Screen resolution must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
