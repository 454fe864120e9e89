//! Custom error types for the scanning pipeline.
//!
//! This module defines the error taxonomy shared by every component of the crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! failures coming from the capture hardware, the decode worker, configuration loading,
//! and the coordinator's state machine.
//!
//! ## Error Hierarchy
//!
//! - **`CaptureError`**: Raised by a [`CaptureSource`](crate::hardware::CaptureSource).
//!   `DeviceUnavailable` and `BindFailed` are fatal for a session and are never retried
//!   automatically; the caller decides whether to try again.
//! - **`DecodeError`**: Raised on the decode path. Everything except `WorkerUnavailable`
//!   is recoverable: the cycle treats it as a miss and re-arms. `WorkerUnavailable`
//!   means the worker is gone and is surfaced to the UI as an error event.
//! - **`ScanError`**: The crate-level error that wraps the two above plus configuration
//!   problems and illegal state machine commands.
//!
//! Errors themselves are not `Clone`, so anything that has to travel to the UI as an
//! event is first reduced to a [`ScanErrorKind`].

use crate::hardware::PixelFormat;
use crate::pipeline::PipelineState;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Failures reported by a capture source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The device could not be opened, typically because another client holds it.
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device opened but could not render into the preview surface.
    #[error("Failed to bind camera to render target: {0}")]
    BindFailed(String),

    /// A request needed an open, previewing device.
    #[error("Camera is not open or not previewing")]
    NotOpen,
}

/// Failures on the decode path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No luma plane can be read from this pixel format.
    #[error("Unsupported picture format: {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("Frame buffer too small: expected at least {expected} bytes, got {actual}")]
    /// The buffer is shorter than its dimensions and format require.
    FrameTooSmall {
        /// Bytes needed for the luma plane.
        expected: usize,
        /// Bytes delivered.
        actual: usize,
    },

    /// The scan region reaches outside the frame.
    #[error("Crop rectangle does not fit within image data")]
    CropOutsideFrame,

    /// The worker thread has stopped; nothing more will be decoded.
    #[error("Decode worker is not running")]
    WorkerUnavailable,
}

impl DecodeError {
    /// Whether the scan cycle can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DecodeError::WorkerUnavailable)
    }
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Capture source failure.
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Decode path failure.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but holds an unusable value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Command '{command}' is not valid in state {state:?}")]
    /// Command rejected by the state machine.
    InvalidTransition {
        /// State the pipeline was in.
        state: PipelineState,
        /// Rejected command.
        command: &'static str,
    },

    /// The coordinator has shut down.
    #[error("Scan pipeline is closed")]
    PipelineClosed,

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloneable classification of an error, suitable for sending to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// [`CaptureError::DeviceUnavailable`]
    DeviceUnavailable,
    /// [`CaptureError::BindFailed`]
    BindFailed,
    /// [`CaptureError::NotOpen`]
    NotOpen,
    /// [`DecodeError::UnsupportedFormat`]
    UnsupportedFormat,
    /// [`DecodeError::FrameTooSmall`]
    FrameTooSmall,
    /// [`DecodeError::CropOutsideFrame`]
    CropOutsideFrame,
    /// [`DecodeError::WorkerUnavailable`]
    WorkerUnavailable,
    /// [`ScanError::Config`] or [`ScanError::Configuration`]
    Configuration,
    /// [`ScanError::InvalidTransition`]
    InvalidTransition,
    /// [`ScanError::PipelineClosed`]
    PipelineClosed,
    /// [`ScanError::Io`]
    Io,
}

impl CaptureError {
    /// Event-friendly classification.
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            CaptureError::DeviceUnavailable(_) => ScanErrorKind::DeviceUnavailable,
            CaptureError::BindFailed(_) => ScanErrorKind::BindFailed,
            CaptureError::NotOpen => ScanErrorKind::NotOpen,
        }
    }
}

impl DecodeError {
    /// Event-friendly classification.
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            DecodeError::UnsupportedFormat(_) => ScanErrorKind::UnsupportedFormat,
            DecodeError::FrameTooSmall { .. } => ScanErrorKind::FrameTooSmall,
            DecodeError::CropOutsideFrame => ScanErrorKind::CropOutsideFrame,
            DecodeError::WorkerUnavailable => ScanErrorKind::WorkerUnavailable,
        }
    }
}

impl ScanError {
    /// Event-friendly classification.
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            ScanError::Capture(err) => err.kind(),
            ScanError::Decode(err) => err.kind(),
            ScanError::Config(_) | ScanError::Configuration(_) => ScanErrorKind::Configuration,
            ScanError::InvalidTransition { .. } => ScanErrorKind::InvalidTransition,
            ScanError::PipelineClosed => ScanErrorKind::PipelineClosed,
            ScanError::Io(_) => ScanErrorKind::Io,
        }
    }

    /// Fatal errors end the session; the UI decides whether to open a new one.
    pub fn is_fatal(&self) -> bool {
        match self {
            ScanError::Capture(_) | ScanError::PipelineClosed | ScanError::Io(_) => true,
            ScanError::Decode(err) => !err.is_recoverable(),
            ScanError::Config(_) | ScanError::Configuration(_) => true,
            ScanError::InvalidTransition { .. } => false,
        }
    }
}
