//! Capture Source Capability
//!
//! This module defines the contract a camera backend presents to the scan pipeline.
//! The pipeline never talks to hardware directly; it only sees a [`CaptureSource`]
//! handed to it as an owned `Arc<dyn CaptureSource>`.
//!
//! # One-shot registrations
//!
//! Frame and autofocus requests register a callback that fires at most once. The
//! callbacks are `FnOnce`, so an implementation has to move the registration out of
//! its slot to call it; a fired registration cannot fire again.
//!
//! Callbacks run on the device's own context (a driver thread, a timer task). They
//! must not block: the pipeline's callbacks only post a message to the coordinator.
//!
//! # Example
//!
//! ```rust,ignore
//! camera.open(&surface).await?;
//! camera.start_preview().await?;
//! camera
//!     .request_one_frame(Box::new(move |frame| {
//!         let _ = tx.send(frame);
//!     }))
//!     .await?;
//! ```

use super::{Frame, Resolution, SurfaceTarget};
use crate::error::CaptureError;
use async_trait::async_trait;

/// Single-use frame registration.
pub type FrameCallback = Box<dyn FnOnce(Frame) + Send + 'static>;

/// Single-use autofocus registration; the flag reports whether focus succeeded.
pub type AutofocusCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Capability: Still Frame Capture with Autofocus
///
/// # Contract
/// - `open` is idempotent; opening an open device is a no-op
/// - `close` always succeeds, also when the device was never opened
/// - `stop_preview` cancels any outstanding frame and autofocus registrations
/// - `request_one_frame` while a previous request is outstanding replaces it
///   (last writer wins); callers must not rely on this and should never double-arm
/// - Registrations are cleared before their callback runs
///
/// # Thread Safety
/// - All methods take `&self`; implementations use interior mutability
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire the device and bind it to the render surface.
    ///
    /// # Returns
    /// - Ok(()) once the device is open (or was already open)
    /// - Err(CaptureError::DeviceUnavailable) if the hardware cannot be acquired
    /// - Err(CaptureError::BindFailed) if the surface cannot be attached
    async fn open(&self, surface: &SurfaceTarget) -> Result<(), CaptureError>;

    /// Release the device.
    async fn close(&self);

    /// Start continuous frame flow to the hardware preview.
    async fn start_preview(&self) -> Result<(), CaptureError>;

    /// Stop frame flow and drop outstanding registrations.
    async fn stop_preview(&self);

    /// Register a callback for the next preview frame.
    ///
    /// # Returns
    /// - Ok(()) if the registration was accepted
    /// - Err(CaptureError::NotOpen) if the device is closed or not previewing
    async fn request_one_frame(&self, on_frame: FrameCallback) -> Result<(), CaptureError>;

    /// Start a hardware autofocus pass and register its completion callback.
    ///
    /// # Returns
    /// - Ok(()) if autofocus was started
    /// - Err(CaptureError::NotOpen) if the device is closed or not previewing
    async fn request_autofocus(&self, on_complete: AutofocusCallback) -> Result<(), CaptureError>;

    /// Screen and negotiated camera resolution.
    ///
    /// Returns `None` until the device has been opened at least once.
    fn current_resolutions(&self) -> Option<(Resolution, Resolution)>;

    /// Whether preview frames are currently flowing.
    fn is_previewing(&self) -> bool;
}
