//! Mock Capture Hardware
//!
//! Provides a simulated camera for testing without physical hardware.
//! All timing uses `tokio::time`, so tests can run it under a paused clock.
//!
//! # Behaviour
//!
//! - 33ms frame readout by default (30fps simulation)
//! - 200ms autofocus settle time by default
//! - One-shot frame and autofocus registrations, cleared before their callback runs
//! - Configurable open failures for exercising fatal session errors
//!
//! In manual mode (`auto_deliver = false`) nothing fires on its own; tests drive
//! delivery with [`MockCamera::deliver_frame`] and [`MockCamera::complete_autofocus`],
//! or pull a registration out with [`MockCamera::take_frame_callback`] to play the
//! part of a driver callback that was already dispatched when the preview stopped.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use super::capabilities::{AutofocusCallback, CaptureSource, FrameCallback};
use super::resolution::{CameraParameters, Resolution};
use super::{Frame, PixelFormat, SurfaceTarget};
use crate::error::CaptureError;

/// Simulated device configuration.
#[derive(Debug, Clone)]
pub struct MockCameraConfig {
    /// Values the device reports on first open.
    pub parameters: CameraParameters,
    /// Delay between a frame request and its delivery.
    pub frame_interval: Duration,
    /// Delay between an autofocus request and its completion.
    pub autofocus_latency: Duration,
    /// Result reported to autofocus callbacks.
    pub autofocus_success: bool,
    /// Fire registrations from timer tasks; when false the test drives delivery.
    pub auto_deliver: bool,
    /// Error returned by every `open` call, if set.
    pub open_failure: Option<CaptureError>,
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            parameters: CameraParameters::default(),
            frame_interval: Duration::from_millis(33),
            autofocus_latency: Duration::from_millis(200),
            autofocus_success: true,
            auto_deliver: true,
            open_failure: None,
        }
    }
}

/// Settings the mock applied to the "hardware" when it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSettings {
    /// Negotiated preview size.
    pub preview_size: Resolution,
    /// Flash mode; always off while scanning.
    pub flash_mode: &'static str,
    /// Zoom hint encouraging the user to pull back.
    pub zoom: &'static str,
}

/// Counters describing how the camera was driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCameraStats {
    /// `open` calls, failed ones included.
    pub open_calls: u64,
    /// `close` calls.
    pub close_calls: u64,
    /// One-shot frame registrations accepted.
    pub frame_requests: u64,
    /// Frames handed to a callback.
    pub frames_delivered: u64,
    /// Frame requests that overwrote a still-outstanding registration.
    pub replaced_requests: u64,
    /// Autofocus requests accepted.
    pub autofocus_requests: u64,
    /// Autofocus callbacks invoked.
    pub autofocus_completed: u64,
}

#[derive(Default)]
struct MockState {
    open: bool,
    previewing: bool,
    resolutions: Option<(Resolution, Resolution)>,
    applied: Option<AppliedSettings>,
    frame_slot: Option<FrameCallback>,
    autofocus_slot: Option<AutofocusCallback>,
    /// Bumped whenever outstanding registrations are cancelled.
    generation: u64,
}

#[derive(Default)]
struct Counters {
    open_calls: AtomicU64,
    close_calls: AtomicU64,
    frame_requests: AtomicU64,
    frames_delivered: AtomicU64,
    replaced_requests: AtomicU64,
    autofocus_requests: AtomicU64,
    autofocus_completed: AtomicU64,
}

/// Mock camera implementing [`CaptureSource`].
///
/// # Example
///
/// ```rust,ignore
/// let camera = MockCamera::new(MockCameraConfig::default());
/// camera.open(&SurfaceTarget::new("preview", Resolution::new(480, 800))).await?;
/// camera.start_preview().await?;
/// ```
pub struct MockCamera {
    config: MockCameraConfig,
    state: Arc<Mutex<MockState>>,
    counters: Arc<Counters>,
    autofocus_log: Arc<Mutex<Vec<Instant>>>,
    sequence: Arc<AtomicU64>,
}

impl MockCamera {
    /// Create a mock camera with the given configuration.
    pub fn new(config: MockCameraConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
            counters: Arc::new(Counters::default()),
            autofocus_log: Arc::new(Mutex::new(Vec::new())),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Camera advertising `sizes` that delivers frames on its own.
    pub fn with_sizes(sizes: &str) -> Self {
        Self::new(MockCameraConfig {
            parameters: CameraParameters::with_sizes(sizes),
            ..Default::default()
        })
    }

    /// Camera whose registrations only fire when the test says so.
    pub fn manual() -> Self {
        Self::new(MockCameraConfig {
            auto_deliver: false,
            ..Default::default()
        })
    }

    /// Camera that can never be acquired.
    pub fn unavailable() -> Self {
        Self::new(MockCameraConfig {
            open_failure: Some(CaptureError::DeviceUnavailable(
                "camera in use by another process".into(),
            )),
            ..Default::default()
        })
    }

    /// Snapshot of the request counters.
    pub fn stats(&self) -> MockCameraStats {
        let c = &self.counters;
        MockCameraStats {
            open_calls: c.open_calls.load(Ordering::SeqCst),
            close_calls: c.close_calls.load(Ordering::SeqCst),
            frame_requests: c.frame_requests.load(Ordering::SeqCst),
            frames_delivered: c.frames_delivered.load(Ordering::SeqCst),
            replaced_requests: c.replaced_requests.load(Ordering::SeqCst),
            autofocus_requests: c.autofocus_requests.load(Ordering::SeqCst),
            autofocus_completed: c.autofocus_completed.load(Ordering::SeqCst),
        }
    }

    /// Times at which autofocus was requested.
    pub fn autofocus_times(&self) -> Vec<Instant> {
        self.autofocus_log.lock().clone()
    }

    /// Settings applied on first open.
    pub fn applied_settings(&self) -> Option<AppliedSettings> {
        self.state.lock().applied.clone()
    }

    /// Whether the device is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Whether a frame registration is outstanding.
    pub fn has_pending_frame_request(&self) -> bool {
        self.state.lock().frame_slot.is_some()
    }

    /// Whether an autofocus registration is outstanding.
    pub fn has_pending_autofocus(&self) -> bool {
        self.state.lock().autofocus_slot.is_some()
    }

    /// Fire the outstanding frame registration, if any.
    pub fn deliver_frame(&self) -> bool {
        deliver_frame(&self.state, &self.counters, &self.sequence, &self.config, None)
    }

    /// Remove the outstanding frame registration without firing it.
    ///
    /// The returned callback behaves like one the driver dispatched just before the
    /// registration was cancelled; invoke it with [`MockCamera::build_frame`].
    pub fn take_frame_callback(&self) -> Option<FrameCallback> {
        self.state.lock().frame_slot.take()
    }

    /// Fire the outstanding autofocus registration, if any.
    pub fn complete_autofocus(&self, success: bool) -> bool {
        complete_autofocus(&self.state, &self.counters, success, None)
    }

    /// Build a frame the way the device would for its current resolution.
    pub fn build_frame(&self) -> Frame {
        let camera = self
            .state
            .lock()
            .resolutions
            .map(|(_, camera)| camera)
            .unwrap_or(Resolution::new(64, 48));
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        generate_preview_frame(camera, self.config.parameters.preview_format.clone(), sequence)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(MockCameraConfig::default())
    }
}

/// Synthesize a preview frame: a diagonal luma gradient shifted by the frame number,
/// followed by neutral chroma.
pub fn generate_preview_frame(resolution: Resolution, format: PixelFormat, sequence: u64) -> Frame {
    let w = resolution.width as usize;
    let h = resolution.height as usize;
    let total = format.buffer_len(resolution.width, resolution.height).unwrap_or(w * h * 2);

    let mut buffer = vec![128u8; total];
    for y in 0..h {
        for x in 0..w {
            buffer[y * w + x] = ((x + y + sequence as usize) % 256) as u8;
        }
    }

    Frame::new(buffer, resolution.width, resolution.height, format, sequence)
}

fn deliver_frame(
    state: &Mutex<MockState>,
    counters: &Counters,
    sequence: &AtomicU64,
    config: &MockCameraConfig,
    generation: Option<u64>,
) -> bool {
    let (callback, camera) = {
        let mut st = state.lock();
        if generation.is_some_and(|g| g != st.generation) {
            return false;
        }
        let Some(callback) = st.frame_slot.take() else {
            return false;
        };
        let camera = st
            .resolutions
            .map(|(_, camera)| camera)
            .unwrap_or(Resolution::new(64, 48));
        (callback, camera)
    };

    let seq = sequence.fetch_add(1, Ordering::SeqCst) + 1;
    let frame = generate_preview_frame(camera, config.parameters.preview_format.clone(), seq);
    counters.frames_delivered.fetch_add(1, Ordering::SeqCst);
    callback(frame);
    true
}

fn complete_autofocus(
    state: &Mutex<MockState>,
    counters: &Counters,
    success: bool,
    generation: Option<u64>,
) -> bool {
    let callback = {
        let mut st = state.lock();
        if generation.is_some_and(|g| g != st.generation) {
            return false;
        }
        st.autofocus_slot.take()
    };

    match callback {
        Some(callback) => {
            counters.autofocus_completed.fetch_add(1, Ordering::SeqCst);
            callback(success);
            true
        }
        None => false,
    }
}

#[async_trait]
impl CaptureSource for MockCamera {
    async fn open(&self, surface: &SurfaceTarget) -> Result<(), CaptureError> {
        self.counters.open_calls.fetch_add(1, Ordering::SeqCst);

        let mut st = self.state.lock();
        if st.open {
            return Ok(());
        }
        if let Some(err) = &self.config.open_failure {
            tracing::warn!(surface = %surface.name, "MockCamera: open failed: {err}");
            return Err(err.clone());
        }

        // Parameters are read once, the first time the device is opened.
        if st.resolutions.is_none() {
            let params = &self.config.parameters;
            tracing::debug!(
                format = %params.preview_format,
                "MockCamera: default preview format"
            );
            let screen = surface.screen;
            let camera = params.camera_resolution(screen);
            tracing::debug!(%screen, %camera, "MockCamera: negotiated resolutions");
            st.resolutions = Some((screen, camera));
        }

        if let Some((_, camera)) = st.resolutions {
            tracing::debug!(%camera, "MockCamera: setting preview size");
            st.applied = Some(AppliedSettings {
                preview_size: camera,
                flash_mode: "off",
                zoom: "2.0",
            });
        }

        st.open = true;
        tracing::info!(surface = %surface.name, "MockCamera: opened");
        Ok(())
    }

    async fn close(&self) {
        self.counters.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut st = self.state.lock();
        if st.open {
            st.previewing = false;
            st.frame_slot = None;
            st.autofocus_slot = None;
            st.generation += 1;
            st.open = false;
            tracing::info!("MockCamera: closed");
        }
    }

    async fn start_preview(&self) -> Result<(), CaptureError> {
        let mut st = self.state.lock();
        if !st.open {
            return Err(CaptureError::NotOpen);
        }
        if !st.previewing {
            st.previewing = true;
            tracing::debug!("MockCamera: preview started");
        }
        Ok(())
    }

    async fn stop_preview(&self) {
        let mut st = self.state.lock();
        if st.open && st.previewing {
            st.previewing = false;
            st.frame_slot = None;
            st.autofocus_slot = None;
            st.generation += 1;
            tracing::debug!("MockCamera: preview stopped");
        }
    }

    async fn request_one_frame(&self, on_frame: FrameCallback) -> Result<(), CaptureError> {
        let generation = {
            let mut st = self.state.lock();
            if !st.open || !st.previewing {
                return Err(CaptureError::NotOpen);
            }
            if st.frame_slot.replace(on_frame).is_some() {
                self.counters.replaced_requests.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("MockCamera: frame request replaced an outstanding one");
            }
            st.generation
        };
        self.counters.frame_requests.fetch_add(1, Ordering::SeqCst);

        if self.config.auto_deliver {
            let state = Arc::clone(&self.state);
            let counters = Arc::clone(&self.counters);
            let sequence = Arc::clone(&self.sequence);
            let config = self.config.clone();
            tokio::spawn(async move {
                sleep(config.frame_interval).await;
                deliver_frame(&state, &counters, &sequence, &config, Some(generation));
            });
        }
        Ok(())
    }

    async fn request_autofocus(&self, on_complete: AutofocusCallback) -> Result<(), CaptureError> {
        let generation = {
            let mut st = self.state.lock();
            if !st.open || !st.previewing {
                return Err(CaptureError::NotOpen);
            }
            st.autofocus_slot = Some(on_complete);
            st.generation
        };
        self.counters.autofocus_requests.fetch_add(1, Ordering::SeqCst);
        self.autofocus_log.lock().push(Instant::now());

        if self.config.auto_deliver {
            let state = Arc::clone(&self.state);
            let counters = Arc::clone(&self.counters);
            let latency = self.config.autofocus_latency;
            let success = self.config.autofocus_success;
            tokio::spawn(async move {
                sleep(latency).await;
                complete_autofocus(&state, &counters, success, Some(generation));
            });
        }
        Ok(())
    }

    fn current_resolutions(&self) -> Option<(Resolution, Resolution)> {
        self.state.lock().resolutions
    }

    fn is_previewing(&self) -> bool {
        self.state.lock().previewing
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    fn surface() -> SurfaceTarget {
        SurfaceTarget::new("preview", Resolution::new(480, 800))
    }

    #[tokio::test]
    async fn open_negotiates_resolution_and_applies_settings() {
        let camera = MockCamera::with_sizes("320x480,640x960,720x1280");
        assert!(camera.current_resolutions().is_none());

        camera.open(&surface()).await.unwrap();
        let (screen, cam) = camera.current_resolutions().unwrap();
        assert_eq!(screen, Resolution::new(480, 800));
        assert_eq!(cam, Resolution::new(640, 960));

        let applied = camera.applied_settings().unwrap();
        assert_eq!(applied.preview_size, cam);
        assert_eq!(applied.flash_mode, "off");
    }

    #[tokio::test]
    async fn open_is_idempotent_and_close_is_safe() {
        let camera = MockCamera::default();
        camera.close().await;
        camera.open(&surface()).await.unwrap();
        camera.open(&surface()).await.unwrap();
        assert!(camera.is_open());
        camera.close().await;
        camera.close().await;
        assert!(!camera.is_open());
        assert_eq!(camera.stats().open_calls, 2);
    }

    #[tokio::test]
    async fn unavailable_camera_fails_to_open() {
        let camera = MockCamera::unavailable();
        let err = camera.open(&surface()).await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(!camera.is_open());
    }

    #[tokio::test]
    async fn requests_need_an_active_preview() {
        let camera = MockCamera::manual();
        let err = camera.request_one_frame(Box::new(|_| {})).await.unwrap_err();
        assert_eq!(err, CaptureError::NotOpen);

        camera.open(&surface()).await.unwrap();
        let err = camera.request_autofocus(Box::new(|_| {})).await.unwrap_err();
        assert_eq!(err, CaptureError::NotOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_is_delivered_once_after_readout() {
        let camera = MockCamera::default();
        camera.open(&surface()).await.unwrap();
        camera.start_preview().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        camera
            .request_one_frame(Box::new(move |frame| {
                let _ = tx.send(frame);
            }))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        // Screen rounded down to a multiple of 8, no sizes advertised.
        assert_eq!((frame.width, frame.height), (480, 800));
        assert_eq!(frame.data.len(), 480 * 800 * 3 / 2);
        // Sender was consumed by the one-shot callback.
        assert!(rx.recv().await.is_none());
        assert_eq!(camera.stats().frames_delivered, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn second_request_replaces_first() {
        let camera = MockCamera::manual();
        camera.open(&surface()).await.unwrap();
        camera.start_preview().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = tx.clone();
        camera
            .request_one_frame(Box::new(move |_| {
                let _ = first.send("first");
            }))
            .await
            .unwrap();
        camera
            .request_one_frame(Box::new(move |_| {
                let _ = tx.send("second");
            }))
            .await
            .unwrap();

        assert!(camera.deliver_frame());
        assert!(!camera.deliver_frame());
        assert_eq!(rx.recv().await, Some("second"));
        assert_eq!(camera.stats().replaced_requests, 1);
        assert!(logs_contain("frame request replaced an outstanding one"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_preview_cancels_outstanding_registrations() {
        let camera = MockCamera::default();
        camera.open(&surface()).await.unwrap();
        camera.start_preview().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
        let frame_tx = tx.clone();
        camera
            .request_one_frame(Box::new(move |_| {
                let _ = frame_tx.send(true);
            }))
            .await
            .unwrap();
        camera
            .request_autofocus(Box::new(move |ok| {
                let _ = tx.send(ok);
            }))
            .await
            .unwrap();

        camera.stop_preview().await;
        assert!(!camera.has_pending_frame_request());
        assert!(!camera.has_pending_autofocus());

        tokio::time::sleep(Duration::from_secs(1)).await;
        // Both callbacks were dropped unfired, closing the channel.
        assert!(rx.recv().await.is_none());
        assert_eq!(camera.stats().frames_delivered, 0);
    }

    #[tokio::test]
    async fn generated_frame_has_luma_gradient() {
        let frame = generate_preview_frame(Resolution::new(4, 2), PixelFormat::Yuv420SemiPlanar, 1);
        assert_eq!(&frame.data[..4], &[1, 2, 3, 4]);
        assert_eq!(&frame.data[4..8], &[2, 3, 4, 5]);
        assert!(frame.data[8..].iter().all(|&b| b == 128));
    }
}
