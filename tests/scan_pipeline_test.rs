//! Integration tests for the scan pipeline.
//!
//! These drive a `ScanPipeline` end to end against the mock camera and a scripted
//! decoder, checking the ordering and exclusivity guarantees of the scan cycle.

use rust_scan::decode::{DecodeResult, Decoder, ScriptedDecoder, Symbology, SymbologyMask};
use rust_scan::error::{CaptureError, ScanError, ScanErrorKind};
use rust_scan::hardware::mock::{MockCamera, MockCameraConfig};
use rust_scan::hardware::{CameraParameters, PixelFormat, Resolution, SurfaceTarget};
use rust_scan::pipeline::{PipelineConfig, PipelineState, ScanEvent, ScanPipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn surface() -> SurfaceTarget {
    SurfaceTarget::new("preview", Resolution::new(480, 800))
}

fn spawn(
    camera: &Arc<MockCamera>,
    decoder: ScriptedDecoder,
) -> (ScanPipeline, mpsc::UnboundedReceiver<ScanEvent>) {
    ScanPipeline::spawn(camera.clone(), decoder, PipelineConfig::default()).unwrap()
}

/// The camera stamps a request slightly after the coordinator checks the interval.
const CLOCK_SLACK: Duration = Duration::from_millis(2);

/// Pipeline with a short autofocus interval, so cadence tests run on the real clock.
fn spawn_with_interval(
    camera: &Arc<MockCamera>,
    interval: Duration,
) -> (ScanPipeline, mpsc::UnboundedReceiver<ScanEvent>) {
    let config = PipelineConfig {
        autofocus_interval: interval,
        ..Default::default()
    };
    ScanPipeline::spawn(camera.clone(), ScriptedDecoder::new(), config).unwrap()
}

fn fast_camera() -> Arc<MockCamera> {
    Arc::new(MockCamera::new(MockCameraConfig {
        frame_interval: Duration::from_millis(5),
        autofocus_latency: Duration::from_millis(10),
        ..Default::default()
    }))
}

/// Decoder that fails hard on every call.
struct PanickingDecoder;

impl Decoder for PanickingDecoder {
    #[allow(clippy::panic)]
    fn decode(
        &mut self,
        _buffer: &[u8],
        _width: u32,
        _height: u32,
        _bit_depth: u8,
        _formats: SymbologyMask,
    ) -> Option<DecodeResult> {
        panic!("corrupt decoder state");
    }
}

/// Collect events up to and including the first `Decoded`.
async fn events_until_decoded(events: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let done = matches!(event, ScanEvent::Decoded { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

// =============================================================================
// Result dispatch
// =============================================================================

#[tokio::test]
async fn test_sentinel_payload_restarts_without_decoded_event() {
    let camera = Arc::new(MockCamera::default());
    let (pipeline, mut events) = spawn(&camera, ScriptedDecoder::from_payloads(&["ABC*123", "ABC123"]));

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();

    let seen = events_until_decoded(&mut events).await;
    assert_eq!(
        seen,
        vec![
            ScanEvent::RestartRequested {
                text: "ABC*123".into()
            },
            ScanEvent::Decoded {
                text: "ABC123".into(),
                symbology: Symbology::QrCode
            },
        ]
    );

    let status = pipeline.status().await.unwrap();
    assert_eq!(status.state, PipelineState::AwaitingUserAction);
    assert_eq!(status.matches, 2);
    assert_eq!(camera.stats().frame_requests, 2);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_plain_payload_is_decoded_exactly_once() {
    let camera = Arc::new(MockCamera::default());
    let (pipeline, mut events) = spawn(&camera, ScriptedDecoder::from_payloads(&["ABC123"]));

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();

    assert_eq!(
        events.recv().await,
        Some(ScanEvent::Decoded {
            text: "ABC123".into(),
            symbology: Symbology::QrCode
        })
    );

    // Suspended: no further frame is requested until the user acts.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(camera.stats().frame_requests, 1);
    assert!(!camera.has_pending_frame_request());

    pipeline.shutdown().await.unwrap();
}

// =============================================================================
// Ordering and exclusivity
// =============================================================================

#[tokio::test]
async fn test_every_frame_yields_exactly_one_outcome() {
    let camera = Arc::new(MockCamera::default());
    let decoder = ScriptedDecoder::from_payloads(&["", "", "", "XYZ"]);
    let recorder = decoder.clone();
    let (pipeline, mut events) = spawn(&camera, decoder);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();

    let seen = events_until_decoded(&mut events).await;
    assert_eq!(seen.len(), 4);
    assert!(seen[..3].iter().all(|e| *e == ScanEvent::NoMatch));

    let status = pipeline.status().await.unwrap();
    assert_eq!(status.frames_requested, 4);
    assert_eq!(status.frames_decoded, 4);
    assert_eq!(status.misses, 3);
    assert_eq!(status.matches, 1);
    assert_eq!(recorder.calls().len(), 4);

    let stats = camera.stats();
    assert_eq!(stats.frames_delivered, 4);
    assert_eq!(stats.replaced_requests, 0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_at_most_one_decode_in_flight() {
    let camera = Arc::new(MockCamera::new(MockCameraConfig {
        frame_interval: Duration::from_millis(1),
        ..Default::default()
    }));
    let mut payloads = vec![""; 12];
    payloads.push("DONE");
    let decoder = ScriptedDecoder::from_payloads(&payloads).with_delay(Duration::from_millis(5));
    let recorder = decoder.clone();
    let (pipeline, mut events) = spawn(&camera, decoder);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    events_until_decoded(&mut events).await;

    assert_eq!(recorder.calls().len(), 13);
    assert_eq!(recorder.peak_concurrency(), 1);
    assert_eq!(camera.stats().replaced_requests, 0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_decoder_receives_cropped_luma_and_format_mask() {
    let camera = Arc::new(MockCamera::with_sizes("320x480,640x960,720x1280"));
    let decoder = ScriptedDecoder::from_payloads(&["ABC123"]);
    let recorder = decoder.clone();
    let (pipeline, mut events) = spawn(&camera, decoder);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    events_until_decoded(&mut events).await;

    // 480x800 screen, 640x960 camera: the region projects to 480x432 buffer pixels.
    let call = &recorder.calls()[0];
    assert_eq!((call.width, call.height), (480, 432));
    assert_eq!(call.len, 480 * 432);
    assert_eq!(call.bit_depth, 8);
    assert_eq!(call.formats, PipelineConfig::default().formats);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_format_counts_as_miss() {
    let camera = Arc::new(MockCamera::new(MockCameraConfig {
        parameters: CameraParameters {
            preview_format: PixelFormat::Other {
                code: 4,
                name: Some("rgb565".into()),
            },
            ..Default::default()
        },
        ..Default::default()
    }));
    let decoder = ScriptedDecoder::from_payloads(&["NEVER"]);
    let recorder = decoder.clone();
    let (pipeline, mut events) = spawn(&camera, decoder);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();

    for _ in 0..3 {
        assert_eq!(events.recv().await, Some(ScanEvent::NoMatch));
    }
    assert!(recorder.calls().is_empty());

    let status = pipeline.status().await.unwrap();
    assert!(status.misses >= 3);
    assert_ne!(status.state, PipelineState::Idle);

    pipeline.shutdown().await.unwrap();
}

// =============================================================================
// Stop and stale callbacks
// =============================================================================

#[tokio::test]
async fn test_stale_frame_after_stop_is_ignored() {
    let camera = Arc::new(MockCamera::manual());
    let decoder = ScriptedDecoder::from_payloads(&["ABC123"]);
    let recorder = decoder.clone();
    let (pipeline, mut events) = spawn(&camera, decoder);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();

    // The driver already dispatched the callback when the preview was stopped.
    let callback = camera.take_frame_callback().unwrap();
    pipeline.stop().await.unwrap();
    let before = pipeline.status().await.unwrap();
    callback(camera.build_frame());

    let status = pipeline.status().await.unwrap();
    assert_eq!(status.state, PipelineState::Idle);
    assert_eq!(status.epoch, before.epoch);
    assert_eq!(status.frames_decoded, 0);
    assert_eq!(status.stale_discarded, 1);
    assert!(events.try_recv().is_err());
    assert!(recorder.calls().is_empty());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_decoding_suppresses_outcome() {
    let camera = Arc::new(MockCamera::manual());
    let decoder = ScriptedDecoder::from_payloads(&["ABC123"]).with_delay(Duration::from_millis(50));
    let (pipeline, mut events) = spawn(&camera, decoder);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    assert!(camera.deliver_frame());
    pipeline.stop().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());

    let status = pipeline.status().await.unwrap();
    assert_eq!(status.state, PipelineState::Idle);
    assert_eq!(status.stale_discarded, 1);
    assert!(!status.previewing);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_safe_from_every_state() {
    let camera = Arc::new(MockCamera::manual());
    let (pipeline, _events) = spawn(&camera, ScriptedDecoder::new());

    pipeline.stop().await.unwrap();
    pipeline.open(surface()).await.unwrap();
    pipeline.stop().await.unwrap();

    pipeline.start().await.unwrap();
    pipeline.stop().await.unwrap();
    pipeline.stop().await.unwrap();

    assert_eq!(pipeline.status().await.unwrap().state, PipelineState::Idle);
    assert!(!camera.has_pending_frame_request());
    pipeline.shutdown().await.unwrap();
}

// =============================================================================
// Autofocus cadence
// =============================================================================

#[tokio::test]
async fn test_autofocus_cadence_while_previewing() {
    let interval = Duration::from_millis(100);
    let camera = fast_camera();
    let (pipeline, _events) = spawn_with_interval(&camera, interval);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    pipeline.stop().await.unwrap();

    let times = camera.autofocus_times();
    assert!(times.len() >= 3, "only {} autofocus requests", times.len());
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap + CLOCK_SLACK >= interval, "autofocus gap {gap:?}");
    }
    assert_eq!(
        pipeline.status().await.unwrap().autofocus_requests,
        times.len() as u64
    );

    // Nothing while stopped.
    tokio::time::sleep(interval * 4).await;
    assert_eq!(camera.autofocus_times().len(), times.len());
    assert!(!camera.has_pending_autofocus());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_autofocus_spacing_survives_restart() {
    let interval = Duration::from_millis(200);
    let camera = fast_camera();
    let (pipeline, _events) = spawn_with_interval(&camera, interval);

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    pipeline.stop().await.unwrap();
    assert_eq!(camera.autofocus_times().len(), 1);

    // Restarting straight away must not refocus before the interval is up.
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    pipeline.stop().await.unwrap();

    let times = camera.autofocus_times();
    assert!(times.len() >= 2, "only {} autofocus requests", times.len());
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) + CLOCK_SLACK >= interval);
    }

    pipeline.shutdown().await.unwrap();
}

// =============================================================================
// Errors and transitions
// =============================================================================

#[tokio::test]
async fn test_device_unavailable_is_fatal_and_not_retried() {
    let camera = Arc::new(MockCamera::unavailable());
    let (pipeline, mut events) = spawn(&camera, ScriptedDecoder::new());

    let err = pipeline.open(surface()).await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::Capture(CaptureError::DeviceUnavailable(_))
    ));
    assert!(err.is_fatal());
    assert_eq!(err.kind(), ScanErrorKind::DeviceUnavailable);
    assert_eq!(camera.stats().open_calls, 1);

    let err = pipeline.start().await.unwrap_err();
    assert!(matches!(err, ScanError::Capture(CaptureError::NotOpen)));
    assert_eq!(camera.stats().open_calls, 1);
    assert!(events.try_recv().is_err());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_and_accept_transitions() {
    let camera = Arc::new(MockCamera::default());
    let (pipeline, mut events) = spawn(&camera, ScriptedDecoder::from_payloads(&["A1", "B2"]));

    assert!(matches!(
        pipeline.restart().await,
        Err(ScanError::InvalidTransition {
            state: PipelineState::Idle,
            ..
        })
    ));
    assert!(pipeline.accept().await.is_err());

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    assert!(matches!(
        pipeline.accept().await,
        Err(ScanError::InvalidTransition { .. })
    ));

    let first = events_until_decoded(&mut events).await;
    assert!(matches!(first.last(), Some(ScanEvent::Decoded { text, .. }) if text == "A1"));
    assert_eq!(
        pipeline.status().await.unwrap().state,
        PipelineState::AwaitingUserAction
    );

    pipeline.restart().await.unwrap();
    let second = events_until_decoded(&mut events).await;
    assert!(matches!(second.last(), Some(ScanEvent::Decoded { text, .. }) if text == "B2"));

    pipeline.accept().await.unwrap();
    let status = pipeline.status().await.unwrap();
    assert_eq!(status.state, PipelineState::Idle);
    assert!(!status.previewing);
    assert!(pipeline.restart().await.is_err());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_decoder_panic_surfaces_worker_unavailable() {
    let camera = Arc::new(MockCamera::manual());
    let (pipeline, mut events) =
        ScanPipeline::spawn(camera.clone(), PanickingDecoder, PipelineConfig::default()).unwrap();

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    assert!(camera.deliver_frame());

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(ScanEvent::Error(ScanErrorKind::WorkerUnavailable)));
    let status = pipeline.status().await.unwrap();
    assert_eq!(status.state, PipelineState::Idle);
    assert!(!status.previewing);

    // The worker is gone; the next frame is refused rather than lost.
    pipeline.start().await.unwrap();
    assert!(camera.deliver_frame());
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(ScanEvent::Error(ScanErrorKind::WorkerUnavailable)));
    assert_eq!(pipeline.status().await.unwrap().state, PipelineState::Idle);

    pipeline.shutdown().await.unwrap();
    assert!(!camera.is_open());
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test]
async fn test_shutdown_closes_camera_once() {
    let camera = Arc::new(MockCamera::default());
    let (pipeline, _events) = spawn(&camera, ScriptedDecoder::new());

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    pipeline.shutdown().await.unwrap();

    assert!(!camera.is_open());
    assert_eq!(camera.stats().close_calls, 1);

    assert!(matches!(
        pipeline.start().await,
        Err(ScanError::PipelineClosed)
    ));
    pipeline.shutdown().await.unwrap();
    assert_eq!(camera.stats().close_calls, 1);
}

#[tokio::test]
async fn test_dropping_last_handle_disposes_pipeline() {
    let camera = Arc::new(MockCamera::default());
    let (pipeline, _events) = spawn(&camera, ScriptedDecoder::new());

    pipeline.open(surface()).await.unwrap();
    pipeline.start().await.unwrap();
    drop(pipeline);

    for _ in 0..100 {
        if !camera.is_open() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!camera.is_open());
    assert_eq!(camera.stats().close_calls, 1);
}
