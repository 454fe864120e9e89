//! Pipeline coordinator actor.
//!
//! The [`PipelineCoordinator`] owns the state machine, the capture source, the decode
//! worker, and the result dispatcher. It runs as one Tokio task and is driven by three
//! inboxes:
//!
//! - **Commands** from [`ScanPipeline`] handles (bounded, with oneshot replies)
//! - **Device events**: frame and autofocus callbacks, and the autofocus timer
//! - **Decode reports** from the worker thread
//!
//! Device events and decode reports are drained before commands, so a callback that
//! fired before a command was sent is always seen first.
//!
//! ## Sessions
//!
//! Every `start` and `stop` bumps the session epoch. Callbacks and reports carry the
//! epoch they were issued under and are discarded when it no longer matches, which is
//! how late callbacks from a stopped preview are kept from touching state.
//!
//! ## At most one decode in flight
//!
//! A frame is only requested while `Armed`, and the next request is only issued after
//! the decode report for the previous frame arrives. If a session is stopped and
//! restarted while the old session's decode is still running, the new session's first
//! frame is held back until that stale report comes in.

use super::messages::{PipelineCommand, PipelineEvent};
use super::{AutofocusCycle, PipelineConfig, PipelineState, PipelineStatus, ScanEvent};
use crate::decode::{DecodeJob, DecodeOutcome, DecodeReport, DecodeWorker, Decoder};
use crate::dispatch::{Dispatch, ResultDispatcher};
use crate::error::{CaptureError, DecodeError, ScanError, ScanResult};
use crate::hardware::{CaptureSource, Frame, SurfaceTarget};
use crate::region::{RegionCache, Rect, ScanRegion};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    frames_requested: u64,
    frames_decoded: u64,
    matches: u64,
    misses: u64,
    autofocus_requests: u64,
    stale_discarded: u64,
}

/// Receivers the coordinator listens on besides the command channel.
struct Inbox {
    events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    reports_rx: mpsc::UnboundedReceiver<DecodeReport>,
}

/// Single owner of pipeline state.
///
/// Created and spawned by [`ScanPipeline::spawn`]; all interaction goes through the
/// handle.
pub struct PipelineCoordinator {
    camera: Arc<dyn CaptureSource>,
    worker: DecodeWorker,
    dispatcher: ResultDispatcher,
    state: PipelineState,
    epoch: u64,
    regions: RegionCache,
    region: Option<ScanRegion>,
    autofocus: AutofocusCycle,
    autofocus_timer: Option<JoinHandle<()>>,
    /// True from `submit` until the matching report arrives, whatever its epoch.
    decode_in_flight: bool,
    /// Frame of the current session waiting for a stale decode to finish.
    queued_job: Option<DecodeJob>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    counters: Counters,
}

impl PipelineCoordinator {
    fn new<D: Decoder>(
        camera: Arc<dyn CaptureSource>,
        decoder: D,
        config: PipelineConfig,
        ui_events: mpsc::UnboundedSender<ScanEvent>,
    ) -> ScanResult<(Self, Inbox)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let worker = DecodeWorker::spawn(decoder, config.formats, reports_tx)?;

        let coordinator = Self {
            camera,
            worker,
            dispatcher: ResultDispatcher::new(ui_events, config.sentinel),
            state: PipelineState::Idle,
            epoch: 0,
            regions: RegionCache::new(config.region),
            region: None,
            autofocus: AutofocusCycle::new(config.autofocus_interval),
            autofocus_timer: None,
            decode_in_flight: false,
            queued_job: None,
            events_tx,
            counters: Counters::default(),
        };
        Ok((
            coordinator,
            Inbox {
                events_rx,
                reports_rx,
            },
        ))
    }

    /// Event loop; returns after `Shutdown` or once every handle is dropped.
    async fn run(mut self, mut command_rx: mpsc::Receiver<PipelineCommand>, mut inbox: Inbox) {
        tracing::info!("Scan pipeline started");
        let mut reports_open = true;

        loop {
            tokio::select! {
                biased;

                Some(event) = inbox.events_rx.recv() => self.handle_event(event).await,

                report = inbox.reports_rx.recv(), if reports_open => match report {
                    Some(report) => self.handle_report(report).await,
                    None => {
                        reports_open = false;
                        self.on_worker_exit().await;
                    }
                },

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All pipeline handles dropped");
                        self.shutdown().await;
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scan pipeline stopped");
    }

    async fn handle_command(&mut self, command: PipelineCommand) -> ControlFlow<()> {
        match command {
            PipelineCommand::Open { surface, response } => {
                let result = self.open(&surface).await;
                let _ = response.send(result);
            }
            PipelineCommand::Start { response } => {
                let result = self.start().await;
                let _ = response.send(result);
            }
            PipelineCommand::Stop { response } => {
                self.halt().await;
                let _ = response.send(());
            }
            PipelineCommand::Restart { response } => {
                let result = self.restart().await;
                let _ = response.send(result);
            }
            PipelineCommand::Accept { response } => {
                let result = self.accept().await;
                let _ = response.send(result);
            }
            PipelineCommand::GetStatus { response } => {
                let _ = response.send(self.status());
            }
            PipelineCommand::Shutdown { response } => {
                tracing::info!("Shutdown command received");
                self.shutdown().await;
                let _ = response.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn open(&mut self, surface: &SurfaceTarget) -> ScanResult<()> {
        self.camera.open(surface).await.map_err(|err| {
            tracing::error!(surface = %surface.name, "Failed to open camera: {err}");
            ScanError::from(err)
        })
    }

    async fn start(&mut self) -> ScanResult<()> {
        if self.state != PipelineState::Idle {
            return Err(self.invalid("start"));
        }

        let (screen, camera) = self
            .camera
            .current_resolutions()
            .ok_or(CaptureError::NotOpen)?;
        self.camera.start_preview().await?;

        let region = self.regions.region(screen, camera);
        self.region = Some(region);
        self.epoch += 1;

        if let Err(err) = self.arm().await {
            self.camera.stop_preview().await;
            return Err(err.into());
        }
        tracing::info!(
            epoch = self.epoch,
            %screen,
            %camera,
            region = %region.display,
            "Scan session started"
        );
        Ok(())
    }

    async fn restart(&mut self) -> ScanResult<()> {
        match self.state {
            PipelineState::AwaitingUserAction => {
                self.arm().await?;
                Ok(())
            }
            PipelineState::Armed | PipelineState::Decoding => {
                tracing::debug!(state = %self.state, "Restart ignored, already scanning");
                Ok(())
            }
            PipelineState::Idle => Err(self.invalid("restart")),
        }
    }

    async fn accept(&mut self) -> ScanResult<()> {
        if self.state != PipelineState::AwaitingUserAction {
            return Err(self.invalid("accept"));
        }
        self.halt().await;
        tracing::info!("Result accepted, session finished");
        Ok(())
    }

    fn status(&self) -> PipelineStatus {
        let c = self.counters;
        PipelineStatus {
            state: self.state,
            epoch: self.epoch,
            previewing: self.camera.is_previewing(),
            scan_region: self.region,
            frames_requested: c.frames_requested,
            frames_decoded: c.frames_decoded,
            matches: c.matches,
            misses: c.misses,
            autofocus_requests: c.autofocus_requests,
            stale_discarded: c.stale_discarded,
        }
    }

    /// Return to `Idle`: cancel registrations and invalidate in-flight callbacks.
    async fn halt(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.autofocus_timer.take() {
            timer.abort();
        }
        self.autofocus.cancel();
        if self.queued_job.take().is_some() {
            tracing::debug!("Dropped queued frame");
        }
        self.camera.stop_preview().await;
        self.transition(PipelineState::Idle);
    }

    async fn shutdown(&mut self) {
        self.halt().await;
        self.worker.shutdown().await;
        self.camera.close().await;
    }

    // =========================================================================
    // Capture side
    // =========================================================================

    /// Register a one-shot frame callback for the current session.
    async fn arm(&mut self) -> Result<(), CaptureError> {
        let epoch = self.epoch;
        let events = self.events_tx.clone();
        self.camera
            .request_one_frame(Box::new(move |frame| {
                let _ = events.send(PipelineEvent::FrameReady { epoch, frame });
            }))
            .await?;

        self.counters.frames_requested += 1;
        self.transition(PipelineState::Armed);
        Ok(())
    }

    async fn rearm(&mut self) {
        if let Err(err) = self.arm().await {
            tracing::error!("Failed to re-arm frame request: {err}");
            self.dispatcher.on_error(err.kind());
            self.halt().await;
        }
    }

    async fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::FrameReady { epoch, frame } => self.on_frame(epoch, frame).await,
            PipelineEvent::AutofocusComplete { epoch, success } => {
                self.on_autofocus_complete(epoch, success)
            }
            PipelineEvent::AutofocusDue { epoch } => {
                if epoch == self.epoch {
                    self.autofocus_timer = None;
                    self.request_autofocus().await;
                }
            }
        }
    }

    async fn on_frame(&mut self, epoch: u64, frame: Frame) {
        if epoch != self.epoch || self.state != PipelineState::Armed {
            self.discard_stale("frame", epoch);
            return;
        }

        let region = self
            .region
            .map(|r| r.preview)
            .unwrap_or_else(|| Rect::new(0, 0, frame.width as i32, frame.height as i32));
        tracing::trace!(sequence = frame.sequence, "Frame received");
        self.transition(PipelineState::Decoding);

        let job = DecodeJob {
            epoch,
            frame,
            region,
        };
        if self.decode_in_flight {
            tracing::debug!("Previous session still decoding, frame queued");
            self.queued_job = Some(job);
        } else {
            self.submit(job).await;
        }

        if self.state == PipelineState::Decoding {
            self.request_autofocus().await;
        }
    }

    async fn request_autofocus(&mut self) {
        if !self.camera.is_previewing() {
            return;
        }
        let now = Instant::now();
        if !self.autofocus.is_due(now) {
            return;
        }

        let epoch = self.epoch;
        let events = self.events_tx.clone();
        let result = self
            .camera
            .request_autofocus(Box::new(move |success| {
                let _ = events.send(PipelineEvent::AutofocusComplete { epoch, success });
            }))
            .await;

        match result {
            Ok(()) => {
                self.autofocus.mark_requested(now);
                self.counters.autofocus_requests += 1;
                tracing::debug!(epoch, "Requested autofocus");
            }
            Err(err) => tracing::debug!("Autofocus request rejected: {err}"),
        }
    }

    fn on_autofocus_complete(&mut self, epoch: u64, success: bool) {
        if epoch != self.epoch {
            self.discard_stale("autofocus", epoch);
            return;
        }
        self.autofocus.mark_completed();
        tracing::debug!(success, "Autofocus finished");

        if !self.camera.is_previewing() {
            return;
        }
        if let Some(timer) = self.autofocus_timer.take() {
            timer.abort();
        }
        let events = self.events_tx.clone();
        let interval = self.autofocus.interval();
        self.autofocus_timer = Some(tokio::spawn(async move {
            sleep(interval).await;
            let _ = events.send(PipelineEvent::AutofocusDue { epoch });
        }));
    }

    // =========================================================================
    // Decode side
    // =========================================================================

    async fn submit(&mut self, job: DecodeJob) {
        match self.worker.submit(job) {
            Ok(()) => self.decode_in_flight = true,
            Err(err) => {
                tracing::error!("Cannot hand frame to decoder: {err}");
                self.dispatcher.on_error(err.kind());
                self.halt().await;
            }
        }
    }

    /// The worker thread is gone; a decode still outstanding will never report.
    async fn on_worker_exit(&mut self) {
        tracing::debug!("Decode worker report channel closed");
        if !self.decode_in_flight {
            return;
        }
        self.decode_in_flight = false;
        self.queued_job = None;
        tracing::error!("Decode worker exited with a frame in flight");
        self.dispatcher.on_error(DecodeError::WorkerUnavailable.kind());
        self.halt().await;
    }

    async fn handle_report(&mut self, report: DecodeReport) {
        self.decode_in_flight = false;

        if report.epoch != self.epoch || self.state != PipelineState::Decoding {
            self.discard_stale("decode report", report.epoch);
            if let Some(job) = self.queued_job.take() {
                self.submit(job).await;
            }
            return;
        }

        self.counters.frames_decoded += 1;
        match report.outcome {
            Ok(DecodeOutcome::Matched(result)) => {
                self.counters.matches += 1;
                match self.dispatcher.on_matched(&result) {
                    Dispatch::Delivered => self.transition(PipelineState::AwaitingUserAction),
                    Dispatch::Restart => self.rearm().await,
                }
            }
            Ok(DecodeOutcome::NoMatch) => {
                self.counters.misses += 1;
                self.dispatcher.on_no_match();
                self.rearm().await;
            }
            Err(err) if err.is_recoverable() => {
                tracing::warn!(sequence = report.sequence, "Frame not decodable: {err}");
                self.counters.misses += 1;
                self.dispatcher.on_no_match();
                self.rearm().await;
            }
            Err(err) => {
                tracing::error!("Decode failed: {err}");
                self.dispatcher.on_error(err.kind());
                self.halt().await;
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, epoch = self.epoch, "State transition");
        }
        self.state = next;
    }

    fn discard_stale(&mut self, what: &'static str, epoch: u64) {
        self.counters.stale_discarded += 1;
        tracing::debug!(
            what,
            epoch,
            current = self.epoch,
            state = %self.state,
            "Discarding stale callback"
        );
    }

    fn invalid(&self, command: &'static str) -> ScanError {
        ScanError::InvalidTransition {
            state: self.state,
            command,
        }
    }
}

/// Cloneable handle to a running scan pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let camera = Arc::new(MockCamera::default());
/// let (pipeline, mut events) = ScanPipeline::spawn(camera, decoder, PipelineConfig::default())?;
/// pipeline.open(SurfaceTarget::new("preview", Resolution::new(480, 800))).await?;
/// pipeline.start().await?;
/// while let Some(event) = events.recv().await {
///     // show result, then pipeline.restart() or pipeline.accept()
/// }
/// ```
#[derive(Clone)]
pub struct ScanPipeline {
    command_tx: mpsc::Sender<PipelineCommand>,
}

impl ScanPipeline {
    /// Start the decode worker and spawn the coordinator task.
    ///
    /// Must be called from within a Tokio runtime. Returns the handle and the
    /// receiver for UI events.
    pub fn spawn<D: Decoder>(
        camera: Arc<dyn CaptureSource>,
        decoder: D,
        config: PipelineConfig,
    ) -> ScanResult<(Self, mpsc::UnboundedReceiver<ScanEvent>)> {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));

        let (coordinator, inbox) = PipelineCoordinator::new(camera, decoder, config, ui_tx)?;
        tokio::spawn(coordinator.run(command_rx, inbox));

        Ok((Self { command_tx }, ui_rx))
    }

    async fn request<T>(
        &self,
        command: PipelineCommand,
        response: oneshot::Receiver<T>,
    ) -> ScanResult<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ScanError::PipelineClosed)?;
        response.await.map_err(|_| ScanError::PipelineClosed)
    }

    /// Acquire the camera. Failures are returned as-is and never retried.
    pub async fn open(&self, surface: SurfaceTarget) -> ScanResult<()> {
        let (cmd, rx) = PipelineCommand::open(surface);
        self.request(cmd, rx).await?
    }

    /// `Idle -> Armed`.
    pub async fn start(&self) -> ScanResult<()> {
        let (cmd, rx) = PipelineCommand::start();
        self.request(cmd, rx).await?
    }

    /// Any state `-> Idle`.
    pub async fn stop(&self) -> ScanResult<()> {
        let (cmd, rx) = PipelineCommand::stop();
        self.request(cmd, rx).await
    }

    /// `AwaitingUserAction -> Armed`.
    pub async fn restart(&self) -> ScanResult<()> {
        let (cmd, rx) = PipelineCommand::restart();
        self.request(cmd, rx).await?
    }

    /// `AwaitingUserAction -> Idle`, ending the session.
    pub async fn accept(&self) -> ScanResult<()> {
        let (cmd, rx) = PipelineCommand::accept();
        self.request(cmd, rx).await?
    }

    /// Snapshot of state and counters.
    pub async fn status(&self) -> ScanResult<PipelineStatus> {
        let (cmd, rx) = PipelineCommand::get_status();
        self.request(cmd, rx).await
    }

    /// Stop scanning, shut the decode worker down, and close the camera.
    ///
    /// Shutting down an already closed pipeline is a no-op.
    pub async fn shutdown(&self) -> ScanResult<()> {
        let (cmd, rx) = PipelineCommand::shutdown();
        match self.request(cmd, rx).await {
            Err(ScanError::PipelineClosed) => Ok(()),
            other => other,
        }
    }

    /// Whether the coordinator task has exited.
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
