//! The decode worker.
//!
//! One long-lived worker owns the [`Decoder`] and runs it on a dedicated OS thread,
//! away from the async runtime, since decoding is CPU bound and its duration is up
//! to the decoder. The worker has an unbounded FIFO command queue and handles one
//! command at a time, so two frames are never decoded concurrently.
//!
//! ```text
//! Coordinator                      Worker thread
//! -----------                      -------------
//! submit(DecodeJob)   ──cmd──>     crop luma plane
//!                                  decoder.decode(..)
//!                     <─report──   DecodeReport { epoch, outcome }
//! shutdown()          ──cmd──>     loop exits
//! ```
//!
//! Every `DecodeFrame` command produces exactly one [`DecodeReport`], whether the
//! decoder found a symbol, found nothing, or the frame was rejected. A decoder panic
//! is reported as `DecodeError::WorkerUnavailable` for that frame and ends the
//! run-loop; later submissions fail with the same error.

use super::{DecodeOutcome, Decoder, LumaSource, SymbologyMask, LUMA_BIT_DEPTH};
use crate::error::DecodeError;
use crate::hardware::Frame;
use crate::region::Rect;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// A frame to decode, tagged with the session it belongs to.
#[derive(Debug)]
pub struct DecodeJob {
    /// Session epoch of the coordinator that submitted the job.
    pub epoch: u64,
    /// The captured frame; moved in, never touched by the capture side again.
    pub frame: Frame,
    /// Scan region in camera-buffer coordinates.
    pub region: Rect,
}

/// Commands accepted by the worker's run-loop.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Decode one frame and report the outcome.
    DecodeFrame(DecodeJob),
    /// Leave the run-loop.
    Shutdown,
}

/// Result of one [`WorkerCommand::DecodeFrame`].
#[derive(Debug)]
pub struct DecodeReport {
    /// Epoch copied from the job.
    pub epoch: u64,
    /// Device sequence number of the decoded frame.
    pub sequence: u64,
    /// Hit, miss, or the reason the frame was rejected.
    pub outcome: Result<DecodeOutcome, DecodeError>,
}

/// Handle to the running decode worker.
pub struct DecodeWorker {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    finished_rx: Option<oneshot::Receiver<()>>,
}

impl DecodeWorker {
    /// Start the worker thread.
    ///
    /// # Arguments
    /// * `decoder` - the decode collaborator, owned by the worker from now on
    /// * `formats` - symbology mask passed to every decode call
    /// * `reports` - where outcomes are delivered
    pub fn spawn<D: Decoder>(
        decoder: D,
        formats: SymbologyMask,
        reports: mpsc::UnboundedSender<DecodeReport>,
    ) -> std::io::Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = oneshot::channel();

        thread::Builder::new()
            .name("decode-worker".into())
            .spawn(move || {
                run_loop(decoder, formats, command_rx, reports);
                let _ = finished_tx.send(());
            })?;

        tracing::debug!(formats = %formats.describe(), "Decode worker started");
        Ok(Self {
            command_tx,
            finished_rx: Some(finished_rx),
        })
    }

    /// Queue a frame for decoding.
    ///
    /// # Errors
    /// `DecodeError::WorkerUnavailable` once the worker has shut down.
    pub fn submit(&self, job: DecodeJob) -> Result<(), DecodeError> {
        if self.finished_rx.is_none() {
            return Err(DecodeError::WorkerUnavailable);
        }
        self.command_tx
            .send(WorkerCommand::DecodeFrame(job))
            .map_err(|_| DecodeError::WorkerUnavailable)
    }

    /// Whether the run-loop is still accepting commands.
    pub fn is_running(&self) -> bool {
        self.finished_rx.is_some() && !self.command_tx.is_closed()
    }

    /// Stop the run-loop and wait for the thread to leave it.
    ///
    /// A decode already in progress finishes first; commands queued behind the
    /// shutdown are dropped. Returns `false` if the worker was already shut down.
    pub async fn shutdown(&mut self) -> bool {
        let Some(finished_rx) = self.finished_rx.take() else {
            return false;
        };
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        let _ = finished_rx.await;
        tracing::debug!("Decode worker stopped");
        true
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        if self.finished_rx.is_some() {
            let _ = self.command_tx.send(WorkerCommand::Shutdown);
        }
    }
}

fn run_loop<D: Decoder>(
    mut decoder: D,
    formats: SymbologyMask,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    reports: mpsc::UnboundedSender<DecodeReport>,
) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            WorkerCommand::DecodeFrame(job) => {
                let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
                    decode_job(&mut decoder, formats, &job)
                }));

                let outcome = match decoded {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(
                            sequence = job.frame.sequence,
                            "Decoder panicked, decode worker stopping"
                        );
                        // Refuse further jobs before reporting, so nothing is queued
                        // behind a worker that will never run it.
                        commands.close();
                        let _ = reports.send(DecodeReport {
                            epoch: job.epoch,
                            sequence: job.frame.sequence,
                            outcome: Err(DecodeError::WorkerUnavailable),
                        });
                        break;
                    }
                };

                let report = DecodeReport {
                    epoch: job.epoch,
                    sequence: job.frame.sequence,
                    outcome,
                };
                if reports.send(report).is_err() {
                    tracing::debug!("Decode report receiver closed, worker exiting");
                    break;
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }
}

/// Decode the scan region of one frame.
fn decode_job<D: Decoder>(
    decoder: &mut D,
    formats: SymbologyMask,
    job: &DecodeJob,
) -> Result<DecodeOutcome, DecodeError> {
    let source = LumaSource::new(&job.frame, job.region)?;
    let matrix = source.matrix();

    let start = Instant::now();
    let result = decoder.decode(
        &matrix,
        source.width(),
        source.height(),
        LUMA_BIT_DEPTH,
        formats,
    );
    tracing::trace!(
        sequence = job.frame.sequence,
        elapsed_ms = start.elapsed().as_millis() as u64,
        found = result.is_some(),
        "Decode finished"
    );

    Ok(match result {
        Some(result) => DecodeOutcome::Matched(result),
        None => DecodeOutcome::NoMatch,
    })
}
