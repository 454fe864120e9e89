//! Message types for talking to the pipeline coordinator.
//!
//! Commands are sent over a bounded mpsc channel and each carries the oneshot sender
//! its reply goes back on:
//!
//! ```text
//! UI task                            Coordinator task
//! -------                            ----------------
//! 1. Create command with oneshot
//! 2. Send via mpsc channel    ------>
//!                                    3. Receive command
//!                                    4. Transition state
//!                                    5. Send response
//! 6. Await oneshot receiver   <------
//! ```
//!
//! Every command variant has a helper that builds the command and returns the
//! receiver, so the caller always has something to await:
//!
//! ```rust,ignore
//! let (cmd, rx) = PipelineCommand::start();
//! command_tx.send(cmd).await?;
//! rx.await??;
//! ```
//!
//! Capture callbacks and autofocus timers talk to the coordinator through
//! [`PipelineEvent`], which is internal and has no reply.

use super::PipelineStatus;
use crate::error::ScanResult;
use crate::hardware::{Frame, SurfaceTarget};
use tokio::sync::oneshot;

/// Commands accepted by the coordinator.
#[derive(Debug)]
pub enum PipelineCommand {
    /// Acquire the camera and bind it to the render target.
    ///
    /// # Response
    ///
    /// - `Ok(())`: device open (also when it already was)
    /// - `Err(ScanError::Capture(_))`: `DeviceUnavailable` or `BindFailed`; not retried
    Open {
        /// Where the preview is rendered.
        surface: SurfaceTarget,
        /// Reply channel.
        response: oneshot::Sender<ScanResult<()>>,
    },

    /// Start preview, compute the scan region, and arm the first frame request.
    ///
    /// # Response
    ///
    /// - `Ok(())`: pipeline is `Armed`
    /// - `Err(InvalidTransition)`: not `Idle`
    /// - `Err(Capture(NotOpen))`: `Open` has not succeeded
    Start {
        /// Reply channel.
        response: oneshot::Sender<ScanResult<()>>,
    },

    /// Return to `Idle` from any state. Always succeeds.
    Stop {
        /// Signalled once done.
        response: oneshot::Sender<()>,
    },

    /// Re-arm after a delivered result.
    ///
    /// # Response
    ///
    /// - `Ok(())`: re-armed, or already scanning
    /// - `Err(InvalidTransition)`: pipeline is `Idle`
    Restart {
        /// Reply channel.
        response: oneshot::Sender<ScanResult<()>>,
    },

    /// Accept the delivered result and end the session.
    ///
    /// # Response
    ///
    /// - `Ok(())`: pipeline is `Idle`, preview stopped
    /// - `Err(InvalidTransition)`: no result is awaiting the user
    Accept {
        /// Reply channel.
        response: oneshot::Sender<ScanResult<()>>,
    },

    /// Snapshot of state and counters.
    GetStatus {
        /// Reply channel.
        response: oneshot::Sender<PipelineStatus>,
    },

    /// Stop, shut the decode worker down, and close the camera.
    ///
    /// The coordinator task exits after replying.
    Shutdown {
        /// Signalled once done.
        response: oneshot::Sender<()>,
    },
}

impl PipelineCommand {
    /// Helper to create an Open command
    pub fn open(surface: SurfaceTarget) -> (Self, oneshot::Receiver<ScanResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Open {
                surface,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Start command
    pub fn start() -> (Self, oneshot::Receiver<ScanResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Start { response: tx }, rx)
    }

    /// Helper to create a Stop command
    pub fn stop() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Stop { response: tx }, rx)
    }

    /// Helper to create a Restart command
    pub fn restart() -> (Self, oneshot::Receiver<ScanResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Restart { response: tx }, rx)
    }

    /// Helper to create an Accept command
    pub fn accept() -> (Self, oneshot::Receiver<ScanResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Accept { response: tx }, rx)
    }

    /// Helper to create a GetStatus command
    pub fn get_status() -> (Self, oneshot::Receiver<PipelineStatus>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetStatus { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}

/// Notifications from capture callbacks and the autofocus timer.
///
/// Each carries the session epoch it was issued under; the coordinator drops any
/// whose epoch is no longer current.
#[derive(Debug)]
pub(crate) enum PipelineEvent {
    FrameReady { epoch: u64, frame: Frame },
    AutofocusComplete { epoch: u64, success: bool },
    AutofocusDue { epoch: u64 },
}
