//! The scan pipeline: coordinator state machine, its messages, and autofocus cadence.
//!
//! # Architecture
//!
//! The [`PipelineCoordinator`] is the single owner of pipeline state and runs in a
//! dedicated Tokio task. The UI talks to it through a cloneable [`ScanPipeline`]
//! handle and receives [`ScanEvent`]s on an unbounded channel. Capture callbacks and
//! decode reports reach the coordinator as messages, so state is only ever mutated on
//! its own loop.
//!
//! ```text
//!            start/stop/restart/accept             request_one_frame
//!  UI ──────────────────────────────> Coordinator ───────────────────> CaptureSource
//!     <──────────── ScanEvent ──────      │  ^      <── FrameReady ────
//!                                         v  │
//!                                    DecodeWorker (own thread)
//! ```
//!
//! # States
//!
//! ```text
//! Idle ──start──> Armed ──frame──> Decoding ──match──> AwaitingUserAction
//!  ^                ^                  │                     │    │
//!  │                └──── miss/error ──┘                     │    │
//!  │                └──────────────── restart ───────────────┘    │
//!  └──────────────────── stop (any) / accept ─────────────────────┘
//! ```

pub mod autofocus;
pub mod coordinator;
pub mod messages;

pub use autofocus::{AutofocusCycle, AUTOFOCUS_INTERVAL};
pub use coordinator::{PipelineCoordinator, ScanPipeline};
pub use messages::PipelineCommand;

use crate::config::ScanConfig;
use crate::decode::{Symbology, SymbologyMask};
use crate::error::ScanErrorKind;
use crate::region::{RegionPolicy, ScanRegion};
use std::fmt;
use std::time::Duration;

/// Default marker that turns a decoded payload into a restart request.
pub const DEFAULT_SENTINEL: char = '*';

/// Default capacity of the UI command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 32;

/// Coordinator state. Exactly one instance exists per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Not scanning; preview stopped.
    Idle,
    /// A one-shot frame request is outstanding.
    Armed,
    /// A frame is with the decode worker.
    Decoding,
    /// A result was delivered; waiting for `restart` or `accept`.
    AwaitingUserAction,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Armed => "armed",
            PipelineState::Decoding => "decoding",
            PipelineState::AwaitingUserAction => "awaiting-user-action",
        };
        f.write_str(name)
    }
}

/// Events delivered to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A symbol was decoded; the pipeline is suspended until `restart` or `accept`.
    Decoded {
        /// Payload as decoded.
        text: String,
        /// Symbol format.
        symbology: Symbology,
    },
    /// The frame held nothing decodable; the pipeline has re-armed.
    NoMatch,
    /// The payload carried the restart marker; the pipeline has re-armed.
    RestartRequested {
        /// Payload as decoded, marker included.
        text: String,
    },
    /// A fatal error ended the scan cycle.
    Error(ScanErrorKind),
}

/// Snapshot returned by [`ScanPipeline::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    /// Current state.
    pub state: PipelineState,
    /// Session epoch; bumped by every `start` and `stop`.
    pub epoch: u64,
    /// Whether the camera preview is running.
    pub previewing: bool,
    /// Region of the current session, if one has been computed.
    pub scan_region: Option<ScanRegion>,
    /// One-shot frame requests registered with the camera.
    pub frames_requested: u64,
    /// Decode reports handled for the live session.
    pub frames_decoded: u64,
    /// Reports carrying a symbol, restart payloads included.
    pub matches: u64,
    /// Reports with nothing decodable.
    pub misses: u64,
    /// Autofocus requests issued.
    pub autofocus_requests: u64,
    /// Capture callbacks and decode reports that arrived for a torn-down session.
    pub stale_discarded: u64,
}

/// Coordinator settings, fixed for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Minimum spacing between autofocus requests.
    pub autofocus_interval: Duration,
    /// Payloads containing this character trigger an internal restart.
    pub sentinel: char,
    /// Capacity of the command channel.
    pub command_capacity: usize,
    /// Symbologies passed to every decode call.
    pub formats: SymbologyMask,
    /// Scan region sizing.
    pub region: RegionPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            autofocus_interval: AUTOFOCUS_INTERVAL,
            sentinel: DEFAULT_SENTINEL,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            formats: SymbologyMask::all(),
            region: RegionPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Build the coordinator settings from loaded configuration.
    ///
    /// The symbology mask is computed here, once per pipeline.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            autofocus_interval: Duration::from_millis(config.pipeline.autofocus_interval_ms),
            sentinel: config.pipeline.sentinel,
            command_capacity: config.pipeline.command_capacity.max(1),
            formats: config.symbologies.mask(),
            region: config.region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.autofocus_interval, Duration::from_millis(1500));
        assert_eq!(config.sentinel, '*');
        assert_eq!(config.formats, SymbologyMask::all());
    }

    #[test]
    fn config_file_values_are_carried_over() {
        let mut scan = ScanConfig::default();
        scan.pipeline.autofocus_interval_ms = 2000;
        scan.symbologies.ean = false;
        scan.symbologies.code39 = false;

        let config = PipelineConfig::from_config(&scan);
        assert_eq!(config.autofocus_interval, Duration::from_secs(2));
        assert!(!config.formats.contains(SymbologyMask::EAN));
        assert!(config.formats.contains(SymbologyMask::QR_CODE));
    }

    #[test]
    fn state_display_names() {
        assert_eq!(PipelineState::AwaitingUserAction.to_string(), "awaiting-user-action");
        assert_eq!(PipelineState::Idle.to_string(), "idle");
    }
}
