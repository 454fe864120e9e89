//! Result dispatch to the UI.
//!
//! The dispatcher is the last hop of a scan cycle. A decoded payload is either shown
//! to the user, who then accepts or restarts, or, when it contains the restart
//! marker, swallowed and turned into an immediate re-arm.

use crate::decode::DecodeResult;
use crate::error::ScanErrorKind;
use crate::pipeline::ScanEvent;
use tokio::sync::mpsc;

/// What the coordinator should do after a match was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to the UI; wait for `restart` or `accept`.
    Delivered,
    /// Restart marker seen; re-arm now.
    Restart,
}

/// Sends terminal outcomes to the UI event channel.
#[derive(Debug, Clone)]
pub struct ResultDispatcher {
    events: mpsc::UnboundedSender<ScanEvent>,
    sentinel: char,
}

impl ResultDispatcher {
    /// Dispatcher treating payloads that contain `sentinel` as restart requests.
    pub fn new(events: mpsc::UnboundedSender<ScanEvent>, sentinel: char) -> Self {
        Self { events, sentinel }
    }

    /// Restart marker.
    pub fn sentinel(&self) -> char {
        self.sentinel
    }

    /// Route a decoded result.
    pub fn on_matched(&self, result: &DecodeResult) -> Dispatch {
        if result.text.contains(self.sentinel) {
            tracing::info!(text = %result.text, "Restart marker in payload, re-arming");
            self.emit(ScanEvent::RestartRequested {
                text: result.text.clone(),
            });
            return Dispatch::Restart;
        }

        tracing::info!(symbology = %result.symbology, "Decoded {}", result.text);
        self.emit(ScanEvent::Decoded {
            text: result.text.clone(),
            symbology: result.symbology,
        });
        Dispatch::Delivered
    }

    /// Report a frame with nothing decodable.
    pub fn on_no_match(&self) {
        self.emit(ScanEvent::NoMatch);
    }

    /// Report a failure that ended the scan cycle.
    pub fn on_error(&self, kind: ScanErrorKind) {
        self.emit(ScanEvent::Error(kind));
    }

    fn emit(&self, event: ScanEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("UI event receiver dropped");
        }
    }
}
