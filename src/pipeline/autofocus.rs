//! Autofocus cadence.
//!
//! Autofocus is advisory: it runs beside the capture/decode cycle and never holds it
//! up. The cycle only tracks when focus was last requested and whether a request is
//! still outstanding; the coordinator owns the timer that brings it round again.

use tokio::time::{Duration, Instant};

/// Minimum spacing between autofocus requests.
pub const AUTOFOCUS_INTERVAL: Duration = Duration::from_millis(1500);

/// Bookkeeping for the autofocus re-arm cadence.
#[derive(Debug, Clone)]
pub struct AutofocusCycle {
    interval: Duration,
    last_request: Option<Instant>,
    outstanding: bool,
}

impl AutofocusCycle {
    /// A cycle that has never requested focus.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: None,
            outstanding: false,
        }
    }

    /// Minimum spacing between requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a new request may be issued at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        if self.outstanding {
            return false;
        }
        match self.last_request {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Record a request issued at `now`.
    pub fn mark_requested(&mut self, now: Instant) {
        self.last_request = Some(now);
        self.outstanding = true;
    }

    /// The device answered the outstanding request.
    pub fn mark_completed(&mut self) {
        self.outstanding = false;
    }

    /// Forget the outstanding request after the device cancelled it.
    ///
    /// The time of the last request is kept so a quick stop/start cannot shorten
    /// the spacing.
    pub fn cancel(&mut self) {
        self.outstanding = false;
    }

    /// A request is waiting for the device.
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// When focus was last requested.
    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }
}

impl Default for AutofocusCycle {
    fn default() -> Self {
        Self::new(AUTOFOCUS_INTERVAL)
    }
}
