//! Scripted decoder for testing without a barcode library.
//!
//! `ScriptedDecoder` answers decode calls from a queue of canned results and records
//! every call it receives. Clones share the same script and call log, so a test can
//! keep one clone as a recorder after moving the other into the decode worker.
//!
//! # Example
//!
//! ```rust,ignore
//! let decoder = ScriptedDecoder::from_payloads(&["", "ABC123"]);
//! let recorder = decoder.clone();
//! // first frame misses, second decodes "ABC123", later frames miss
//! ```

use super::{DecodeResult, Decoder, Symbology, SymbologyMask};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Arguments of one recorded decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeCall {
    /// Luma width.
    pub width: u32,
    /// Luma height.
    pub height: u32,
    /// Bits per sample.
    pub bit_depth: u8,
    /// Families requested.
    pub formats: SymbologyMask,
    /// Length of the buffer passed in.
    pub len: usize,
}

#[derive(Debug, Default)]
struct ScriptState {
    script: VecDeque<Option<DecodeResult>>,
    calls: Vec<DecodeCall>,
}

/// Decoder that replays a fixed script of hits and misses.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecoder {
    state: Arc<Mutex<ScriptState>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedDecoder {
    /// Empty script: every call misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script from raw payloads; an empty string is a miss.
    ///
    /// Non-empty payloads decode as QR codes.
    pub fn from_payloads(payloads: &[&str]) -> Self {
        let decoder = Self::new();
        for payload in payloads {
            if payload.is_empty() {
                decoder.push_miss();
            } else {
                decoder.push_match(DecodeResult::new(*payload, Symbology::QrCode));
            }
        }
        decoder
    }

    /// Hold each decode call for `delay` of wall-clock time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append a hit to the script.
    pub fn push_match(&self, result: DecodeResult) {
        self.state.lock().script.push_back(Some(result));
    }

    /// Append a miss to the script.
    pub fn push_miss(&self) {
        self.state.lock().script.push_back(None);
    }

    /// Entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.state.lock().script.len()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<DecodeCall> {
        self.state.lock().calls.clone()
    }

    /// Highest number of decode calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(
        &mut self,
        buffer: &[u8],
        width: u32,
        height: u32,
        bit_depth: u8,
        formats: SymbologyMask,
    ) -> Option<DecodeResult> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let result = {
            let mut state = self.state.lock();
            state.calls.push(DecodeCall {
                width,
                height,
                bit_depth,
                formats,
                len: buffer.len(),
            });
            state.script.pop_front().flatten()
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        // The real decoder only reports formats it was asked for.
        result.filter(|r| formats.contains(r.symbology.family()))
    }
}
