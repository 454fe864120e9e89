//! Decoding: the symbol decoder contract and the worker that drives it.
//!
//! The decoder itself is an external collaborator. This module only defines the
//! call it has to answer,
//!
//! ```text
//! decode(buffer, width, height, bit_depth, formats) -> Option<DecodeResult>
//! ```
//!
//! plus the symbology vocabulary shared with configuration and the UI.
//!
//! - [`luma`]: cropping the luma plane of a preview frame to the scan region
//! - [`worker`]: the single decode worker and its command queue
//! - [`mock`]: a scripted decoder for tests and the CLI

pub mod luma;
pub mod mock;
pub mod worker;

pub use luma::LumaSource;
pub use mock::ScriptedDecoder;
pub use worker::{DecodeJob, DecodeReport, DecodeWorker, WorkerCommand};

use bitflags::bitflags;
use std::fmt;

/// Bits per luma sample handed to the decoder.
pub const LUMA_BIT_DEPTH: u8 = 8;

bitflags! {
    /// Symbology families the decoder is asked to look for.
    ///
    /// Built once per session from configuration and passed through to the decoder
    /// unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SymbologyMask: u32 {
        /// QR Code.
        const QR_CODE = 1 << 0;
        /// Data Matrix.
        const DATA_MATRIX = 1 << 1;
        /// The EAN/UPC retail family.
        const EAN = 1 << 2;
        /// Code 39.
        const CODE39 = 1 << 3;
        /// Code 128.
        const CODE128 = 1 << 4;
    }
}

impl SymbologyMask {
    /// Human readable list of enabled families, e.g. `"QR Code, EAN"`.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = [
            (SymbologyMask::QR_CODE, "QR Code"),
            (SymbologyMask::DATA_MATRIX, "Data Matrix"),
            (SymbologyMask::EAN, "EAN"),
            (SymbologyMask::CODE39, "Code 39"),
            (SymbologyMask::CODE128, "Code 128"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();

        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}

impl Default for SymbologyMask {
    fn default() -> Self {
        SymbologyMask::all()
    }
}

/// Concrete barcode format reported with a decoded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbology {
    /// QR Code.
    QrCode,
    /// Data Matrix.
    DataMatrix,
    /// EAN-8.
    Ean8,
    /// EAN-13.
    Ean13,
    /// UPC-A.
    UpcA,
    /// UPC-E.
    UpcE,
    /// Code 39.
    Code39,
    /// Code 128.
    Code128,
}

impl Symbology {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Symbology::QrCode => "QR_CODE",
            Symbology::DataMatrix => "DATA_MATRIX",
            Symbology::Ean8 => "EAN_8",
            Symbology::Ean13 => "EAN_13",
            Symbology::UpcA => "UPC_A",
            Symbology::UpcE => "UPC_E",
            Symbology::Code39 => "CODE_39",
            Symbology::Code128 => "CODE_128",
        }
    }

    /// The family flag that enables this format.
    pub fn family(&self) -> SymbologyMask {
        match self {
            Symbology::QrCode => SymbologyMask::QR_CODE,
            Symbology::DataMatrix => SymbologyMask::DATA_MATRIX,
            Symbology::Ean8 | Symbology::Ean13 | Symbology::UpcA | Symbology::UpcE => {
                SymbologyMask::EAN
            }
            Symbology::Code39 => SymbologyMask::CODE39,
            Symbology::Code128 => SymbologyMask::CODE128,
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A symbol found by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    /// Raw text encoded by the symbol.
    pub text: String,
    /// Format of the symbol.
    pub symbology: Symbology,
}

impl DecodeResult {
    /// Create a result.
    pub fn new(text: impl Into<String>, symbology: Symbology) -> Self {
        Self {
            text: text.into(),
            symbology,
        }
    }
}

impl fmt::Display for DecodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}---{}", self.symbology, self.text)
    }
}

/// Outcome of decoding one accepted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A symbol was found.
    Matched(DecodeResult),
    /// Nothing decodable in the scan region.
    NoMatch,
}

/// The symbol decoding collaborator.
///
/// The decoder is owned by the decode worker and only ever called from its thread,
/// one frame at a time, so implementations may keep and reuse internal state.
pub trait Decoder: Send + 'static {
    /// Look for a symbol in a luma buffer.
    ///
    /// # Arguments
    /// * `buffer` - `width * height` luma samples, row major
    /// * `bit_depth` - bits per sample (always [`LUMA_BIT_DEPTH`])
    /// * `formats` - families to look for
    fn decode(
        &mut self,
        buffer: &[u8],
        width: u32,
        height: u32,
        bit_depth: u8,
        formats: SymbologyMask,
    ) -> Option<DecodeResult>;
}
