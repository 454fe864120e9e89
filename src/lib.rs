//! # Rust Scan Core Library
//!
//! A camera barcode-scanning pipeline. Successive still frames are pulled from a live
//! preview with one-shot requests, handed one at a time to a dedicated decode worker,
//! and the outcome is routed back to the UI, while both the frame request and an
//! autofocus cycle are continuously re-armed. The camera driver, the decode algorithm,
//! and the UI are external collaborators, represented here by traits and channels.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: The `CaptureSource` trait, preview-size negotiation, and a mock
//!   camera for running without a device.
//! - **`region`**: Scan region geometry in display and camera-buffer space.
//! - **`decode`**: The `Decoder` contract, symbology flags, luma cropping, and the
//!   single decode worker with its FIFO queue.
//! - **`pipeline`**: The coordinator actor that owns the state machine, and the
//!   `ScanPipeline` handle the UI drives it with.
//! - **`dispatch`**: Delivery of results to the UI, including the restart marker.
//! - **`config`**: Figment-based configuration (TOML file plus environment).
//! - **`error`**: The crate error taxonomy.
//! - **`tracing_setup`**: Subscriber initialization.

pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod hardware;
pub mod pipeline;
pub mod region;
pub mod tracing_setup;

pub use error::{ScanError, ScanResult};
pub use pipeline::{PipelineConfig, PipelineState, ScanEvent, ScanPipeline};
