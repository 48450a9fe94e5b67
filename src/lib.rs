//! Qr-Cam-Capture: camera QR code scanning with capture-on-detect
//!
//! This library provides a scan lifecycle controller over trait-based camera
//! and decoding abstractions, enabling both production use with real V4L2
//! hardware and testing with mock engines. A successful decode records the
//! text, captures the frame it came from as a PNG, and releases the camera.

pub mod controller;
pub mod device;
pub mod engine;
pub mod export;
pub mod qr;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use controller::{ScanController, ScanState};
pub use device::V4l2Backend;
pub use engine::CameraEngine;
pub use traits::{
    CameraBackend, CameraDevice, CapturedFrame, CaptureStream, DecodeEngine, Facing, Format,
    FourCC, Frame, ScanConfig, ScanError, ScanHit,
};
