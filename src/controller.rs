//! Scan lifecycle controller: sequences camera open/stop/switch and the
//! capture-on-detect flow over a decoding engine.
//!
//! The controller is single-threaded; every engine call blocks until the
//! camera transition it names has completed, so operations on the camera
//! handle are serialized by construction (stop always finishes before the
//! next start or file scan begins).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::export;
use crate::traits::{CapturedFrame, DecodeEngine, Facing, Result, ScanConfig, ScanError};

/// Lifecycle states of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No camera session; results may still be held.
    Idle,
    /// Camera acquisition in flight.
    CameraStarting,
    /// Camera live, ready to scan.
    CameraActive,
    /// A detection is being recorded and the camera released.
    Capturing,
    /// A still image is being decoded (camera already released).
    FileScanning,
}

/// Owns the scan state and sequences calls into the decoding engine.
///
/// One instance per scanning surface, created when the surface appears and
/// dropped when it goes away; dropping releases a live camera session.
pub struct ScanController<E: DecodeEngine> {
    engine: E,
    config: ScanConfig,
    facing: Facing,
    state: ScanState,
    last_result: Option<String>,
    capture: Option<CapturedFrame>,
    interrupt: Arc<AtomicBool>,
}

impl<E: DecodeEngine> ScanController<E> {
    /// Create a controller over the given engine. Scanning starts with the
    /// back camera.
    #[must_use]
    pub fn new(engine: E, config: ScanConfig) -> Self {
        Self {
            engine,
            config,
            facing: Facing::Back,
            state: ScanState::Idle,
            last_result: None,
            capture: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start with the given facing mode instead of the default.
    #[must_use]
    pub const fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// Current facing mode.
    #[must_use]
    pub const fn facing(&self) -> Facing {
        self.facing
    }

    /// The last decoded text, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// The capture taken at the last successful decode, if still held.
    #[must_use]
    pub const fn capture(&self) -> Option<&CapturedFrame> {
        self.capture.as_ref()
    }

    /// Flag that aborts a running decode loop when set; wire it to Ctrl+C.
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Acquire the camera for the current facing mode.
    ///
    /// A no-op (with a warning) when a session is already active. Clears
    /// the previous result. On failure the controller is back at `Idle`
    /// with no camera handle held.
    pub fn open_camera(&mut self) -> Result<()> {
        if self.state != ScanState::Idle {
            log::warn!("camera already active, ignoring open request");
            return Ok(());
        }

        self.clear_result();
        self.state = ScanState::CameraStarting;
        log::info!("opening {} camera", self.facing);

        if let Err(err) = self.engine.start(self.facing, &self.config) {
            log::error!("failed to start the {} camera: {err}", self.facing);
            self.state = ScanState::Idle;
            return Err(err);
        }

        self.state = ScanState::CameraActive;
        Ok(())
    }

    /// Run the decode loop until a code is detected, the scan budget runs
    /// out, or the interrupt flag is raised.
    ///
    /// Detect-once-then-pause: on the first successful decode the result
    /// and capture are recorded and the camera is stopped. Frames without a
    /// code are silently skipped; genuine decode errors are logged and the
    /// loop keeps going; transport errors stop the camera and surface.
    pub fn start_scanning(&mut self) -> Result<Option<String>> {
        if self.state != ScanState::CameraActive {
            log::warn!("scan requested without an active camera session");
            return Err(ScanError::NotActive);
        }

        let interval = Duration::from_millis(1000 / u64::from(self.config.fps.max(1)));
        let deadline = self.config.scan_timeout.map(|budget| Instant::now() + budget);

        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                log::info!("scan interrupted");
                break;
            }
            if deadline.is_some_and(|end| Instant::now() >= end) {
                log::info!("no code detected within the scan budget");
                break;
            }

            match self.engine.poll() {
                Ok(Some(hit)) => {
                    log::info!("code matched ({} bytes)", hit.text.len());
                    log::debug!("decoded text: {}", hit.text);
                    self.state = ScanState::Capturing;
                    self.last_result = Some(hit.text);
                    self.capture = Some(hit.capture);
                    self.stop_scanning()?;
                    return Ok(self.last_result.clone());
                }
                Ok(None) => {}
                Err(err @ ScanError::Decode(_)) => {
                    log::warn!("scan error (continuing): {err}");
                }
                Err(err) => {
                    log::error!("camera error during scan: {err}");
                    if let Err(stop_err) = self.stop_scanning() {
                        log::warn!("additionally failed to stop the camera: {stop_err}");
                    }
                    return Err(err);
                }
            }

            std::thread::sleep(interval);
        }

        self.stop_scanning()?;
        Ok(None)
    }

    /// Release the camera and return to `Idle`.
    ///
    /// Safe to call when already idle (no-op with a warning). The state
    /// becomes `Idle` even if the engine fails to stop, so no dangling
    /// handle is ever tracked.
    pub fn stop_scanning(&mut self) -> Result<()> {
        if self.state == ScanState::Idle {
            log::warn!("stop requested but no camera session is active");
            return Ok(());
        }

        let outcome = self.engine.stop();
        self.state = ScanState::Idle;
        match outcome {
            Ok(()) => {
                log::info!("camera stopped");
                Ok(())
            }
            Err(err) => {
                log::error!("error while stopping the camera: {err}");
                Err(err)
            }
        }
    }

    /// Stop the current session (if any), flip the facing mode, and open
    /// the camera on the other side.
    pub fn switch_camera(&mut self) -> Result<()> {
        if self.state != ScanState::Idle {
            self.stop_scanning()?;
        }

        self.facing = self.facing.opposite();
        log::info!("switched to the {} camera", self.facing);
        self.open_camera()
    }

    /// Decode a QR code from a still image file.
    ///
    /// An active camera session is stopped first; the file decode never
    /// overlaps a live acquisition. The state ends `Idle` either way.
    pub fn scan_from_file(&mut self, path: &Path) -> Result<String> {
        self.clear_result();
        if self.state != ScanState::Idle {
            log::info!("stopping the camera before the file scan");
            self.stop_scanning()?;
        }

        self.state = ScanState::FileScanning;
        log::info!("scanning image file {}", path.display());
        let outcome = self.engine.scan_file(path);
        self.state = ScanState::Idle;

        match outcome {
            Ok(text) => {
                log::info!("file decoded ({} bytes)", text.len());
                self.last_result = Some(text.clone());
                Ok(text)
            }
            Err(err) => {
                log::error!("file scan failed: {err}");
                Err(err)
            }
        }
    }

    /// Copy the last decoded text to the system clipboard.
    ///
    /// `NoResult` when there is nothing to copy; nothing is touched in
    /// that case.
    pub fn copy_result(&self) -> Result<()> {
        let text = self.last_result.as_deref().ok_or(ScanError::NoResult)?;
        export::copy_text(text)?;
        log::info!("result copied to the clipboard");
        Ok(())
    }

    /// Save the capture as a timestamped PNG under `dir` and release it.
    ///
    /// `NoCapture` when there is nothing to save; nothing is written in
    /// that case. Returns the path of the saved file.
    pub fn save_capture(&mut self, dir: &Path) -> Result<PathBuf> {
        let capture = self.capture.as_ref().ok_or(ScanError::NoCapture)?;
        let path = export::save_capture(capture, dir)?;
        self.capture = None;
        log::info!("capture saved to {}", path.display());
        Ok(path)
    }

    fn clear_result(&mut self) {
        if self.last_result.take().is_some() {
            log::debug!("previous result cleared");
        }
    }
}

impl<E: DecodeEngine> Drop for ScanController<E> {
    fn drop(&mut self) {
        if self.state != ScanState::Idle {
            if let Err(err) = self.engine.stop() {
                log::warn!("failed to release the camera on teardown: {err}");
            }
        }
    }
}
