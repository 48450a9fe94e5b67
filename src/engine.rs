//! Production decoding engine: a capture worker per camera session feeding
//! the rqrr decode glue.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::qr;
use crate::traits::{
    CameraBackend, CameraDevice, CapturedFrame, CaptureStream, DecodeEngine, Facing, Format,
    FourCC, Frame, Result, ScanConfig, ScanError, ScanHit,
};

/// Buffers requested from the camera driver.
const BUFFER_COUNT: u32 = 4;

/// How long `start` waits for the worker to acquire the camera.
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Decoding engine over a camera backend.
///
/// Owns camera acquisition and release: `start` spawns a worker thread that
/// holds the device handle and streams frames over a bounded channel, `stop`
/// signals the worker and joins it. At most one session is live at a time.
pub struct CameraEngine<B: CameraBackend> {
    backend: B,
    session: Option<Session>,
}

/// Live camera acquisition state.
struct Session {
    frames: Receiver<Result<Frame>>,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
    format: Format,
    config: ScanConfig,
}

impl<B: CameraBackend> CameraEngine<B> {
    /// Create an engine over the given camera backend.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            session: None,
        }
    }
}

impl<B: CameraBackend> DecodeEngine for CameraEngine<B> {
    fn start(&mut self, facing: Facing, config: &ScanConfig) -> Result<()> {
        if self.session.is_some() {
            log::warn!("engine start requested with a live session, stopping it first");
            self.stop()?;
        }

        let (ready_tx, ready_rx) = bounded::<Result<Format>>(1);
        let (frame_tx, frame_rx) = bounded::<Result<Frame>>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let backend = self.backend.clone();
        let requested = Format::new(config.frame_width, config.frame_height, FourCC::YUYV);
        let stop_flag = Arc::clone(&stop);
        let worker = std::thread::Builder::new()
            .name("qr-cam-capture".to_owned())
            .spawn(move || {
                capture_loop(&backend, facing, &requested, &ready_tx, &frame_tx, &stop_flag);
            })?;

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(format)) => {
                log::debug!(
                    "{facing} camera streaming at {}x{} {:?}",
                    format.width,
                    format.height,
                    format.fourcc
                );
                self.session = Some(Session {
                    frames: frame_rx,
                    stop,
                    worker,
                    format,
                    config: config.clone(),
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                drop(frame_rx);
                let _ = worker.join();
                Err(ScanError::Timeout)
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let Session {
            frames,
            stop,
            worker,
            ..
        } = session;

        stop.store(true, Ordering::SeqCst);
        drop(frames);
        worker
            .join()
            .map_err(|_| ScanError::StreamError("camera worker panicked".to_owned()))?;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ScanHit>> {
        let session = self.session.as_mut().ok_or(ScanError::NotActive)?;

        let frame = match session.frames.recv_timeout(session.config.frame_timeout) {
            Ok(frame) => frame?,
            Err(RecvTimeoutError::Timeout) => return Err(ScanError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ScanError::StreamError("camera worker exited".to_owned()))
            }
        };

        let gray = frame.to_luma(&session.format).ok_or_else(|| {
            ScanError::StreamError("camera frame shorter than its format".to_owned())
        })?;
        let window = qr::crop_window(
            &gray,
            session.config.window_width,
            session.config.window_height,
        );

        match qr::decode_luma(&window)? {
            None => Ok(None),
            Some(text) => {
                let capture = encode_capture(&frame, &session.format)?;
                Ok(Some(ScanHit { text, capture }))
            }
        }
    }

    fn scan_file(&mut self, path: &Path) -> Result<String> {
        qr::decode_image_file(path)
    }
}

impl<B: CameraBackend> Drop for CameraEngine<B> {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(err) = self.stop() {
                log::warn!("failed to release camera on engine drop: {err}");
            }
        }
    }
}

/// Worker body: acquire the device, report readiness, then stream frames
/// until told to stop. Every early return releases the device.
fn capture_loop<B: CameraBackend>(
    backend: &B,
    facing: Facing,
    requested: &Format,
    ready: &Sender<Result<Format>>,
    frames: &Sender<Result<Frame>>,
    stop: &AtomicBool,
) {
    let mut device = match backend.open(facing) {
        Ok(device) => device,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let format = match device.set_format(requested) {
        Ok(format) => format,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if format.fourcc != FourCC::YUYV {
        let _ = ready.send(Err(ScanError::FormatNotSupported(format!(
            "driver offers {:?} instead of YUYV",
            format.fourcc
        ))));
        return;
    }

    let mut stream = match device.create_stream(BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    if ready.send(Ok(format)).is_err() {
        return;
    }

    while !stop.load(Ordering::SeqCst) {
        let frame = stream.next_frame();
        let failed = frame.is_err();
        match frames.try_send(frame) {
            // Full: the receiver is still holding the previous frame
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => return,
        }
        if failed {
            return;
        }
    }
}

/// Encode the frame that produced a detection as a PNG snapshot.
fn encode_capture(frame: &Frame, format: &Format) -> Result<CapturedFrame> {
    let rgb = frame.to_rgb(format).ok_or_else(|| {
        ScanError::StreamError("camera frame shorter than its format".to_owned())
    })?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|err| ScanError::StreamError(format!("failed to encode capture: {err}")))?;

    Ok(CapturedFrame {
        png,
        width: format.width,
        height: format.height,
    })
}
