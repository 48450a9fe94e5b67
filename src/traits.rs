//! Core types, traits and the error taxonomy for camera QR scanning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{GrayImage, RgbImage};

/// Pixel format representation (e.g., YUYV, MJPG).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed). The only format the decode path consumes.
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width * 2; // YUYV is 2 bytes per pixel
        let size = stride * height;
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A raw video frame as produced by the camera device.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data (YUYV).
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Extract the luminance plane as a grayscale image.
    ///
    /// Walks the frame row by row using the format's stride, so padded
    /// frames convert correctly. Returns `None` if the buffer is shorter
    /// than the format promises.
    #[must_use]
    pub fn to_luma(&self, format: &Format) -> Option<GrayImage> {
        let (width, height) = (format.width, format.height);
        let mut luma = Vec::with_capacity((width * height) as usize);

        for row in 0..height {
            let start = (row * format.stride) as usize;
            let end = start + (width * 2) as usize;
            let line = self.data.get(start..end)?;
            for pixel_pair in line.chunks_exact(4) {
                if let [y0, _u, y1, _v] = pixel_pair {
                    luma.push(*y0);
                    luma.push(*y1);
                }
            }
        }

        GrayImage::from_raw(width, height, luma)
    }

    /// Convert the frame to an RGB image using BT.601 YUV conversion.
    ///
    /// Returns `None` if the buffer is shorter than the format promises.
    #[must_use]
    pub fn to_rgb(&self, format: &Format) -> Option<RgbImage> {
        let (width, height) = (format.width, format.height);
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);

        for row in 0..height {
            let start = (row * format.stride) as usize;
            let end = start + (width * 2) as usize;
            let line = self.data.get(start..end)?;
            for pixel_pair in line.chunks_exact(4) {
                if let [y0, u, y1, v] = pixel_pair {
                    for (r, g, b) in [yuv_to_rgb(*y0, *u, *v), yuv_to_rgb(*y1, *u, *v)] {
                        rgb.push(r);
                        rgb.push(g);
                        rgb.push(b);
                    }
                }
            }
        }

        RgbImage::from_raw(width, height, rgb)
    }
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    let clamp = |val: f32| -> u8 {
        if val < 0.0 {
            0
        } else if val > 255.0 {
            255
        } else {
            #[allow(clippy::cast_possible_truncation)]
            #[allow(clippy::cast_sign_loss)]
            {
                val as u8
            }
        }
    };

    (clamp(r), clamp(g), clamp(b))
}

/// Which physical camera is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// The rear (environment-facing) camera.
    Back,
    /// The front (user-facing) camera.
    Front,
}

impl Facing {
    /// The opposite facing mode.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Back => Self::Front,
            Self::Front => Self::Back,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Back => write!(f, "back"),
            Self::Front => write!(f, "front"),
        }
    }
}

impl std::str::FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "back" => Ok(Self::Back),
            "front" => Ok(Self::Front),
            other => Err(format!(
                "unknown facing mode '{other}' (expected 'back' or 'front')"
            )),
        }
    }
}

/// Scan parameters: decode rate, detection window and capture resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Decode attempts per second.
    pub fps: u32,
    /// Width of the centered detection window in pixels.
    pub window_width: u32,
    /// Height of the centered detection window in pixels.
    pub window_height: u32,
    /// Requested capture width in pixels.
    pub frame_width: u32,
    /// Requested capture height in pixels.
    pub frame_height: u32,
    /// How long to wait for a single frame from the camera.
    pub frame_timeout: Duration,
    /// Give up scanning after this long; `None` scans until interrupted.
    pub scan_timeout: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            window_width: 250,
            window_height: 250,
            frame_width: 640,
            frame_height: 480,
            frame_timeout: Duration::from_secs(2),
            scan_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ScanConfig {
    /// Set the decode rate.
    #[must_use]
    pub const fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the detection window dimensions.
    #[must_use]
    pub const fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Set the requested capture resolution.
    #[must_use]
    pub const fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    /// Set the per-frame wait budget.
    #[must_use]
    pub const fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Set the overall scan budget; `None` scans until interrupted.
    #[must_use]
    pub const fn with_scan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.scan_timeout = timeout;
        self
    }
}

/// A still image snapshot taken at the moment of a successful decode.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// PNG-encoded image data.
    pub png: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

/// A successful detection: the decoded text plus the capture of the frame
/// that produced it.
#[derive(Debug, Clone)]
pub struct ScanHit {
    /// Decoded text, immutable once received.
    pub text: String,
    /// Snapshot of the video frame the code was decoded from.
    pub capture: CapturedFrame,
}

/// Error type for scanning operations.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// No camera device exists for the requested facing mode.
    #[error("no {facing} camera at /dev/video{index}")]
    DeviceNotFound {
        /// Requested facing mode.
        facing: Facing,
        /// Device index that was probed.
        index: u32,
    },
    /// Failed to open or use the camera device.
    #[error("failed to open camera: {0}")]
    DeviceOpenFailed(String),
    /// The driver does not provide a format the decode path can consume.
    #[error("camera format not supported: {0}")]
    FormatNotSupported(String),
    /// Error during streaming operation.
    #[error("stream error: {0}")]
    StreamError(String),
    /// Waited too long for the camera.
    #[error("timed out waiting for the camera")]
    Timeout,
    /// A code grid was detected but could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// An image file could not be read or contained no decodable code.
    #[error("could not scan {path}: {detail}")]
    FileScan {
        /// The file that was scanned.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },
    /// The operation requires an active camera session.
    #[error("no active camera session")]
    NotActive,
    /// There is no decoded result to copy.
    #[error("no result to copy")]
    NoResult,
    /// There is no captured frame to save.
    #[error("no captured image to save")]
    NoCapture,
    /// Clipboard access failed.
    #[error("clipboard error: {0}")]
    Clipboard(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for scanning operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Abstraction over capture stream operations.
pub trait CaptureStream {
    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Maps a facing mode to an opened camera device.
///
/// `Clone + Send` because the decoding engine opens the device on its
/// capture worker thread.
pub trait CameraBackend: Clone + Send + 'static {
    /// The device type this backend opens.
    type Device: CameraDevice;

    /// Open the camera for the given facing mode.
    fn open(&self, facing: Facing) -> Result<Self::Device>;
}

/// The decoding engine contract consumed by the scan controller.
///
/// All operations are serialized blocking calls: each returns only once the
/// camera transition it names has completed, so a stop always finishes
/// before the next start or file scan begins.
pub trait DecodeEngine {
    /// Acquire the camera for `facing` and begin streaming frames.
    ///
    /// Must not leave a live camera handle behind on failure.
    fn start(&mut self, facing: Facing, config: &ScanConfig) -> Result<()>;

    /// Release the camera. No-op when no session is live.
    fn stop(&mut self) -> Result<()>;

    /// One decode attempt against the live feed.
    ///
    /// `Ok(Some(hit))` on detection, `Ok(None)` when the current frame
    /// contains no code, `Err` for genuine decode or transport errors.
    fn poll(&mut self) -> Result<Option<ScanHit>>;

    /// Decode a QR code from a still image file.
    fn scan_file(&mut self, path: &Path) -> Result<String>;
}
