//! Mock camera and engine implementations for testing without hardware.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, Luma};

use crate::traits::{
    CameraBackend, CameraDevice, CapturedFrame, CaptureStream, DecodeEngine, DeviceCapabilities,
    Facing, Format, FourCC, Frame, FrameMetadata, Result, ScanConfig, ScanError, ScanHit,
};

/// Render a QR code for `text` as a grayscale image.
///
/// Each module becomes a `scale`×`scale` pixel block with a four-module
/// quiet zone, which is what rqrr needs to lock onto the finder patterns.
pub fn qr_luma(text: &str, scale: u32) -> GrayImage {
    let code = qrcode::QrCode::new(text.as_bytes()).expect("test payload fits in a QR code");
    let colors = code.to_colors();
    let modules = code.width();
    let border = 4usize;
    let scale_px = scale.max(1) as usize;
    let size = ((modules + 2 * border) * scale_px) as u32;

    let mut img = GrayImage::from_pixel(size, size, Luma([255]));
    for (idx, color) in colors.iter().enumerate() {
        if *color == qrcode::Color::Dark {
            let module_x = (idx % modules + border) * scale_px;
            let module_y = (idx / modules + border) * scale_px;
            for dy in 0..scale_px {
                for dx in 0..scale_px {
                    img.put_pixel((module_x + dx) as u32, (module_y + dy) as u32, Luma([0]));
                }
            }
        }
    }

    img
}

/// Render a QR code centered on a white canvas of the given dimensions.
///
/// The code is scaled to fit within `target` pixels so it stays inside a
/// centered detection window smaller than the frame.
pub fn qr_luma_canvas(text: &str, width: u32, height: u32, target: u32) -> GrayImage {
    let code = qrcode::QrCode::new(text.as_bytes()).expect("test payload fits in a QR code");
    let total_modules = (code.width() + 8) as u32; // quiet zone on both sides
    let scale = (target / total_modules).max(1);

    let qr = qr_luma(text, scale);
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    let x = i64::from(width.saturating_sub(qr.width()) / 2);
    let y = i64::from(height.saturating_sub(qr.height()) / 2);
    image::imageops::replace(&mut canvas, &qr, x, y);

    canvas
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone)]
pub enum TestPattern {
    /// Uniform white frame (nothing to detect).
    Blank,
    /// Horizontal luminance ramp (structured but code-free).
    Gradient,
    /// A decodable QR code centered in the frame.
    Qr(String),
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    frame_count: u32,
    pattern: TestPattern,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            frame_count: 0,
            pattern: TestPattern::Blank,
        }
    }

    /// Set the format for this mock device.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set the test pattern the device's streams will produce.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        self.format = format.clone();
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream { device: self })
    }
}

/// Mock capture stream generating pattern frames.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        // Pace like a camera would; keeps engine worker loops from spinning.
        std::thread::sleep(Duration::from_millis(10));

        let format = &self.device.format;
        let luma = pattern_luma(&self.device.pattern, format.width, format.height);
        let data = luma_to_yuyv(&luma);

        let seq = self.device.frame_count;
        self.device.frame_count += 1;

        Ok(Frame {
            data,
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used: format.size,
            },
        })
    }
}

/// Render a pattern as a frame-sized luma canvas.
fn pattern_luma(pattern: &TestPattern, width: u32, height: u32) -> GrayImage {
    match pattern {
        TestPattern::Blank => GrayImage::from_pixel(width, height, Luma([255])),
        TestPattern::Gradient => GrayImage::from_fn(width, height, |x, _y| {
            #[allow(clippy::cast_possible_truncation)]
            let shade = ((x * 255) / width.max(1)) as u8;
            Luma([shade])
        }),
        TestPattern::Qr(text) => {
            let target = width.min(height).min(240);
            qr_luma_canvas(text, width, height, target)
        }
    }
}

/// Pack a luma image into YUYV bytes with neutral chroma.
fn luma_to_yuyv(luma: &GrayImage) -> Vec<u8> {
    let mut data = Vec::with_capacity((luma.width() * luma.height() * 2) as usize);
    for y_val in luma.as_raw() {
        data.push(*y_val);
        data.push(128);
    }
    data
}

/// Mock backend handing out pattern devices, or refusing to open at all.
#[derive(Debug, Clone)]
pub struct MockBackend {
    pattern: TestPattern,
    fail_open: bool,
}

impl MockBackend {
    /// Backend whose devices produce the given pattern.
    #[must_use]
    pub fn new(pattern: TestPattern) -> Self {
        Self {
            pattern,
            fail_open: false,
        }
    }

    /// Backend that fails every open, as a permission-denied camera would.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            pattern: TestPattern::Blank,
            fail_open: true,
        }
    }
}

impl CameraBackend for MockBackend {
    type Device = MockDevice;

    fn open(&self, facing: Facing) -> Result<Self::Device> {
        if self.fail_open {
            return Err(ScanError::DeviceOpenFailed(format!(
                "mock {facing} camera refused to open"
            )));
        }
        Ok(MockDevice::new().with_pattern(self.pattern.clone()))
    }
}

/// Engine operations observable on a [`MockEngine`] op log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    /// Camera acquired for a facing mode.
    Start(Facing),
    /// Camera released.
    Stop,
    /// Still image handed to the engine.
    ScanFile(PathBuf),
}

/// Scripted decoding engine for controller tests.
///
/// Poll outcomes are consumed front to back; once exhausted, polls report
/// "no code in this frame". Start/stop/file operations land in a shared op
/// log so tests can assert ordering.
pub struct MockEngine {
    ops: Arc<Mutex<Vec<EngineOp>>>,
    polls: VecDeque<Result<Option<ScanHit>>>,
    start_errors: VecDeque<ScanError>,
    file_outcome: Option<Result<String>>,
    active: bool,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create an engine that starts cleanly and never detects anything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Arc::new(Mutex::new(Vec::new())),
            polls: VecDeque::new(),
            start_errors: VecDeque::new(),
            file_outcome: None,
            active: false,
        }
    }

    /// Script the outcomes of successive polls.
    #[must_use]
    pub fn with_polls(mut self, polls: Vec<Result<Option<ScanHit>>>) -> Self {
        self.polls = polls.into();
        self
    }

    /// Make the next start fail with the given error.
    #[must_use]
    pub fn with_start_error(mut self, err: ScanError) -> Self {
        self.start_errors.push_back(err);
        self
    }

    /// Script the outcome of the next file scan.
    #[must_use]
    pub fn with_file_outcome(mut self, outcome: Result<String>) -> Self {
        self.file_outcome = Some(outcome);
        self
    }

    /// Handle on the op log; clone it out before handing the engine over.
    #[must_use]
    pub fn ops_handle(&self) -> Arc<Mutex<Vec<EngineOp>>> {
        Arc::clone(&self.ops)
    }

    /// A detection with a small but plausible PNG capture.
    #[must_use]
    pub fn hit(text: &str) -> ScanHit {
        ScanHit {
            text: text.to_owned(),
            capture: CapturedFrame {
                png: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
                width: 640,
                height: 480,
            },
        }
    }

    fn record(&self, op: EngineOp) {
        self.ops.lock().expect("ops lock").push(op);
    }
}

impl DecodeEngine for MockEngine {
    fn start(&mut self, facing: Facing, _config: &ScanConfig) -> Result<()> {
        self.record(EngineOp::Start(facing));
        if let Some(err) = self.start_errors.pop_front() {
            return Err(err);
        }
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(EngineOp::Stop);
        self.active = false;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ScanHit>> {
        if !self.active {
            return Err(ScanError::NotActive);
        }
        self.polls.pop_front().unwrap_or(Ok(None))
    }

    fn scan_file(&mut self, path: &Path) -> Result<String> {
        self.record(EngineOp::ScanFile(path.to_path_buf()));
        self.file_outcome.take().unwrap_or_else(|| {
            Err(ScanError::FileScan {
                path: path.to_path_buf(),
                detail: "no scripted outcome".to_owned(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr;

    #[test]
    fn mock_stream_frames_are_sequential() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert!(!frame1.data.is_empty());

        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn qr_pattern_decodes_through_frame_conversion() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let mut device = MockDevice::new()
            .with_format(format.clone())
            .with_pattern(TestPattern::Qr("MOCK-FRAME".to_owned()));
        let mut stream = device.create_stream(1).expect("create_stream should succeed");
        let frame = stream.next_frame().expect("next_frame should succeed");

        let gray = frame.to_luma(&format).expect("luma conversion");
        let decoded = qr::decode_luma(&gray).expect("decode should not error");
        assert_eq!(decoded.as_deref(), Some("MOCK-FRAME"));
    }

    #[test]
    fn blank_pattern_has_no_code() {
        let format = Format::new(320, 240, FourCC::YUYV);
        let mut device = MockDevice::new().with_format(format.clone());
        let mut stream = device.create_stream(1).expect("create_stream should succeed");
        let frame = stream.next_frame().expect("next_frame should succeed");

        let gray = frame.to_luma(&format).expect("luma conversion");
        assert!(qr::decode_luma(&gray)
            .expect("blank frame should not error")
            .is_none());
    }

    #[test]
    fn failing_backend_reports_open_error() {
        let backend = MockBackend::failing();
        assert!(matches!(
            backend.open(Facing::Back),
            Err(ScanError::DeviceOpenFailed(_))
        ));
    }
}
