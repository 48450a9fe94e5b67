//! V4L2 camera access using the v4l crate, selected by facing mode.

use std::fs;
use std::path::PathBuf;

use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    CameraBackend, CameraDevice, CaptureStream, DeviceCapabilities, Facing, Format, FourCC, Frame,
    FrameMetadata, Result, ScanError,
};
use std::time::Duration;

/// Sysfs root exposing one entry per video device node.
const SYSFS_VIDEO4LINUX: &str = "/sys/class/video4linux";

/// Read the human-readable name of a video device from sysfs, if present.
#[must_use]
pub fn device_name(index: u32) -> Option<String> {
    let name_path = PathBuf::from(SYSFS_VIDEO4LINUX)
        .join(format!("video{index}"))
        .join("name");
    fs::read_to_string(name_path)
        .ok()
        .map(|name| name.trim().to_owned())
}

/// Facing-mode to V4L2 device index mapping.
///
/// Defaults to back=/dev/video0, front=/dev/video1; systems with a single
/// camera can point both at the same index.
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    back_index: u32,
    front_index: u32,
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl V4l2Backend {
    /// Create a backend with explicit device indices per facing mode.
    #[must_use]
    pub const fn new(back_index: u32, front_index: u32) -> Self {
        Self {
            back_index,
            front_index,
        }
    }

    /// The device index the given facing mode maps to.
    #[must_use]
    pub const fn index_for(&self, facing: Facing) -> u32 {
        match facing {
            Facing::Back => self.back_index,
            Facing::Front => self.front_index,
        }
    }
}

impl CameraBackend for V4l2Backend {
    type Device = V4l2Device;

    fn open(&self, facing: Facing) -> Result<Self::Device> {
        let index = self.index_for(facing);
        let sysfs_entry = PathBuf::from(SYSFS_VIDEO4LINUX).join(format!("video{index}"));
        if !sysfs_entry.exists() {
            return Err(ScanError::DeviceNotFound { facing, index });
        }

        if let Some(name) = device_name(index) {
            log::debug!("opening {facing} camera /dev/video{index} ({name})");
        }

        V4l2Device::open(index)
    }
}

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4l2Device {
    device: Device,
    capabilities: DeviceCapabilities,
}

impl V4l2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    ///
    /// Verifies the device can capture and stream video; metadata-only
    /// nodes are rejected up front.
    pub fn open(index: u32) -> Result<Self> {
        let device = Device::new(index as usize)
            .map_err(|err| ScanError::DeviceOpenFailed(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| ScanError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        if !capabilities.can_capture || !capabilities.can_stream {
            return Err(ScanError::DeviceOpenFailed(format!(
                "/dev/video{index} ({}) cannot capture a video stream",
                capabilities.card
            )));
        }

        Ok(Self {
            device,
            capabilities,
        })
    }
}

impl CameraDevice for V4l2Device {
    type Stream<'a> = V4l2Stream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| ScanError::StreamError(err.to_string()))?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| ScanError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| ScanError::StreamError(err.to_string()))?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| ScanError::StreamError(err.to_string()))?;

        Ok(V4l2Stream { stream })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4l2Stream<'a> {
    stream: Stream<'a>,
}

impl CaptureStream for V4l2Stream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|err| ScanError::StreamError(err.to_string()))?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        Ok(Frame {
            data: buf.to_vec(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        })
    }
}
