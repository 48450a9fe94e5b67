//! QR code detection over grayscale images using rqrr.

use std::path::Path;

use image::GrayImage;
use rqrr::PreparedImage;

use crate::traits::{Result, ScanError};

/// Attempt to decode a QR code from a grayscale image.
///
/// `Ok(None)` means the image contains no code grid — the benign outcome a
/// decode loop silently skips. `Err(ScanError::Decode)` means a grid was
/// found but could not be read (damaged or misdetected code).
pub fn decode_luma(gray: &GrayImage) -> Result<Option<String>> {
    let mut prepared = PreparedImage::prepare(gray.clone());
    let grids = prepared.detect_grids();

    match grids.into_iter().next() {
        None => Ok(None),
        Some(grid) => match grid.decode() {
            Ok((_meta, content)) => Ok(Some(content)),
            Err(err) => Err(ScanError::Decode(err.to_string())),
        },
    }
}

/// Cut the centered detection window out of a full frame.
///
/// The window is clamped to the frame dimensions, so undersized frames are
/// scanned whole.
#[must_use]
pub fn crop_window(gray: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (frame_width, frame_height) = gray.dimensions();
    let width = width.min(frame_width);
    let height = height.min(frame_height);
    let x = (frame_width - width) / 2;
    let y = (frame_height - height) / 2;

    image::imageops::crop_imm(gray, x, y, width, height).to_image()
}

/// Decode a QR code from a still image file.
///
/// The whole image is scanned (no detection window). Unreadable files and
/// images without a decodable code both fold into `ScanError::FileScan` so
/// the caller has a single user-facing failure to report.
pub fn decode_image_file(path: &Path) -> Result<String> {
    let img = image::open(path).map_err(|err| ScanError::FileScan {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;

    match decode_luma(&img.to_luma8()) {
        Ok(Some(text)) => Ok(text),
        Ok(None) => Err(ScanError::FileScan {
            path: path.to_path_buf(),
            detail: "no QR code found in the image".to_owned(),
        }),
        Err(ScanError::Decode(detail)) => Err(ScanError::FileScan {
            path: path.to_path_buf(),
            detail,
        }),
        Err(other) => Err(other),
    }
}
