//! Result export: clipboard copy and capture download.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::traits::{CapturedFrame, Result, ScanError};

/// Copy text to the system clipboard.
pub fn copy_text(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|err| ScanError::Clipboard(err.to_string()))?;
    clipboard
        .set_text(text)
        .map_err(|err| ScanError::Clipboard(err.to_string()))
}

/// File name for a capture taken at the given moment.
#[must_use]
pub fn capture_file_name(taken_at: DateTime<Local>) -> String {
    taken_at
        .format("qr-captured-image_%Y-%m-%d_%H-%M-%S.png")
        .to_string()
}

/// Write the capture as a timestamped PNG under `dir`.
///
/// Returns the path of the written file.
pub fn save_capture(capture: &CapturedFrame, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(capture_file_name(Local::now()));
    std::fs::write(&path, &capture.png)?;
    Ok(path)
}
