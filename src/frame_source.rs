use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

/// Error type for failures reported by a [FrameSource] backend.
#[derive(Error, Debug, Clone)]
pub enum FrameSourceError {
    /// The backend could not open the file at all (missing, unreadable, or
    /// not recognisable as a video container).
    #[error("cannot open video source {src_path}: {reason}")]
    Open { src_path: PathBuf, reason: String },

    /// A seek to the requested frame index was rejected by the backend.
    #[error("seek to frame {index} failed: {reason}")]
    Seek { index: u64, reason: String },

    /// The frame at the requested index could not be decoded.
    #[error("decode of frame {index} failed: {reason}")]
    Decode { index: u64, reason: String },
}

/// A video decoding backend.
///
/// The hashing engine does not decode video itself; a driver supplies an
/// implementation of this trait (typically wrapping ffmpeg or gstreamer).
/// Backends are expected to be imperfect: reported frame counts and frame
/// rates may be wrong or zero, and individual seeks/decodes may fail. The
/// sampling policy in [crate::PerceptualHasher] tolerates all of this.
pub trait FrameSource: Send + Sync {
    fn open(&self, src_path: &Path) -> Result<Box<dyn VideoStream>, FrameSourceError>;
}

/// An opened video. Dropped to close.
pub trait VideoStream: Send {
    /// Total frame count as reported by the container. May be zero or simply
    /// wrong, callers must not trust it blindly.
    fn frame_count(&self) -> u64;

    /// Frames per second as reported by the container. May be zero or
    /// non-finite.
    fn fps(&self) -> f64;

    /// Seek to the given frame index and decode it. Each call performs a
    /// fresh seek, so retrying a failed read is meaningful.
    fn seek_and_read(&mut self, index: u64) -> Result<RgbImage, FrameSourceError>;
}
