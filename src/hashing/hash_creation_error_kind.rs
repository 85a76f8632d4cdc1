use std::path::PathBuf;

use thiserror::Error;

use crate::frame_source::FrameSourceError;

/// Error type for the various reasons why a [VideoFingerprint][crate::VideoFingerprint]
/// could not be created from a video file.
#[derive(Error, Debug, Clone)]
pub enum HashCreationErrorKind {
    /// The file is missing or the decoding backend could not open it.
    /// Likely permanent; the file should be excluded from comparisons until
    /// it reappears.
    #[error("source unavailable: {error}")]
    SourceUnavailable { src_path: PathBuf, error: FrameSourceError },

    /// No frame of the video could be decoded, even after retries. Likely a
    /// corrupt file.
    #[error("cannot decode any frame of {src_path}")]
    DecodeFailure { src_path: PathBuf },

    /// Fewer frames hashed successfully than the minimum needed for a usable
    /// fingerprint. May succeed on retry with a different sampling density.
    #[error("insufficient valid samples for {src_path}: {valid} of {sampled} sampled frames")]
    InsufficientSamples {
        src_path: PathBuf,
        valid: usize,
        sampled: usize,
    },

    /// Hashing was stopped by a cooperative cancellation request. Not a
    /// fault of the file.
    #[error("hashing of {0} was cancelled")]
    Cancelled(PathBuf),
}

impl HashCreationErrorKind {
    /// Whether retrying the same file without outside intervention is
    /// pointless.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::DecodeFailure { .. }
        )
    }

    pub fn src_path(&self) -> &std::path::Path {
        match self {
            Self::SourceUnavailable { src_path, .. }
            | Self::DecodeFailure { src_path }
            | Self::InsufficientSamples { src_path, .. } => src_path,
            Self::Cancelled(src_path) => src_path,
        }
    }
}
