use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{trace, warn};
use serde::{Deserialize, Serialize};

use super::{frame_hash::FrameHash, hash_creation_error_kind::HashCreationErrorKind};
use crate::{
    definitions::*,
    frame_source::{FrameSource, VideoStream},
    progress::CancellationToken,
};

/// The frame-hashing algorithm in use. Each method gets its own cache
/// document, so fingerprints from different algorithms never mix.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub enum HashMethod {
    #[default]
    PHash,
}

impl HashMethod {
    pub fn cache_file_name(&self) -> &'static str {
        match self {
            Self::PHash => "video_hashes_phash.json",
        }
    }
}

impl std::fmt::Display for HashMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PHash => write!(f, "pHash"),
        }
    }
}

/// The content fingerprint of one video file: an ordered sequence of
/// per-frame hashes plus the video duration.
///
/// Frame order matters. Two fingerprints are compared positionally, so the
/// sampling policy must put comparable videos' samples at comparable
/// relative offsets (see [PerceptualHasher]).
///
/// Invariant: at least [MIN_FRAMES] frames. Fingerprints that would fall
/// short are rejected at construction and never reach the cache.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct VideoFingerprint {
    src_path: PathBuf,
    frames: Vec<FrameHash>,
    duration: f64,
    sample_indices: Vec<u64>,
}

impl VideoFingerprint {
    pub fn from_components(
        src_path: impl AsRef<Path>,
        frames: Vec<FrameHash>,
        duration: f64,
        sample_indices: Vec<u64>,
    ) -> Result<Self, HashCreationErrorKind> {
        if frames.len() < MIN_FRAMES {
            return Err(HashCreationErrorKind::InsufficientSamples {
                src_path: src_path.as_ref().to_path_buf(),
                valid: frames.len(),
                sampled: sample_indices.len(),
            });
        }

        Ok(Self {
            src_path: src_path.as_ref().to_path_buf(),
            frames,
            duration,
            sample_indices,
        })
    }

    /// The path to the video file from which this fingerprint was created.
    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    /// The per-frame hashes, in sampling order.
    pub fn frames(&self) -> &[FrameHash] {
        &self.frames
    }

    /// The duration of the video, in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The frame indices that produced the hashes. Diagnostic only; not used
    /// in comparisons.
    pub fn sample_indices(&self) -> &[u64] {
        &self.sample_indices
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }
}

/// Turns video files into [VideoFingerprint]s by sampling a handful of
/// frames and hashing each one.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerceptualHasher {
    method: HashMethod,
}

impl PerceptualHasher {
    pub fn new(method: HashMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> HashMethod {
        self.method
    }

    /// Create a fingerprint from the video file at src_path.
    ///
    /// The reported frame count is not trusted when zero: the video is then
    /// probed sequentially (bounded) to estimate an effective count before
    /// sample points are chosen. Individual frame reads are retried a few
    /// times; the whole computation is abandoned once too many reads fail or
    /// too few frames hash successfully.
    pub fn hash_video(
        &self,
        src_path: impl AsRef<Path>,
        source: &dyn FrameSource,
        cancel: &CancellationToken,
    ) -> Result<VideoFingerprint, HashCreationErrorKind> {
        let src_path = src_path.as_ref();

        let mut stream =
            source
                .open(src_path)
                .map_err(|error| HashCreationErrorKind::SourceUnavailable {
                    src_path: src_path.to_path_buf(),
                    error,
                })?;

        let fps = match stream.fps() {
            fps if fps.is_finite() && fps > 0.0 => fps,
            _ => DEFAULT_FPS,
        };

        let total_frames = match stream.frame_count() {
            0 => {
                warn!(
                    target: "perceptual_hash",
                    "unreliable frame count reported for {}, probing sequentially",
                    src_path.display()
                );
                match Self::probe_frame_count(stream.as_mut()) {
                    0 => {
                        return Err(HashCreationErrorKind::DecodeFailure {
                            src_path: src_path.to_path_buf(),
                        })
                    }
                    probed => probed,
                }
            }
            reported => reported,
        };

        let sample_indices = plan_sample_indices(total_frames);

        let mut frame_hashes = Vec::with_capacity(sample_indices.len());
        let mut hashed_indices = Vec::with_capacity(sample_indices.len());
        let mut read_failures = 0u32;

        for &index in &sample_indices {
            if cancel.is_cancelled() {
                return Err(HashCreationErrorKind::Cancelled(src_path.to_path_buf()));
            }

            match Self::read_with_retries(stream.as_mut(), index) {
                Some(frame) => {
                    //frames that decode but fail to hash are simply skipped
                    if let Some(hash) = FrameHash::from_frame(&frame) {
                        frame_hashes.push(hash);
                        hashed_indices.push(index);
                    }
                }
                None => {
                    read_failures += 1;
                    warn!(
                        target: "perceptual_hash",
                        "giving up on frame {index} of {}", src_path.display()
                    );
                    if read_failures >= MAX_READ_FAILURES {
                        warn!(
                            target: "perceptual_hash",
                            "too many read failures for {}, aborting", src_path.display()
                        );
                        break;
                    }
                }
            }
        }

        if frame_hashes.len() < MIN_FRAMES {
            return Err(HashCreationErrorKind::InsufficientSamples {
                src_path: src_path.to_path_buf(),
                valid: frame_hashes.len(),
                sampled: sample_indices.len(),
            });
        }

        let duration = total_frames as f64 / fps;
        VideoFingerprint::from_components(src_path, frame_hashes, duration, hashed_indices)
    }

    //Estimate an effective frame count by decoding from the start until the
    //stream gives out, capped so a pathological file cannot stall us.
    fn probe_frame_count(stream: &mut dyn VideoStream) -> u64 {
        let mut count = 0u64;
        while count < SEQUENTIAL_PROBE_LIMIT {
            match stream.seek_and_read(count) {
                Ok(_frame) => count += 1,
                Err(_) => break,
            }
        }
        count
    }

    fn read_with_retries(stream: &mut dyn VideoStream, index: u64) -> Option<RgbImage> {
        for attempt in 0..SEEK_RETRY_LIMIT {
            //each seek_and_read re-seeks, so retrying is meaningful
            match stream.seek_and_read(index) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    trace!(
                        target: "perceptual_hash",
                        "read of frame {index} failed (attempt {}): {e}",
                        attempt + 1
                    );
                }
            }
        }
        None
    }
}

/// Choose which frame indices to sample for a video of the given length.
///
/// Short videos are sampled at fixed relative offsets so fingerprints stay
/// positionally comparable across lengths; long videos get a bounded number
/// of evenly spaced samples. An early and a late frame are always included,
/// and the result is deduplicated and sorted.
pub(crate) fn plan_sample_indices(total_frames: u64) -> Vec<u64> {
    let mut indices: Vec<u64> = if total_frames < SHORT_VIDEO_FRAME_LIMIT {
        SHORT_VIDEO_OFFSETS
            .iter()
            .map(|offset| (total_frames as f64 * offset) as u64)
            .collect()
    } else {
        let num_samples = (total_frames / LONG_VIDEO_FRAMES_PER_SAMPLE)
            .clamp(1, MAX_SAMPLED_FRAMES);
        (0..num_samples)
            .map(|sample_no| sample_no * total_frames / num_samples)
            .collect()
    };

    let early = total_frames / 10;
    let late = total_frames.saturating_mul(9) / 10;
    if !indices.iter().any(|&index| index <= early) {
        indices.push(early);
    }
    if !indices.iter().any(|&index| index >= late) {
        indices.push(late);
    }

    let max_index = total_frames.saturating_sub(1);
    for index in indices.iter_mut() {
        *index = (*index).min(max_index);
    }
    indices.sort_unstable();
    indices.dedup();

    //very short videos can collapse to fewer candidates than the minimum
    //frame count. Pad with the first few sequential frames.
    if indices.len() < MIN_FRAMES {
        indices.extend(0..total_frames.min(5));
        indices.sort_unstable();
        indices.dedup();
    }

    indices
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{textured_frame, MemoryFrameSource, ScriptedVideo};

    #[test]
    fn test_short_video_sampled_at_relative_offsets() {
        assert_eq!(plan_sample_indices(100), vec![10, 30, 50, 70, 90]);
        assert_eq!(plan_sample_indices(10), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_long_video_sampling_is_bounded() {
        let indices = plan_sample_indices(100_000);
        assert_eq!(indices.len(), MAX_SAMPLED_FRAMES as usize);
        assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_sampling_includes_early_and_late_frame() {
        for total in [10, 100, 1200, 5000, 100_000] {
            let indices = plan_sample_indices(total);
            assert!(
                *indices.first().unwrap() <= total / 10,
                "no early frame for total {total}: {indices:?}"
            );
            assert!(
                *indices.last().unwrap() >= total * 9 / 10,
                "no late frame for total {total}: {indices:?}"
            );
        }
    }

    #[test]
    fn test_sampling_of_tiny_video_pads_sequentially() {
        assert_eq!(plan_sample_indices(3), vec![0, 1, 2]);
        assert_eq!(plan_sample_indices(1), vec![0]);
    }

    #[test]
    fn test_hash_video_happy_path() {
        let source = MemoryFrameSource::new();
        let frames = (0..100).map(|_| textured_frame(7)).collect();
        source.insert("/vids/a.mp4", ScriptedVideo::new(frames));

        let hasher = PerceptualHasher::default();
        let fingerprint = hasher
            .hash_video("/vids/a.mp4", &source, &CancellationToken::new())
            .unwrap();

        assert_eq!(fingerprint.len(), 5);
        assert_eq!(fingerprint.sample_indices(), &[10, 30, 50, 70, 90]);
        assert!((fingerprint.duration() - 100.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_hash_video_estimates_frame_count_when_unreported() {
        let source = MemoryFrameSource::new();
        let video = ScriptedVideo::textured(3, 20).with_reported_frame_count(0);
        source.insert("/vids/b.mp4", video);

        let hasher = PerceptualHasher::default();
        let fingerprint = hasher
            .hash_video("/vids/b.mp4", &source, &CancellationToken::new())
            .unwrap();

        //probe finds 20 frames, so short-video offsets apply
        assert_eq!(fingerprint.sample_indices(), &[2, 6, 10, 14, 18]);
    }

    #[test]
    fn test_hash_video_defaults_fps_when_unreported() {
        let source = MemoryFrameSource::new();
        source.insert("/vids/c.mp4", ScriptedVideo::textured(1, 60).with_fps(0.0));

        let fingerprint = PerceptualHasher::default()
            .hash_video("/vids/c.mp4", &source, &CancellationToken::new())
            .unwrap();
        assert!((fingerprint.duration() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_hash_video_missing_file_is_source_unavailable() {
        let source = MemoryFrameSource::new();
        let err = PerceptualHasher::default()
            .hash_video("/vids/nope.mp4", &source, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, HashCreationErrorKind::SourceUnavailable { .. }));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_hash_video_undecodable_file_is_decode_failure() {
        let source = MemoryFrameSource::new();
        let video = ScriptedVideo::textured(5, 10)
            .with_reported_frame_count(0)
            .with_failing_indices(0..10);
        source.insert("/vids/corrupt.mp4", video);

        let err = PerceptualHasher::default()
            .hash_video("/vids/corrupt.mp4", &source, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, HashCreationErrorKind::DecodeFailure { .. }));
    }

    #[test]
    fn test_hash_video_too_few_valid_frames_is_insufficient_samples() {
        let source = MemoryFrameSource::new();
        //only frames 10 and 30 decode; the other sample points fail
        let video = ScriptedVideo::textured(11, 100).with_failing_indices([50, 70, 90]);
        source.insert("/vids/flaky.mp4", video);

        let err = PerceptualHasher::default()
            .hash_video("/vids/flaky.mp4", &source, &CancellationToken::new())
            .unwrap_err();
        match err {
            HashCreationErrorKind::InsufficientSamples { valid, .. } => assert_eq!(valid, 2),
            other => panic!("expected InsufficientSamples, got {other:?}"),
        }
    }

    #[test]
    fn test_hash_video_observes_cancellation() {
        let source = MemoryFrameSource::new();
        source.insert("/vids/d.mp4", ScriptedVideo::textured(2, 100));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = PerceptualHasher::default()
            .hash_video("/vids/d.mp4", &source, &cancel)
            .unwrap_err();
        assert!(matches!(err, HashCreationErrorKind::Cancelled(_)));
        assert_eq!(source.decode_count(), 0);
    }

    #[test]
    fn test_hashing_is_repeatable() {
        let source = MemoryFrameSource::new();
        source.insert("/vids/e.mp4", ScriptedVideo::textured(42, 50));

        let hasher = PerceptualHasher::default();
        let first = hasher
            .hash_video("/vids/e.mp4", &source, &CancellationToken::new())
            .unwrap();
        let second = hasher
            .hash_video("/vids/e.mp4", &source, &CancellationToken::new())
            .unwrap();
        assert_eq!(first, second);
    }
}
