//! In-memory [FrameSource] double and fingerprint builders used by unit and
//! integration tests. Hidden from the public docs, not part of the stable API.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    },
};

use image::RgbImage;
use parking_lot::Mutex;

use crate::{
    frame_source::{FrameSource, FrameSourceError, VideoStream},
    FrameHash, VideoFingerprint,
};

/// A scripted stand-in for a decoding backend. Videos are registered up
/// front; opens and decodes are counted so tests can assert that the cache
/// avoided recomputation. Clones share the registry and the counter, so a
/// test can hand one clone to an engine and keep another for assertions.
#[derive(Clone, Default)]
pub struct MemoryFrameSource {
    videos: Arc<Mutex<HashMap<PathBuf, ScriptedVideo>>>,
    decode_count: Arc<AtomicUsize>,
}

impl MemoryFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, src_path: impl AsRef<Path>, video: ScriptedVideo) {
        self.videos
            .lock()
            .insert(src_path.as_ref().to_path_buf(), video);
    }

    /// Total number of successful frame decodes across all opened streams.
    pub fn decode_count(&self) -> usize {
        self.decode_count.load(Relaxed)
    }
}

impl FrameSource for MemoryFrameSource {
    fn open(&self, src_path: &Path) -> Result<Box<dyn VideoStream>, FrameSourceError> {
        match self.videos.lock().get(src_path) {
            Some(video) => Ok(Box::new(MemoryStream {
                video: video.clone(),
                decode_count: Arc::clone(&self.decode_count),
            })),
            None => Err(FrameSourceError::Open {
                src_path: src_path.to_path_buf(),
                reason: "no such scripted video".to_owned(),
            }),
        }
    }
}

/// The script for one fake video: its decodable frames, what the container
/// claims about itself (which may disagree with reality), and indices whose
/// decodes should fail.
#[derive(Clone)]
pub struct ScriptedVideo {
    frames: Vec<RgbImage>,
    reported_frame_count: u64,
    reported_fps: f64,
    failing_indices: HashSet<u64>,
}

impl ScriptedVideo {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        let reported_frame_count = frames.len() as u64;
        Self {
            frames,
            reported_frame_count,
            reported_fps: 30.0,
            failing_indices: HashSet::new(),
        }
    }

    /// A video of `num_frames` frames whose content is derived from `seed`.
    /// Equal seeds make perceptually identical videos.
    pub fn textured(seed: u64, num_frames: usize) -> Self {
        let frames = (0..num_frames)
            .map(|_frame_no| textured_frame(seed))
            .collect();
        Self::new(frames)
    }

    pub fn with_reported_frame_count(mut self, count: u64) -> Self {
        self.reported_frame_count = count;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.reported_fps = fps;
        self
    }

    pub fn with_failing_indices(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.failing_indices = indices.into_iter().collect();
        self
    }
}

struct MemoryStream {
    video: ScriptedVideo,
    decode_count: Arc<AtomicUsize>,
}

impl VideoStream for MemoryStream {
    fn frame_count(&self) -> u64 {
        self.video.reported_frame_count
    }

    fn fps(&self) -> f64 {
        self.video.reported_fps
    }

    fn seek_and_read(&mut self, index: u64) -> Result<RgbImage, FrameSourceError> {
        if self.video.failing_indices.contains(&index) {
            return Err(FrameSourceError::Decode {
                index,
                reason: "scripted decode failure".to_owned(),
            });
        }

        match self.video.frames.get(index as usize) {
            Some(frame) => {
                self.decode_count.fetch_add(1, Relaxed);
                Ok(frame.clone())
            }
            None => Err(FrameSourceError::Seek {
                index,
                reason: "index past end of scripted video".to_owned(),
            }),
        }
    }
}

/// A deterministic pseudo-textured frame. Different seeds give frames whose
/// perceptual hashes disagree on roughly half their bits.
pub fn textured_frame(seed: u64) -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        let mut v = seed
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            .wrapping_add(u64::from(x) << 32 | u64::from(y));
        v ^= v >> 33;
        v = v.wrapping_mul(0xff51_afd7_ed55_8ccd);
        v ^= v >> 33;
        let px = (v & 0xff) as u8;
        image::Rgb([px, px, px])
    })
}

pub fn flat_frame(value: u8) -> RgbImage {
    RgbImage::from_fn(64, 64, |_, _| image::Rgb([value, value, value]))
}

#[doc(hidden)]
impl VideoFingerprint {
    /// A fingerprint whose frames all carry the same bit pattern. The
    /// minimum-frame-count invariant still applies.
    pub fn constant(
        src_path: impl AsRef<Path>,
        bits: u64,
        num_frames: usize,
        duration: f64,
    ) -> VideoFingerprint {
        let frames = vec![FrameHash::from_bits(bits); num_frames];
        let indices = (0..num_frames as u64).collect();
        VideoFingerprint::from_components(src_path.as_ref(), frames, duration, indices).unwrap()
    }

    pub fn with_duration(&self, duration: f64) -> VideoFingerprint {
        let mut ret = self.clone();
        ret.set_duration(duration);
        ret
    }
}
