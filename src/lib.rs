#![allow(clippy::len_without_is_empty)]

//! # Overview
//! vid_dup_engine finds near-duplicate video files by content rather than
//! by bytes, so re-encodes, resizes and container changes of the same
//! footage are still detected.
//!
//! # How it works
//! A small set of frames is sampled from each video and every frame is
//! reduced to a 64-bit [perceptual hash](http://hackerfactor.com/blog/index.php%3F/archives/432-Looks-Like-It.html)
//! (grayscale, downsample, 2D discrete cosine transform, keep the 8x8
//! low-frequency block, binarize against its median). The per-video
//! sequence of frame hashes plus the duration forms a [VideoFingerprint].
//!
//! Two fingerprints are compared frame-by-frame with Hamming similarity;
//! a robust-statistics pass (median absolute deviation) discards outlier
//! frames such as shared intros before the similar/not-similar decision.
//! Pairwise matches are merged transitively into [DuplicateGroup]s.
//!
//! Fingerprints are cached on disk keyed by path and modification time,
//! so only new or changed files are decoded on later runs.
//!
//! # High Level API
//! Construct a [DupFinderEngine] with a [FrameSource] (the decoder
//! adapter for your environment), hash the files of interest, then ask
//! for duplicate groups:
//! ```rust,no_run
//! use vid_dup_engine::*;
//!
//! fn scan(source: Box<dyn FrameSource>) -> Result<(), EngineError> {
//!     let engine = DupFinderEngine::new(EngineConfig::default(), source)?;
//!
//!     let vids = vec!["vids/cat.1.mp4".into(), "vids/cat.3.webm".into()];
//!     let cancel = CancellationToken::new();
//!     let outcome = engine.hash_files(&vids, |_| (), &cancel);
//!     for (path, err) in &outcome.failures {
//!         eprintln!("could not analyze {}: {err}", path.display());
//!     }
//!
//!     for group in engine.find_groups(|_| (), &cancel) {
//!         println!("{:?}", group.members().collect::<Vec<_>>());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Single pairs can be compared directly with [DupFinderEngine::compare],
//! and false positives can be suppressed for future scans with
//! [DupFinderEngine::ignore].
//!
//! # Caveats
//! * Hashes capture what frames look like, not what they mean: different
//!   footage with near-identical composition can collide.
//! * Heavily letterboxed or watermarked copies may fall below the
//!   similarity threshold.

mod cache;
mod definitions;
mod engine;
mod frame_source;
mod hashing;
mod ignore_list;
mod matching;
mod progress;

#[doc(hidden)]
pub mod test_util;

pub use cache::{CacheErrorKind, FingerprintCache};
pub use definitions::{
    DEFAULT_CONSISTENCY_THRESHOLD, DEFAULT_DURATION_TOLERANCE_SECS, DEFAULT_SIMILARITY_THRESHOLD,
};
pub use engine::{BatchOutcome, DupFinderEngine, EngineConfig, EngineError};
pub use frame_source::{FrameSource, FrameSourceError, VideoStream};
pub use hashing::{
    FrameHash, HashCreationErrorKind, HashMethod, PerceptualHasher, VideoFingerprint,
};
pub use ignore_list::{IgnoreListStore, IgnoredPair};
pub use matching::{
    compare_fingerprints, find_duplicate_groups, DuplicateGroup, MatchOptions, MatchWarning,
    SimilarityResult,
};
pub use progress::{CancellationToken, ProgressEvent};
