use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{definitions::*, VideoFingerprint};

/// Knobs for the similarity decision. The defaults implement the canonical
/// policy; a driver that wants different behavior must say so explicitly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchOptions {
    /// Minimum mean per-frame similarity for a pair to count as duplicates.
    pub similarity_threshold: f64,

    /// Maximum standard deviation of the retained per-frame similarities.
    /// Rejects videos that are only partially similar (a shared intro, say)
    /// from being called near-duplicates.
    pub consistency_threshold: f64,

    /// Maximum allowed duration gap in seconds. None ignores duration
    /// entirely.
    pub duration_tolerance_secs: Option<f64>,

    /// Drop the first and last aligned frame pair before aggregating, when
    /// enough samples remain. Frame boundaries are noisier than the middle
    /// of a video.
    pub trim_boundary_frames: bool,

    /// Report the raw mean similarity even when the pair fails the
    /// similar/not-similar gate (the `similar` flag is unaffected).
    pub report_raw_score: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            consistency_threshold: DEFAULT_CONSISTENCY_THRESHOLD,
            duration_tolerance_secs: Some(DEFAULT_DURATION_TOLERANCE_SECS),
            trim_boundary_frames: true,
            report_raw_score: false,
        }
    }
}

/// Advisory context attached to a [SimilarityResult]. Warnings explain a
/// zero score or flag a reported pair that deserves a second look; they are
/// never fatal.
#[derive(Error, Clone, Copy, Debug, PartialEq)]
pub enum MatchWarning {
    /// The duration gap exceeded the tolerance; comparison short-circuited.
    #[error("durations differ by {gap_secs:.0}s, more than the {tolerance_secs:.0}s tolerance")]
    DurationExceedsTolerance { gap_secs: f64, tolerance_secs: f64 },

    /// The durations differ noticeably but within tolerance; the pair was
    /// still compared.
    #[error("durations differ by {gap_secs:.0}s")]
    DurationGap { gap_secs: f64 },

    /// Too few positionally aligned frames to compare at all.
    #[error("only {overlap} aligned frames, need at least {minimum}")]
    InsufficientOverlap { overlap: usize, minimum: usize },

    /// Outlier rejection left too few per-frame similarities to aggregate.
    #[error("only {retained} consistent samples after outlier rejection")]
    InsufficientConsistentSamples { retained: usize },
}

/// The outcome of comparing two fingerprints. Computed on demand, never
/// persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityResult {
    path_a: PathBuf,
    path_b: PathBuf,
    score: f64,
    similar: bool,
    warning: Option<MatchWarning>,
}

impl SimilarityResult {
    /// Similarity score in 0..=100.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Whether the pair passed both the mean-similarity and consistency
    /// gates.
    pub fn is_similar(&self) -> bool {
        self.similar
    }

    pub fn warning(&self) -> Option<&MatchWarning> {
        self.warning.as_ref()
    }

    pub fn path_a(&self) -> &Path {
        &self.path_a
    }

    pub fn path_b(&self) -> &Path {
        &self.path_b
    }

    fn rejected(a: &VideoFingerprint, b: &VideoFingerprint, warning: MatchWarning) -> Self {
        Self {
            path_a: a.src_path().to_path_buf(),
            path_b: b.src_path().to_path_buf(),
            score: 0.0,
            similar: false,
            warning: Some(warning),
        }
    }
}

/// Compare two fingerprints, producing a robust similarity score.
///
/// Per-frame Hamming similarities are aggregated with outlier rejection
/// (median/MAD, modified z-score) so that a couple of badly sampled frames
/// cannot swing the result. Symmetric: `compare(a, b) == compare(b, a)`
/// apart from the path order in the result.
pub fn compare_fingerprints(
    a: &VideoFingerprint,
    b: &VideoFingerprint,
    options: &MatchOptions,
) -> SimilarityResult {
    let mut warning = None;

    if let Some(tolerance_secs) = options.duration_tolerance_secs {
        let gap_secs = (a.duration() - b.duration()).abs();
        if gap_secs > tolerance_secs {
            return SimilarityResult::rejected(
                a,
                b,
                MatchWarning::DurationExceedsTolerance {
                    gap_secs,
                    tolerance_secs,
                },
            );
        }
        if gap_secs > SOFT_DURATION_WARNING_SECS {
            warning = Some(MatchWarning::DurationGap { gap_secs });
        }
    }

    let overlap = a.frames().len().min(b.frames().len());
    if overlap < MIN_FRAMES {
        return SimilarityResult::rejected(
            a,
            b,
            MatchWarning::InsufficientOverlap {
                overlap,
                minimum: MIN_FRAMES,
            },
        );
    }

    let mut similarities = a
        .frames()
        .iter()
        .zip(b.frames().iter())
        .take(overlap)
        .map(|(frame_a, frame_b)| frame_a.similarity(frame_b))
        .collect::<Vec<_>>();

    //only trim when the minimum frame count survives the trim
    if options.trim_boundary_frames && similarities.len() >= MIN_FRAMES + 2 {
        similarities.remove(0);
        similarities.pop();
    }

    let retained = reject_outliers(similarities);
    if retained.len() < MIN_FRAMES {
        return SimilarityResult::rejected(
            a,
            b,
            MatchWarning::InsufficientConsistentSamples {
                retained: retained.len(),
            },
        );
    }

    let mean = retained.iter().sum::<f64>() / retained.len() as f64;
    let variance =
        retained.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / retained.len() as f64;
    let std_dev = variance.sqrt();

    let similar =
        mean >= options.similarity_threshold && std_dev <= options.consistency_threshold;
    let score = if similar || options.report_raw_score {
        mean * 100.0
    } else {
        0.0
    };

    SimilarityResult {
        path_a: a.src_path().to_path_buf(),
        path_b: b.src_path().to_path_buf(),
        score,
        similar,
        warning,
    }
}

//Discard values whose modified z-score exceeds the limit. When the MAD is
//zero the values are already tightly clustered and nothing is discarded.
fn reject_outliers(similarities: Vec<f64>) -> Vec<f64> {
    let med = median(&similarities);
    let deviations = similarities
        .iter()
        .map(|x| (x - med).abs())
        .collect::<Vec<_>>();
    let mad = median(&deviations);

    if mad <= 0.0 {
        return similarities;
    }

    similarities
        .into_iter()
        .filter(|x| (MAD_ZSCORE_SCALE * (x - med) / mad).abs() < MAD_ZSCORE_LIMIT)
        .collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
