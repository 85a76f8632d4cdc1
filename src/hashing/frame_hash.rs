use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::dct_ops;
use crate::definitions::*;

//On-disk representation: one nested bit array per frame.
type FrameHashRows = [[bool; HASH_MATRIX_DIM]; HASH_MATRIX_DIM];

/// The perceptual hash of a single video frame: an 8x8 matrix of bits
/// derived from the low-frequency DCT coefficients of the frame.
///
/// Bits are packed into a u64 (bit `row * 8 + col`), which makes the
/// Hamming comparison in [FrameHash::similarity] a single xor/popcount.
/// The serialized form is the nested bit-array layout used by the
/// persisted cache document.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(from = "FrameHashRows", into = "FrameHashRows")]
pub struct FrameHash {
    bits: u64,
}

impl FrameHash {
    /// Hash one decoded color frame.
    ///
    /// Returns None for malformed frames (zero-sized buffers); callers are
    /// expected to tolerate missing frames rather than abort.
    pub fn from_frame(frame: &RgbImage) -> Option<Self> {
        if frame.width() == 0 || frame.height() == 0 {
            return None;
        }

        //luma, then downsample to discard high-frequency detail, then a
        //small blur to suppress compression noise
        let gray = imageops::grayscale(frame);
        let resized = imageops::resize(&gray, RESIZE_IMAGE_DIM, RESIZE_IMAGE_DIM, FilterType::Triangle);
        let smoothed = imageops::blur(&resized, SMOOTHING_SIGMA);

        let coeffs = dct_ops::dct_2d(&smoothed);
        let block = dct_ops::low_frequency_block(&coeffs, RESIZE_IMAGE_DIM as usize);

        Some(Self::binarize(&block))
    }

    //Reduce each coefficient to one bit by comparing against the block's
    //own median.
    fn binarize(block: &[f64; HASH_MATRIX_DIM * HASH_MATRIX_DIM]) -> Self {
        let threshold = median_of(block);

        let mut bits = 0u64;
        for (i, coeff) in block.iter().enumerate() {
            if *coeff > threshold {
                bits |= 1u64 << i;
            }
        }
        Self { bits }
    }

    /// Fraction of identical bits between two frame hashes, in 0..=1.
    pub fn similarity(&self, other: &FrameHash) -> f64 {
        let matching = HASH_BITS - self.hamming_distance(other);
        f64::from(matching) / f64::from(HASH_BITS)
    }

    /// Number of differing bits between two frame hashes.
    pub fn hamming_distance(&self, other: &FrameHash) -> u32 {
        (self.bits ^ other.bits).count_ones()
    }

    pub fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }
}

impl From<FrameHashRows> for FrameHash {
    fn from(rows: FrameHashRows) -> Self {
        let mut bits = 0u64;
        for (row_no, row) in rows.iter().enumerate() {
            for (col_no, bit) in row.iter().enumerate() {
                if *bit {
                    bits |= 1u64 << (row_no * HASH_MATRIX_DIM + col_no);
                }
            }
        }
        Self { bits }
    }
}

impl From<FrameHash> for FrameHashRows {
    fn from(hash: FrameHash) -> Self {
        let mut rows = [[false; HASH_MATRIX_DIM]; HASH_MATRIX_DIM];
        for (row_no, row) in rows.iter_mut().enumerate() {
            for (col_no, bit) in row.iter_mut().enumerate() {
                *bit = (hash.bits >> (row_no * HASH_MATRIX_DIM + col_no)) & 1 == 1;
            }
        }
        rows
    }
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
