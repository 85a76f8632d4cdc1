use image::GrayImage;
use rustdct::DctPlanner;
use transpose::transpose_inplace;

use crate::definitions::*;

/// Perform a 2D DCT-II over a square grayscale frame, returning the
/// coefficients in row-major order.
pub fn dct_2d(frame: &GrayImage) -> Vec<f64> {
    let dimension = frame.width() as usize;
    debug_assert_eq!(frame.width(), frame.height());

    //center pixel values around zero before transforming
    let mut coeffs = frame
        .as_raw()
        .iter()
        .map(|px| f64::from(*px) - 128.0)
        .collect::<Vec<_>>();

    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(dimension);

    //round 1 of the DCT (on rows):
    coeffs.chunks_exact_mut(dimension).for_each(|row| {
        dct.process_dct2(row);
    });

    //now transpose...
    let mut scratch = vec![0f64; dimension];
    transpose_inplace(&mut coeffs, &mut scratch, dimension, dimension);

    //round 2 of the DCT (on cols):
    coeffs.chunks_exact_mut(dimension).for_each(|col| {
        dct.process_dct2(col);
    });

    //...and transpose back into row-major order
    transpose_inplace(&mut coeffs, &mut scratch, dimension, dimension);

    //normalize (does not affect binarization, but keeps coefficient
    //magnitudes stable if further processing is ever added)
    for val in coeffs.iter_mut() {
        *val *= 4f64 / (dimension * dimension) as f64;
    }

    coeffs
}

/// Extract the top-left low-frequency block from a row-major square
/// coefficient matrix.
pub fn low_frequency_block(coeffs: &[f64], dimension: usize) -> [f64; HASH_MATRIX_DIM * HASH_MATRIX_DIM] {
    debug_assert!(dimension >= HASH_MATRIX_DIM);
    debug_assert_eq!(coeffs.len(), dimension * dimension);

    let mut block = [0f64; HASH_MATRIX_DIM * HASH_MATRIX_DIM];
    for row in 0..HASH_MATRIX_DIM {
        for col in 0..HASH_MATRIX_DIM {
            block[row * HASH_MATRIX_DIM + col] = coeffs[row * dimension + col];
        }
    }
    block
}
