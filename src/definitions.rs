// Frame definitions (pre hashing)
pub const RESIZE_IMAGE_DIM: u32 = 32;
pub const SMOOTHING_SIGMA: f32 = 0.8;

// Hash definitions
pub const HASH_MATRIX_DIM: usize = 8;
pub const HASH_BITS: u32 = (HASH_MATRIX_DIM * HASH_MATRIX_DIM) as u32;

// Sampling policy
pub const MIN_FRAMES: usize = 3;
pub const DEFAULT_FPS: f64 = 30.0;
pub const SHORT_VIDEO_FRAME_LIMIT: u64 = 1000;
pub const SHORT_VIDEO_OFFSETS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];
pub const MAX_SAMPLED_FRAMES: u64 = 10;
pub const LONG_VIDEO_FRAMES_PER_SAMPLE: u64 = 500;
pub const SEQUENTIAL_PROBE_LIMIT: u64 = 100;
pub const SEEK_RETRY_LIMIT: u32 = 3;
pub const MAX_READ_FAILURES: u32 = 5;

// Similarity decision
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;
pub const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.10;
pub const DEFAULT_DURATION_TOLERANCE_SECS: f64 = 300.0;
pub const SOFT_DURATION_WARNING_SECS: f64 = 10.0;

// Outlier rejection (modified z-score over the per-frame similarities)
pub const MAD_ZSCORE_SCALE: f64 = 0.6745;
pub const MAD_ZSCORE_LIMIT: f64 = 3.5;
