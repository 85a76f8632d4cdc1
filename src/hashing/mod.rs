pub(crate) mod dct_ops;
pub(crate) mod frame_hash;
pub(crate) mod hash_creation_error_kind;
pub(crate) mod video_hash;

pub use frame_hash::FrameHash;
pub use hash_creation_error_kind::HashCreationErrorKind;
pub use video_hash::{HashMethod, PerceptualHasher, VideoFingerprint};
