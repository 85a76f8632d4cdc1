pub(crate) mod grouping;
pub(crate) mod similarity;

pub use grouping::{find_duplicate_groups, DuplicateGroup};
pub use similarity::{compare_fingerprints, MatchOptions, MatchWarning, SimilarityResult};
