use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    ignore_list::IgnoreListStore,
    matching::similarity::{compare_fingerprints, MatchOptions},
    progress::{CancellationToken, ProgressEvent},
    VideoFingerprint,
};

/// A cluster of >= 2 files mutually considered duplicates under the active
/// thresholds. Derived afresh on every run, never stored.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct DuplicateGroup {
    members: Vec<PathBuf>,
}

impl DuplicateGroup {
    fn new(members: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut members = members.into_iter().collect::<Vec<_>>();
        members.sort();
        Self { members }
    }

    /// The number of files in this group.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member paths, in sorted order.
    pub fn members(&self) -> impl Iterator<Item = &Path> {
        self.members.iter().map(PathBuf::as_path)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.members.binary_search_by(|m| m.as_path().cmp(path.as_ref())).is_ok()
    }
}

//Merges pairwise matches into equivalence groups. A path's group is found
//through the map; merged groups leave an empty slot behind rather than
//renumbering every other entry.
#[derive(Debug, Default)]
pub(crate) struct DisjointSet {
    map: BTreeMap<PathBuf, usize>,
    entries: Vec<BTreeSet<PathBuf>>,
}

impl DisjointSet {
    pub fn insert(&mut self, p1: PathBuf, p2: PathBuf) {
        let (idx_1, idx_2) = (self.map.get(&p1).copied(), self.map.get(&p2).copied());

        match (idx_1, idx_2) {
            (None, None) => {
                let idx = self.entries.len();
                self.map.insert(p1.clone(), idx);
                self.map.insert(p2.clone(), idx);
                self.entries.push(BTreeSet::from([p1, p2]));
            }

            (Some(idx), None) => {
                self.map.insert(p2.clone(), idx);
                self.entries[idx].insert(p2);
            }

            (None, Some(idx)) => {
                self.map.insert(p1.clone(), idx);
                self.entries[idx].insert(p1);
            }

            (Some(idx_1), Some(idx_2)) => {
                if idx_1 != idx_2 {
                    self.merge(idx_1, idx_2);
                }
            }
        }
    }

    fn merge(&mut self, keep_idx: usize, drain_idx: usize) {
        let drained = std::mem::take(&mut self.entries[drain_idx]);
        for path in drained {
            self.map.insert(path.clone(), keep_idx);
            self.entries[keep_idx].insert(path);
        }
    }

    pub fn contains_pair(&self, p1: &Path, p2: &Path) -> bool {
        match (self.map.get(p1), self.map.get(p2)) {
            (Some(idx_1), Some(idx_2)) => idx_1 == idx_2,
            _ => false,
        }
    }

    pub fn into_groups(self) -> Vec<DuplicateGroup> {
        let mut groups = self
            .entries
            .into_iter()
            .filter(|entry| entry.len() >= 2)
            .map(DuplicateGroup::new)
            .collect::<Vec<_>>();

        //deterministic report order: by each group's smallest path
        groups.sort();
        groups
    }
}

/// Scan every unordered pair of fingerprints for duplicates and assemble
/// equivalence groups.
///
/// Pairs on the ignore list are skipped. Matching is transitive: if A~B and
/// B~C then A, B and C share a group even when A and C themselves fall
/// short of the threshold.
///
/// This is an O(n^2) scan by design; progress is reported per pair and the
/// scan can be cancelled between pairs, in which case the groups assembled
/// from the pairs already compared are returned.
pub fn find_duplicate_groups(
    fingerprints: &[VideoFingerprint],
    ignore_list: &IgnoreListStore,
    options: &MatchOptions,
    mut progress: impl FnMut(ProgressEvent),
    cancel: &CancellationToken,
) -> Vec<DuplicateGroup> {
    let total_pairs = fingerprints.len().saturating_sub(1) * fingerprints.len() / 2;
    let mut pairs_compared = 0;
    let mut matches = DisjointSet::default();

    'scan: for (lhs_no, lhs) in fingerprints.iter().enumerate() {
        for rhs in &fingerprints[lhs_no + 1..] {
            if cancel.is_cancelled() {
                info!(
                    target: "dup_finder",
                    "comparison cancelled after {pairs_compared} of {total_pairs} pairs"
                );
                break 'scan;
            }

            pairs_compared += 1;

            if ignore_list.is_ignored(lhs.src_path(), rhs.src_path()) {
                progress(ProgressEvent::Comparing {
                    pairs_compared,
                    total_pairs,
                });
                continue;
            }

            let result = compare_fingerprints(lhs, rhs, options);
            if result.is_similar() {
                matches.insert(lhs.src_path().to_path_buf(), rhs.src_path().to_path_buf());
            }

            progress(ProgressEvent::Comparing {
                pairs_compared,
                total_pairs,
            });
        }
    }

    matches.into_groups()
}
