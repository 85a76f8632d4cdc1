use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::cache::atomic_write_json;

/// An unordered pair of paths, stored in sorted order so that
/// (a, b) and (b, a) are the same pair.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub struct IgnoredPair(PathBuf, PathBuf);

impl IgnoredPair {
    pub fn new(p1: impl AsRef<Path>, p2: impl AsRef<Path>) -> Self {
        let (p1, p2) = (p1.as_ref().to_path_buf(), p2.as_ref().to_path_buf());
        if p1 <= p2 {
            Self(p1, p2)
        } else {
            Self(p2, p1)
        }
    }

    fn both_exist(&self) -> bool {
        self.0.exists() && self.1.exists()
    }
}

const STORE_FILE_NAME: &str = "ignored_pairs.json";

/// Pairs of files the user has marked as "not duplicates of each other".
///
/// Permanent pairs are persisted as a JSON array of sorted `[a, b]` path
/// pairs with the same atomic-write discipline as the fingerprint cache.
/// Temporary pairs last for the lifetime of this store only. Lookups
/// consult both sets.
pub struct IgnoreListStore {
    store_path: PathBuf,
    permanent: RwLock<BTreeSet<IgnoredPair>>,
    session: RwLock<BTreeSet<IgnoredPair>>,
    //serializes snapshot-write-rename: concurrent persists share the
    //same temp file path
    save_lock: Mutex<()>,
}

impl IgnoreListStore {
    /// Open (or create) the persisted ignore list inside `cache_dir`.
    /// Persisted pairs referring to files that no longer exist are dropped.
    pub fn open(cache_dir: impl AsRef<Path>) -> Self {
        let store_path = cache_dir.as_ref().join(STORE_FILE_NAME);

        let loaded = match Self::load_document(&store_path) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(target: "ignore_list", "ignore list unreadable ({e}), trying backup");
                match Self::load_document(&store_path.with_extension("json.bak")) {
                    Ok(pairs) => pairs,
                    Err(e) => {
                        warn!(target: "ignore_list", "backup also unreadable ({e}), starting empty");
                        Vec::new()
                    }
                }
            }
        };

        let total = loaded.len();
        let permanent = loaded
            .into_iter()
            .filter(IgnoredPair::both_exist)
            .collect::<BTreeSet<_>>();

        if permanent.len() < total {
            info!(
                target: "ignore_list",
                "dropped {} pairs referring to missing files",
                total - permanent.len()
            );
        }

        Self {
            store_path,
            permanent: RwLock::new(permanent),
            session: RwLock::new(BTreeSet::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Mark `p1` and `p2` as not-duplicates. Permanent pairs survive
    /// restarts, temporary pairs do not.
    pub fn add(&self, p1: impl AsRef<Path>, p2: impl AsRef<Path>, permanent: bool) {
        let pair = IgnoredPair::new(p1, p2);
        if permanent {
            self.permanent.write().insert(pair);
            self.persist();
        } else {
            self.session.write().insert(pair);
        }
    }

    pub fn is_ignored(&self, p1: impl AsRef<Path>, p2: impl AsRef<Path>) -> bool {
        let pair = IgnoredPair::new(p1, p2);
        self.permanent.read().contains(&pair) || self.session.read().contains(&pair)
    }

    /// Un-ignore a pair, whichever set it lives in.
    pub fn remove(&self, p1: impl AsRef<Path>, p2: impl AsRef<Path>) {
        let pair = IgnoredPair::new(p1, p2);
        self.session.write().remove(&pair);
        if self.permanent.write().remove(&pair) {
            self.persist();
        }
    }

    /// Forget every pair, permanent and temporary.
    pub fn clear(&self) {
        self.session.write().clear();
        self.permanent.write().clear();
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.permanent.read().len() + self.session.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    //one persist at a time; the snapshot is taken inside the lock so the
    //last writer persists the newest state
    fn persist(&self) {
        let _write_guard = self.save_lock.lock();
        let pairs = self.permanent.read().iter().cloned().collect::<Vec<_>>();
        if let Err(e) = atomic_write_json(&self.store_path, &pairs) {
            warn!(
                target: "ignore_list",
                "failed to persist ignore list ({e}), continuing in memory only"
            );
        }
    }

    fn load_document(path: &Path) -> Result<Vec<IgnoredPair>, std::io::Error> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
