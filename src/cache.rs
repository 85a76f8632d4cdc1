use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    frame_source::{FrameSource, FrameSourceError},
    hashing::{FrameHash, HashCreationErrorKind, HashMethod, PerceptualHasher, VideoFingerprint},
    progress::CancellationToken,
};

#[derive(Error, Debug)]
pub enum CacheErrorKind {
    #[error("error accessing cache storage file {path}: {src}")]
    CacheFileIo { src: std::io::Error, path: PathBuf },

    #[error("failed to serialize cache document {path}: {src}")]
    Serialization { src: String, path: PathBuf },

    #[error("failed to deserialize cache document {path}: {src}")]
    Deserialization { src: String, path: PathBuf },
}

//One record per path; the field names define the on-disk document shape.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct CacheEntry {
    hash: Vec<FrameHash>,
    duration: f64,
    last_modified: f64,
    frame_indices: Vec<u64>,
}

type CacheDocument = BTreeMap<PathBuf, CacheEntry>;

/// A persistent store of [VideoFingerprint]s keyed by file identity
/// (path + last-modified time), so fingerprints survive process restarts
/// and are recomputed only when a file actually changes.
///
/// One document exists per [HashMethod]. The document is written atomically
/// (temp file, fsync, backup snapshot, rename) after every new fingerprint,
/// so a crash loses at most the in-flight file's work. A document that
/// fails to parse falls back to the backup and then to an empty cache,
/// never to a hard failure.
pub struct FingerprintCache {
    store_path: PathBuf,
    entries: RwLock<CacheDocument>,
    //serializes the whole snapshot-write-rename sequence: concurrent
    //saves share the same temp file path
    save_lock: Mutex<()>,
}

impl FingerprintCache {
    /// Open (or create) the cache document for `method` inside `cache_dir`.
    ///
    /// Unreadable or corrupt documents are logged and degrade to an empty
    /// cache. Entries whose files have disappeared are pruned on load.
    pub fn open(cache_dir: impl AsRef<Path>, method: HashMethod) -> Self {
        let store_path = cache_dir.as_ref().join(method.cache_file_name());

        let entries = match Self::load_document(&store_path) {
            Ok(entries) => {
                info!(
                    target: "fingerprint_cache",
                    "loaded cache {} with {} entries", store_path.display(), entries.len()
                );
                entries
            }
            Err(e) => {
                warn!(
                    target: "fingerprint_cache",
                    "cache unreadable ({e}), trying backup"
                );
                match Self::load_document(&Self::backup_path(&store_path)) {
                    Ok(entries) => {
                        warn!(
                            target: "fingerprint_cache",
                            "recovered {} entries from backup of {}",
                            entries.len(),
                            store_path.display()
                        );
                        entries
                    }
                    Err(e) => {
                        warn!(
                            target: "fingerprint_cache",
                            "backup also unreadable ({e}), starting empty"
                        );
                        CacheDocument::new()
                    }
                }
            }
        };

        let ret = Self {
            store_path,
            entries: RwLock::new(entries),
            save_lock: Mutex::new(()),
        };
        ret.prune_missing();
        ret
    }

    /// Return the cached fingerprint for `src_path`, or compute, cache and
    /// persist a fresh one.
    ///
    /// An entry is reused only while the file's modification time has not
    /// moved past the one recorded at hashing time; a touched file is
    /// silently rehashed. A failed computation is never cached, and a
    /// failed persist degrades to in-memory operation rather than erroring.
    pub fn get_or_compute(
        &self,
        src_path: impl AsRef<Path>,
        hasher: &PerceptualHasher,
        source: &dyn FrameSource,
        cancel: &CancellationToken,
    ) -> Result<VideoFingerprint, HashCreationErrorKind> {
        let src_path = src_path.as_ref();

        let fs_mtime = fs_mtime_secs(src_path).map_err(|e| {
            HashCreationErrorKind::SourceUnavailable {
                src_path: src_path.to_path_buf(),
                error: FrameSourceError::Open {
                    src_path: src_path.to_path_buf(),
                    reason: e.to_string(),
                },
            }
        })?;

        if let Some(entry) = self.entries.read().get(src_path) {
            if fs_mtime <= entry.last_modified {
                if let Ok(fingerprint) = entry_to_fingerprint(src_path, entry) {
                    return Ok(fingerprint);
                }
                //an entry that no longer satisfies the fingerprint
                //invariants is treated as stale and recomputed
            }
        }

        let fingerprint = hasher.hash_video(src_path, source, cancel)?;

        //key by the identity observed after hashing, so an edit made while
        //we were reading invalidates this entry on the next lookup
        let last_modified = fs_mtime_secs(src_path).unwrap_or(fs_mtime);
        {
            let mut entries = self.entries.write();
            entries.insert(
                src_path.to_path_buf(),
                CacheEntry {
                    hash: fingerprint.frames().to_vec(),
                    duration: fingerprint.duration(),
                    last_modified,
                    frame_indices: fingerprint.sample_indices().to_vec(),
                },
            );
        }

        if let Err(e) = self.save() {
            warn!(
                target: "fingerprint_cache",
                "failed to persist cache ({e}), continuing in memory only"
            );
        }

        Ok(fingerprint)
    }

    /// Membership check without computing.
    pub fn has(&self, src_path: impl AsRef<Path>) -> bool {
        self.entries.read().contains_key(src_path.as_ref())
    }

    /// Snapshot of all cached fingerprints whose files still exist on disk.
    pub fn fingerprints(&self) -> Vec<VideoFingerprint> {
        self.entries
            .read()
            .iter()
            .filter(|(path, _)| path.exists())
            .filter_map(|(path, entry)| entry_to_fingerprint(path, entry).ok())
            .collect()
    }

    /// Drop entries whose path no longer exists on disk and persist the
    /// pruned document. Called on load and on every save; drivers may also
    /// call it opportunistically.
    pub fn prune_missing(&self) {
        let removed = self.remove_missing();

        if removed > 0 {
            info!(
                target: "fingerprint_cache",
                "pruned {removed} entries for missing files"
            );
            if let Err(e) = self.save() {
                warn!(target: "fingerprint_cache", "failed to persist pruned cache: {e}");
            }
        }
    }

    /// Discard all entries and delete the backing document.
    pub fn clear(&self) {
        let _write_guard = self.save_lock.lock();
        self.entries.write().clear();
        let _ = std::fs::remove_file(&self.store_path);
        let _ = std::fs::remove_file(Self::backup_path(&self.store_path));
        info!(target: "fingerprint_cache", "cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write the document atomically: serialize into a temp file alongside
    /// the store, fsync, snapshot the previous version as a backup, then
    /// rename over the original. Entries whose files have disappeared are
    /// dropped before the write. One save runs at a time; the snapshot is
    /// taken inside the lock so the last writer persists the newest state.
    pub fn save(&self) -> Result<(), CacheErrorKind> {
        let _write_guard = self.save_lock.lock();
        self.remove_missing();
        let entries = self.entries.read();
        atomic_write_json(&self.store_path, &*entries)
    }

    fn remove_missing(&self) -> usize {
        let mut removed = 0usize;
        self.entries.write().retain(|path, _| {
            let keep = path.exists();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn load_document(path: &Path) -> Result<CacheDocument, CacheErrorKind> {
        if !path.exists() {
            return Ok(CacheDocument::new());
        }

        let file = std::fs::File::open(path).map_err(|src| CacheErrorKind::CacheFileIo {
            src,
            path: path.to_path_buf(),
        })?;

        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            CacheErrorKind::Deserialization {
                src: e.to_string(),
                path: path.to_path_buf(),
            }
        })
    }

    fn backup_path(store_path: &Path) -> PathBuf {
        store_path.with_extension("json.bak")
    }
}

//Shared by the fingerprint cache and the ignore list, which persist with
//the same discipline.
pub(crate) fn atomic_write_json<T: Serialize>(
    store_path: &Path,
    document: &T,
) -> Result<(), CacheErrorKind> {
    let io_err = |src| CacheErrorKind::CacheFileIo {
        src,
        path: store_path.to_path_buf(),
    };

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let temp_path = store_path.with_extension("json.tmp");
    let mut temp_file = std::fs::File::create(&temp_path).map_err(io_err)?;

    let json = serde_json::to_vec_pretty(document).map_err(|e| CacheErrorKind::Serialization {
        src: e.to_string(),
        path: store_path.to_path_buf(),
    })?;
    temp_file.write_all(&json).map_err(io_err)?;
    temp_file.sync_all().map_err(io_err)?;
    drop(temp_file);

    //snapshot the previous version before replacing it
    if store_path.exists() {
        let backup_path = store_path.with_extension("json.bak");
        if let Err(e) = std::fs::copy(store_path, backup_path) {
            warn!(target: "fingerprint_cache", "could not snapshot backup: {e}");
        }
    }

    std::fs::rename(&temp_path, store_path).map_err(io_err)
}

fn entry_to_fingerprint(
    src_path: &Path,
    entry: &CacheEntry,
) -> Result<VideoFingerprint, HashCreationErrorKind> {
    VideoFingerprint::from_components(
        src_path,
        entry.hash.clone(),
        entry.duration,
        entry.frame_indices.clone(),
    )
}

fn fs_mtime_secs(path: &Path) -> Result<f64, std::io::Error> {
    let mtime = std::fs::metadata(path)?.modified()?;
    Ok(mtime
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{MemoryFrameSource, ScriptedVideo};

    struct Fixture {
        dir: tempfile::TempDir,
        source: MemoryFrameSource,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                source: MemoryFrameSource::new(),
            }
        }

        //a real file on disk (for mtime) backed by a scripted video
        fn add_video(&self, name: &str, seed: u64) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"stand-in video bytes").unwrap();
            self.source.insert(&path, ScriptedVideo::textured(seed, 50));
            path
        }

        fn open_cache(&self) -> FingerprintCache {
            FingerprintCache::open(self.dir.path().join("cache"), HashMethod::PHash)
        }

        fn compute(&self, cache: &FingerprintCache, path: &Path) -> VideoFingerprint {
            cache
                .get_or_compute(
                    path,
                    &PerceptualHasher::default(),
                    &self.source,
                    &CancellationToken::new(),
                )
                .unwrap()
        }
    }

    #[test]
    fn test_round_trip_through_disk() {
        let fx = Fixture::new();
        let vid_a = fx.add_video("a.mp4", 1);
        let vid_b = fx.add_video("b.mp4", 2);

        let cache = FingerprintCache::open(fx.dir.path().join("cache"), HashMethod::PHash);
        let fp_a = fx.compute(&cache, &vid_a);
        let fp_b = fx.compute(&cache, &vid_b);
        drop(cache);

        let reloaded = fx.open_cache();
        assert_eq!(reloaded.len(), 2);
        let mut fingerprints = reloaded.fingerprints();
        fingerprints.sort_by(|x, y| x.src_path().cmp(y.src_path()));
        assert_eq!(fingerprints, vec![fp_a, fp_b]);
    }

    #[test]
    fn test_second_lookup_is_served_from_cache() {
        let fx = Fixture::new();
        let vid = fx.add_video("a.mp4", 1);
        let cache = fx.open_cache();

        let first = fx.compute(&cache, &vid);
        let decodes_after_first = fx.source.decode_count();

        let second = fx.compute(&cache, &vid);
        assert_eq!(first, second);
        assert_eq!(fx.source.decode_count(), decodes_after_first);
    }

    #[test]
    fn test_newer_mtime_invalidates_entry() {
        let fx = Fixture::new();
        let vid = fx.add_video("a.mp4", 1);
        let cache = fx.open_cache();
        fx.compute(&cache, &vid);
        drop(cache);

        //age the recorded identity so the file looks newly modified
        let store = fx.dir.path().join("cache").join(HashMethod::PHash.cache_file_name());
        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
        doc.as_object_mut()
            .unwrap()
            .values_mut()
            .for_each(|entry| entry["last_modified"] = serde_json::Value::from(0.0));
        std::fs::write(&store, serde_json::to_string(&doc).unwrap()).unwrap();

        let cache = fx.open_cache();
        let decodes_before = fx.source.decode_count();
        fx.compute(&cache, &vid);
        assert!(
            fx.source.decode_count() > decodes_before,
            "stale entry should have been recomputed"
        );
    }

    #[test]
    fn test_failed_hash_is_never_cached() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("flaky.mp4");
        std::fs::write(&path, b"stand-in").unwrap();
        //only two sample points decode
        fx.source.insert(
            &path,
            ScriptedVideo::textured(9, 100).with_failing_indices([50, 70, 90]),
        );

        let cache = fx.open_cache();
        let err = cache
            .get_or_compute(
                &path,
                &PerceptualHasher::default(),
                &fx.source,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, HashCreationErrorKind::InsufficientSamples { .. }));
        assert!(!cache.has(&path));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_corrupt_document_recovers_from_backup() {
        let fx = Fixture::new();
        let vid_a = fx.add_video("a.mp4", 1);
        let vid_b = fx.add_video("b.mp4", 2);

        let cache = fx.open_cache();
        fx.compute(&cache, &vid_a);
        //second save snapshots the first document as the backup
        fx.compute(&cache, &vid_b);
        drop(cache);

        let store = fx.dir.path().join("cache").join(HashMethod::PHash.cache_file_name());
        std::fs::write(&store, b"{ not json").unwrap();

        let recovered = fx.open_cache();
        assert!(recovered.has(&vid_a));
        assert!(!recovered.has(&vid_b));
    }

    #[test]
    fn test_corrupt_document_without_backup_starts_empty() {
        let fx = Fixture::new();
        let store_dir = fx.dir.path().join("cache");
        std::fs::create_dir_all(&store_dir).unwrap();
        std::fs::write(store_dir.join(HashMethod::PHash.cache_file_name()), b"garbage").unwrap();

        let cache = fx.open_cache();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_saves_do_not_corrupt_the_document() {
        let fx = Fixture::new();
        let vids = (0..30u64)
            .map(|vid_no| fx.add_video(&format!("{vid_no}.mp4"), vid_no))
            .collect::<Vec<_>>();
        let cache = fx.open_cache();

        //grow the document on one thread while another saves repeatedly, so
        //interleaved writes would produce differently sized payloads on the
        //shared temp file
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..300 {
                    cache.save().unwrap();
                }
            });
            scope.spawn(|| {
                for vid in &vids {
                    fx.compute(&cache, vid);
                }
            });
        });

        let reloaded = fx.open_cache();
        assert_eq!(
            reloaded.len(),
            30,
            "reload must see every entry rather than a backup or empty fallback"
        );
    }

    #[test]
    fn test_save_drops_entries_for_deleted_files() {
        let fx = Fixture::new();
        let vid_a = fx.add_video("a.mp4", 1);
        let vid_b = fx.add_video("b.mp4", 2);
        let cache = fx.open_cache();
        fx.compute(&cache, &vid_a);
        fx.compute(&cache, &vid_b);

        std::fs::remove_file(&vid_b).unwrap();
        cache.save().unwrap();
        assert!(!cache.has(&vid_b));

        let reloaded = fx.open_cache();
        assert!(reloaded.has(&vid_a));
        assert!(!reloaded.has(&vid_b));
    }

    #[test]
    fn test_prune_missing_drops_deleted_files() {
        let fx = Fixture::new();
        let vid_a = fx.add_video("a.mp4", 1);
        let vid_b = fx.add_video("b.mp4", 2);
        let cache = fx.open_cache();
        fx.compute(&cache, &vid_a);
        fx.compute(&cache, &vid_b);

        std::fs::remove_file(&vid_b).unwrap();
        cache.prune_missing();
        assert!(cache.has(&vid_a));
        assert!(!cache.has(&vid_b));
    }

    #[test]
    fn test_clear_discards_entries_and_document() {
        let fx = Fixture::new();
        let vid = fx.add_video("a.mp4", 1);
        let cache = fx.open_cache();
        fx.compute(&cache, &vid);

        let store = fx.dir.path().join("cache").join(HashMethod::PHash.cache_file_name());
        assert!(store.exists());

        cache.clear();
        assert!(cache.is_empty());
        assert!(!store.exists());
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let fx = Fixture::new();
        let cache = fx.open_cache();
        let err = cache
            .get_or_compute(
                fx.dir.path().join("ghost.mp4"),
                &PerceptualHasher::default(),
                &fx.source,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, HashCreationErrorKind::SourceUnavailable { .. }));
    }
}
