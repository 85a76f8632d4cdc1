use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering::Relaxed},
};

use log::info;
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    cache::FingerprintCache,
    frame_source::FrameSource,
    hashing::{HashCreationErrorKind, HashMethod, PerceptualHasher, VideoFingerprint},
    ignore_list::IgnoreListStore,
    matching::{
        compare_fingerprints, find_duplicate_groups, DuplicateGroup, MatchOptions,
        SimilarityResult,
    },
    progress::{CancellationToken, ProgressEvent},
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Knobs for [DupFinderEngine]. The driver owns any config-file parsing;
/// this is the already-resolved form.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory holding the fingerprint cache and ignore list documents.
    pub cache_dir: PathBuf,

    pub method: HashMethod,

    pub match_options: MatchOptions,

    /// Worker threads for bulk hashing. Zero selects the default of
    /// `min(4, num_cpus)`; hashing is decode-bound, so more threads mostly
    /// add memory pressure.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("."),
            method: HashMethod::default(),
            match_options: MatchOptions::default(),
            worker_threads: 0,
        }
    }
}

/// The outcome of a bulk hashing run. Per-file failures never abort the
/// batch; they are collected here so the driver can report them.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub fingerprints: Vec<VideoFingerprint>,
    pub failures: Vec<(PathBuf, HashCreationErrorKind)>,
}

impl BatchOutcome {
    /// Files that could not be analyzed. Excludes files skipped because the
    /// run was cancelled.
    pub fn unscannable(&self) -> impl Iterator<Item = &Path> {
        self.failures
            .iter()
            .filter(|(_, e)| !matches!(e, HashCreationErrorKind::Cancelled(_)))
            .map(|(path, _)| path.as_path())
    }
}

/// The top-level facade: owns the fingerprint cache, ignore list, hasher
/// and a bounded worker pool, and exposes the operations a driver (CLI,
/// GUI, service) builds on.
pub struct DupFinderEngine {
    cache: FingerprintCache,
    ignore_list: IgnoreListStore,
    hasher: PerceptualHasher,
    source: Box<dyn FrameSource>,
    match_options: MatchOptions,
    pool: rayon::ThreadPool,
}

impl DupFinderEngine {
    pub fn new(config: EngineConfig, source: Box<dyn FrameSource>) -> Result<Self, EngineError> {
        let num_threads = if config.worker_threads == 0 {
            default_worker_threads()
        } else {
            config.worker_threads
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;

        Ok(Self {
            cache: FingerprintCache::open(&config.cache_dir, config.method),
            ignore_list: IgnoreListStore::open(&config.cache_dir),
            hasher: PerceptualHasher::new(config.method),
            source,
            match_options: config.match_options,
            pool,
        })
    }

    /// Fingerprint a single file, reusing the cache when the file is
    /// unchanged.
    pub fn compute_or_get_fingerprint(
        &self,
        src_path: impl AsRef<Path>,
    ) -> Result<VideoFingerprint, HashCreationErrorKind> {
        self.cache.get_or_compute(
            src_path,
            &self.hasher,
            self.source.as_ref(),
            &CancellationToken::new(),
        )
    }

    /// Fingerprint `src_paths` on the worker pool, reporting per-file
    /// progress. Already-cached files complete without decoding. A
    /// cancelled run returns whatever finished before the flag was seen.
    pub fn hash_files(
        &self,
        src_paths: &[PathBuf],
        progress: impl Fn(ProgressEvent) + Sync,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let total = src_paths.len();
        let completed = AtomicUsize::new(0);

        let results = self.pool.install(|| {
            src_paths
                .par_iter()
                .map(|src_path| {
                    let result = if cancel.is_cancelled() {
                        Err(HashCreationErrorKind::Cancelled(src_path.clone()))
                    } else {
                        self.cache.get_or_compute(
                            src_path,
                            &self.hasher,
                            self.source.as_ref(),
                            cancel,
                        )
                    };

                    progress(ProgressEvent::Hashing {
                        completed: completed.fetch_add(1, Relaxed) + 1,
                        total,
                    });
                    (src_path.clone(), result)
                })
                .collect::<Vec<_>>()
        });

        let mut outcome = BatchOutcome::default();
        for (src_path, result) in results {
            match result {
                Ok(fingerprint) => outcome.fingerprints.push(fingerprint),
                Err(e) => outcome.failures.push((src_path, e)),
            }
        }

        info!(
            target: "dup_finder",
            "hashed {} of {total} files ({} failures)",
            outcome.fingerprints.len(),
            outcome.failures.len()
        );
        outcome
    }

    /// Compare two files directly, fingerprinting them first if needed.
    pub fn compare(
        &self,
        path_a: impl AsRef<Path>,
        path_b: impl AsRef<Path>,
    ) -> Result<SimilarityResult, HashCreationErrorKind> {
        let fp_a = self.compute_or_get_fingerprint(path_a)?;
        let fp_b = self.compute_or_get_fingerprint(path_b)?;
        Ok(compare_fingerprints(&fp_a, &fp_b, &self.match_options))
    }

    /// Group every cached, still-existing file into duplicate clusters.
    pub fn find_groups(
        &self,
        progress: impl FnMut(ProgressEvent),
        cancel: &CancellationToken,
    ) -> Vec<DuplicateGroup> {
        let fingerprints = self.cache.fingerprints();
        find_duplicate_groups(
            &fingerprints,
            &self.ignore_list,
            &self.match_options,
            progress,
            cancel,
        )
    }

    /// Mark a pair as not-duplicates so future scans skip it.
    pub fn ignore(&self, path_a: impl AsRef<Path>, path_b: impl AsRef<Path>, permanent: bool) {
        self.ignore_list.add(path_a, path_b, permanent);
    }

    pub fn is_ignored(&self, path_a: impl AsRef<Path>, path_b: impl AsRef<Path>) -> bool {
        self.ignore_list.is_ignored(path_a, path_b)
    }

    /// Discard all cached fingerprints and their backing document.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    pub fn ignore_list(&self) -> &IgnoreListStore {
        &self.ignore_list
    }

    pub fn match_options(&self) -> &MatchOptions {
        &self.match_options
    }
}

fn default_worker_threads() -> usize {
    let num_cpus = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    num_cpus.min(4)
}
