//! Content-addressed build cache
//!
//! Entries are keyed by [`CacheKey`] digest and stored durably under
//! `<dir>/<first-two-hex>/<digest>/` as a metadata file plus the
//! artifact bytes. Concurrent requests for the same key coalesce: the
//! first caller computes, everyone else blocks on the in-flight slot
//! and shares the result. Failures are shared with the waiters of that
//! attempt but never recorded durably, so a later build retries.

use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{CacheKey, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

const ENTRY_FILE: &str = "entry.json";
const ARTIFACT_FILE: &str = "artifact.bin";

/// A completed, durably stored build output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Import identifier the entry was built for (diagnostics only; the
    /// digest is the authoritative key).
    pub identifier: String,
    /// Cache key digest.
    pub digest: String,
    /// Export fingerprint of the compiled package.
    pub export: Fingerprint,
    /// Location of the artifact bytes on disk.
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
}

enum Slot {
    InFlight,
    Done(Result<CacheEntry, String>),
}

pub struct BuildCache {
    dir: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
    cond: Condvar,
    stats: Mutex<CacheStats>,
}

/// Serialized form of an entry on disk; the artifact path is implicit
/// from the entry directory.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    identifier: String,
    digest: String,
    export: Fingerprint,
}

impl BuildCache {
    pub fn open(dir: impl Into<PathBuf>) -> BuildResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
        Ok(Self {
            dir,
            slots: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
            stats: Mutex::new(CacheStats::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    fn entry_dir(&self, digest: &str) -> PathBuf {
        // two-level fanout keeps directory listings small
        self.dir.join(&digest[..2]).join(digest)
    }

    /// Look up a durable entry without computing anything.
    pub fn lookup(&self, key: &CacheKey) -> BuildResult<Option<CacheEntry>> {
        let dir = self.entry_dir(key.digest());
        let meta_path = dir.join(ENTRY_FILE);
        let bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BuildError::io(&meta_path, e)),
        };
        let stored: StoredEntry = serde_json::from_slice(&bytes)
            .map_err(|e| BuildError::Cache(format!("corrupt entry at {}: {e}", meta_path.display())))?;
        Ok(Some(CacheEntry {
            identifier: stored.identifier,
            digest: stored.digest,
            export: stored.export,
            artifact: dir.join(ARTIFACT_FILE),
        }))
    }

    /// Store an entry durably. Idempotent: an existing entry for the
    /// same digest is left in place.
    pub fn store(
        &self,
        key: &CacheKey,
        export: Fingerprint,
        artifact: &[u8],
    ) -> BuildResult<CacheEntry> {
        let dir = self.entry_dir(key.digest());
        if let Some(existing) = self.lookup(key)? {
            return Ok(existing);
        }

        let parent = dir
            .parent()
            .ok_or_else(|| BuildError::Cache(format!("entry dir has no parent: {}", dir.display())))?;
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;

        // Stage next to the final location and publish by rename so a
        // crash mid-write never leaves a readable half-entry.
        let staging = tempfile::Builder::new()
            .prefix(".keel-cache-")
            .tempdir_in(parent)
            .map_err(|e| BuildError::io(parent, e))?;
        let stored = StoredEntry {
            identifier: key.identifier().to_string(),
            digest: key.digest().to_string(),
            export: export.clone(),
        };
        let meta = serde_json::to_vec_pretty(&stored)
            .map_err(|e| BuildError::Cache(format!("encode entry: {e}")))?;
        fs::write(staging.path().join(ARTIFACT_FILE), artifact)
            .map_err(|e| BuildError::io(staging.path(), e))?;
        fs::write(staging.path().join(ENTRY_FILE), meta)
            .map_err(|e| BuildError::io(staging.path(), e))?;

        match fs::rename(staging.keep(), &dir) {
            Ok(()) => {}
            // lost the race to another process; its entry is equivalent
            Err(_) if dir.join(ENTRY_FILE).is_file() => {}
            Err(e) => return Err(BuildError::io(&dir, e)),
        }

        Ok(CacheEntry {
            identifier: key.identifier().to_string(),
            digest: key.digest().to_string(),
            export,
            artifact: dir.join(ARTIFACT_FILE),
        })
    }

    /// Return the entry for `key`, computing it with `compute` on a
    /// miss. The boolean is true on a cache hit. At most one compute
    /// runs per key at a time; concurrent callers wait and share the
    /// outcome of the in-flight attempt.
    pub fn lookup_or_compute<F>(&self, key: &CacheKey, compute: F) -> BuildResult<(CacheEntry, bool)>
    where
        F: FnOnce() -> BuildResult<(Fingerprint, Vec<u8>)>,
    {
        let digest = key.digest().to_string();

        let mut slots = lock(&self.slots);
        loop {
            match slots.get(&digest) {
                None => break,
                Some(Slot::InFlight) => {
                    lock(&self.stats).coalesced += 1;
                    slots = wait(&self.cond, slots);
                    // re-inspect after wakeup; the slot may be done or
                    // cleared by now
                    if let Some(Slot::Done(result)) = slots.get(&digest) {
                        let shared = result.clone();
                        drop(slots);
                        return match shared {
                            Ok(entry) => {
                                lock(&self.stats).hits += 1;
                                Ok((entry, true))
                            }
                            Err(message) => {
                                Err(BuildError::compile(key.identifier(), message))
                            }
                        };
                    }
                }
                Some(Slot::Done(result)) => {
                    let shared = result.clone();
                    drop(slots);
                    return match shared {
                        Ok(entry) => {
                            lock(&self.stats).hits += 1;
                            Ok((entry, true))
                        }
                        Err(message) => Err(BuildError::compile(key.identifier(), message)),
                    };
                }
            }
        }

        // durable hit short-circuits before claiming the slot
        match self.lookup(key) {
            Ok(Some(entry)) => {
                slots.insert(digest, Slot::Done(Ok(entry.clone())));
                drop(slots);
                self.cond.notify_all();
                lock(&self.stats).hits += 1;
                return Ok((entry, true));
            }
            Ok(None) => {}
            Err(e) => return Err(e),
        }

        slots.insert(digest.clone(), Slot::InFlight);
        drop(slots);

        let outcome = compute().and_then(|(export, artifact)| self.store(key, export, &artifact));

        let mut slots = lock(&self.slots);
        match &outcome {
            Ok(entry) => {
                slots.insert(digest, Slot::Done(Ok(entry.clone())));
                lock(&self.stats).misses += 1;
            }
            Err(e) => {
                // shared with this attempt's waiters only; the durable
                // store never sees failures, so a fresh build retries
                slots.insert(digest, Slot::Done(Err(e.to_string())));
            }
        }
        drop(slots);
        self.cond.notify_all();

        outcome.map(|entry| (entry, false))
    }

    /// Forget in-memory slots. Durable entries are untouched; intended
    /// for a fresh build pass over the same cache.
    pub fn reset_session(&self) {
        lock(&self.slots).clear();
        self.cond.notify_all();
    }
}

// A poisoned lock only means another thread panicked mid-update of the
// stats or slot map; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn wait<'a, T>(cond: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    cond.wait(guard).unwrap_or_else(|e| e.into_inner())
}
