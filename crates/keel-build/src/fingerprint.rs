//! Content and cache-key fingerprints
//!
//! A fingerprint is a sha-256 digest in hex. Content fingerprints cover
//! (path, bytes) pairs in sorted order; cache keys additionally fold in
//! the export fingerprints of every direct dependency, which is what
//! makes interface changes propagate through the cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded sha-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_digest(hasher))
    }

    /// Domain-separated digest over a sequence of parts. Each part is
    /// length-delimited so concatenation ambiguity cannot collide.
    pub fn of_parts<'a>(domain: &str, parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain.as_bytes());
        hasher.update([0]);
        for part in parts {
            hasher.update(part.len().to_le_bytes());
            hasher.update(part);
        }
        Self(hex_digest(hasher))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of a package's source set: (relative path, bytes) pairs,
/// hashed in sorted path order so directory iteration order is
/// irrelevant.
pub fn content_fingerprint(files: &[(String, Vec<u8>)]) -> Fingerprint {
    let mut sorted: Vec<&(String, Vec<u8>)> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    hasher.update(b"keel-content-v1");
    hasher.update([0]);
    for (path, bytes) in sorted {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(bytes.len().to_le_bytes());
        hasher.update(bytes);
    }
    Fingerprint(hex_digest(hasher))
}

/// Cache key: (import identifier, source content fingerprint, sorted
/// direct-dependency export fingerprints).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    identifier: String,
    digest: String,
}

impl CacheKey {
    pub fn compute(
        identifier: &str,
        content: &Fingerprint,
        dep_exports: &[(String, Fingerprint)],
    ) -> Self {
        let mut deps: Vec<&(String, Fingerprint)> = dep_exports.iter().collect();
        deps.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        hasher.update(b"keel-cache-key-v1");
        hasher.update([0]);
        hasher.update(identifier.as_bytes());
        hasher.update([0]);
        hasher.update(content.as_str().as_bytes());
        hasher.update([0]);
        for (dep, export) in deps {
            hasher.update(dep.as_bytes());
            hasher.update([0]);
            hasher.update(export.as_str().as_bytes());
            hasher.update([0]);
        }

        Self {
            identifier: identifier.to_string(),
            digest: hex_digest(hasher),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn hex_digest(hasher: Sha256) -> String {
    let bytes = hasher.finalize();
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}
