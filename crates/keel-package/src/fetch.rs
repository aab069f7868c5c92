//! Remote source retrieval and the managed workspace root
//!
//! Identifiers absent from every local root are fetched by convention: a
//! metadata probe at a canonical URL derived from the identifier names a
//! source tarball, which is unpacked into the primary workspace root.
//! Retrieval is staged and published by rename, so a failed fetch never
//! leaves a partially-checked-out package resolvable.

use crate::roots::SourceRoot;
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use tar::Archive;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid import identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("metadata lookup failed for '{identifier}': {message}")]
    Metadata { identifier: String, message: String },

    #[error("download failed from {url}: {message}")]
    Download { url: String, message: String },

    #[error("unpack failed for '{identifier}': {message}")]
    Unpack { identifier: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reuse an existing local copy, or always refetch (`get -u`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Use the managed copy if present; never silently upgrade.
    #[default]
    Reuse,
    /// Fetch the latest sources even when a copy exists.
    Update,
}

/// Retrieves one package's source tree into a staging directory.
pub trait SourceFetcher: Send + Sync {
    fn fetch_into(&self, identifier: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Convention-based HTTP fetcher.
///
/// `https://<identifier>?keel-source=1` must answer with a line of the
/// form `keel-source <tarball-url>`; the tarball is a gzipped tar of the
/// package directory contents.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            // falls back to default settings; builder only fails on TLS
            // backend initialization
            .unwrap_or_default();
        Self { client }
    }

    fn metadata_url(identifier: &str) -> String {
        format!("https://{identifier}?keel-source=1")
    }

    fn tarball_url(&self, identifier: &str) -> Result<String, FetchError> {
        let meta_url = Self::metadata_url(identifier);
        let body = self
            .client
            .get(&meta_url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| FetchError::Metadata {
                identifier: identifier.to_string(),
                message: e.to_string(),
            })?;

        body.lines()
            .find_map(|line| line.trim().strip_prefix("keel-source "))
            .map(|url| url.trim().to_string())
            .ok_or_else(|| FetchError::Metadata {
                identifier: identifier.to_string(),
                message: format!("no keel-source line in response from {meta_url}"),
            })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch_into(&self, identifier: &str, dest: &Path) -> Result<(), FetchError> {
        let url = self.tarball_url(identifier)?;
        let bytes = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(|e| FetchError::Download {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Archive::new(GzDecoder::new(bytes.as_ref()))
            .unpack(dest)
            .map_err(|e| FetchError::Unpack {
                identifier: identifier.to_string(),
                message: e.to_string(),
            })
    }
}

/// Places fetched packages into the managed (primary workspace) root.
pub struct FetchResolver {
    fetcher: Box<dyn SourceFetcher>,
    target: SourceRoot,
}

impl FetchResolver {
    pub fn new(fetcher: Box<dyn SourceFetcher>, target: SourceRoot) -> Self {
        Self { fetcher, target }
    }

    /// Make `identifier` resolvable under the managed root.
    ///
    /// In `Reuse` mode an existing copy short-circuits the fetch; in
    /// `Update` mode the sources are refetched and the old copy replaced
    /// only after the new tree is fully staged.
    pub fn ensure(&self, identifier: &str, mode: FetchMode) -> Result<PathBuf, FetchError> {
        validate_identifier(identifier)?;

        let dest = self.target.package_dir(identifier);
        if dest.is_dir() && mode == FetchMode::Reuse {
            return Ok(dest);
        }

        let src_dir = self.target.src_dir();
        fs::create_dir_all(&src_dir).map_err(|e| FetchError::io(&src_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".keel-fetch-")
            .tempdir_in(&src_dir)
            .map_err(|e| FetchError::io(&src_dir, e))?;

        self.fetcher.fetch_into(identifier, staging.path())?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }
        if dest.is_dir() {
            fs::remove_dir_all(&dest).map_err(|e| FetchError::io(&dest, e))?;
        }
        // Same filesystem as the staging dir, so publication is a rename.
        fs::rename(staging.keep(), &dest).map_err(|e| FetchError::io(&dest, e))?;
        Ok(dest)
    }
}

/// Identifiers become filesystem paths; reject anything that would
/// escape the root.
fn validate_identifier(identifier: &str) -> Result<(), FetchError> {
    let bad = identifier.is_empty()
        || identifier.starts_with('/')
        || identifier
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(FetchError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Test fetcher that materializes a fixed file tree.
    struct TreeFetcher {
        files: Vec<(&'static str, &'static str)>,
        calls: Arc<AtomicUsize>,
    }

    impl SourceFetcher for TreeFetcher {
        fn fetch_into(&self, _identifier: &str, dest: &Path) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for (name, body) in &self.files {
                fs::write(dest.join(name), body).map_err(|e| FetchError::io(dest, e))?;
            }
            Ok(())
        }
    }

    struct FailingFetcher;

    impl SourceFetcher for FailingFetcher {
        fn fetch_into(&self, identifier: &str, _dest: &Path) -> Result<(), FetchError> {
            Err(FetchError::Download {
                url: format!("https://{identifier}/archive.tar.gz"),
                message: "connection refused".to_string(),
            })
        }
    }

    fn resolver_with(
        root: &TempDir,
        files: Vec<(&'static str, &'static str)>,
    ) -> (FetchResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = TreeFetcher {
            files,
            calls: calls.clone(),
        };
        (
            FetchResolver::new(
                Box::new(fetcher),
                SourceRoot::workspace(root.path().to_path_buf()),
            ),
            calls,
        )
    }

    #[test]
    fn fetches_into_managed_root() {
        let root = TempDir::new().unwrap();
        let (resolver, calls) = resolver_with(&root, vec![("dep.kl", "package dep\n")]);

        let dir = resolver.ensure("example.org/dep", FetchMode::Reuse).unwrap();
        assert_eq!(dir, root.path().join("src/example.org/dep"));
        assert!(dir.join("dep.kl").is_file());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reuse_mode_skips_existing_copy() {
        let root = TempDir::new().unwrap();
        let (resolver, calls) = resolver_with(&root, vec![("dep.kl", "package dep\n")]);

        resolver.ensure("example.org/dep", FetchMode::Reuse).unwrap();
        resolver.ensure("example.org/dep", FetchMode::Reuse).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_mode_refetches() {
        let root = TempDir::new().unwrap();
        let (resolver, calls) = resolver_with(&root, vec![("dep.kl", "package dep\n")]);

        resolver.ensure("example.org/dep", FetchMode::Reuse).unwrap();
        resolver.ensure("example.org/dep", FetchMode::Update).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_fetch_leaves_nothing_resolvable() {
        let root = TempDir::new().unwrap();
        let resolver = FetchResolver::new(
            Box::new(FailingFetcher),
            SourceRoot::workspace(root.path().to_path_buf()),
        );

        let err = resolver.ensure("example.org/dep", FetchMode::Reuse).unwrap_err();
        assert!(matches!(err, FetchError::Download { .. }));
        assert!(!root.path().join("src/example.org/dep").exists());
        // no stray staging directories either
        let leftovers: Vec<_> = fs::read_dir(root.path().join("src"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty(), "staging leaked: {leftovers:?}");
    }

    #[test]
    fn update_preserves_old_copy_when_fetch_fails() {
        let root = TempDir::new().unwrap();
        let (ok_resolver, _) = resolver_with(&root, vec![("dep.kl", "package dep\n")]);
        ok_resolver.ensure("example.org/dep", FetchMode::Reuse).unwrap();

        let failing = FetchResolver::new(
            Box::new(FailingFetcher),
            SourceRoot::workspace(root.path().to_path_buf()),
        );
        assert!(failing.ensure("example.org/dep", FetchMode::Update).is_err());
        // old copy untouched
        assert!(root.path().join("src/example.org/dep/dep.kl").is_file());
    }

    #[test]
    fn path_escaping_identifiers_are_rejected() {
        let root = TempDir::new().unwrap();
        let (resolver, _) = resolver_with(&root, vec![]);
        for bad in ["", "/abs", "a//b", "a/../b", "."] {
            assert!(matches!(
                resolver.ensure(bad, FetchMode::Reuse).unwrap_err(),
                FetchError::InvalidIdentifier(_)
            ));
        }
    }

    #[test]
    fn metadata_line_parsing() {
        // exercised without the network: just the line-scan convention
        let body = "# mirror\nkeel-source https://cdn.example.org/dep.tar.gz\n";
        let url = body
            .lines()
            .find_map(|l| l.trim().strip_prefix("keel-source "))
            .map(str::trim);
        assert_eq!(url, Some("https://cdn.example.org/dep.tar.gz"));
    }
}
