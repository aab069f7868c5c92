//! Source roots and the per-root workspace layout
//!
//! Each root contributes candidate package directories under `src/`,
//! caches compiled artifacts under `pkg/`, and receives linked
//! executables under `bin/`. Roots are searched in priority order:
//! workspace roots (KEEL_PATH order) first, then the distribution root.
//! Vendor directories are not roots of their own; they are probed from
//! the requesting package's subtree by the resolver.

use std::path::{Path, PathBuf};

/// What a root contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// Built-in packages shipped with the toolchain; not user-writable.
    Distribution,
    /// A user or third-party source root (an entry of KEEL_PATH).
    Workspace,
}

/// One ordered search location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub kind: RootKind,
    pub path: PathBuf,
}

impl SourceRoot {
    pub fn distribution(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: RootKind::Distribution,
            path: path.into(),
        }
    }

    pub fn workspace(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: RootKind::Workspace,
            path: path.into(),
        }
    }

    /// Package sources live under `src/<import-identifier>/`.
    pub fn src_dir(&self) -> PathBuf {
        self.path.join("src")
    }

    /// Cached build artifacts.
    pub fn pkg_dir(&self) -> PathBuf {
        self.path.join("pkg")
    }

    /// Linked executables for command packages.
    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }

    /// Directory a given identifier would occupy in this root.
    pub fn package_dir(&self, identifier: &str) -> PathBuf {
        let mut dir = self.src_dir();
        for segment in identifier.split('/') {
            dir.push(segment);
        }
        dir
    }

    /// Whether this root currently contains the identifier.
    pub fn contains(&self, identifier: &str) -> bool {
        self.package_dir(identifier).is_dir()
    }
}

/// The ordered list of roots a resolution universe is made of.
///
/// Workspace roots come first in KEEL_PATH order; the distribution root
/// is last. The first root containing a directory for the identifier
/// wins.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    roots: Vec<SourceRoot>,
}

impl RootSet {
    pub fn new(workspace_roots: Vec<PathBuf>, distribution_root: PathBuf) -> Self {
        let mut roots: Vec<SourceRoot> =
            workspace_roots.into_iter().map(SourceRoot::workspace).collect();
        roots.push(SourceRoot::distribution(distribution_root));
        Self { roots }
    }

    /// Build from explicit roots, preserving order. Used by tests and by
    /// callers composing unusual layouts.
    pub fn from_roots(roots: Vec<SourceRoot>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[SourceRoot] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// First workspace root: the managed root fetched packages land in.
    pub fn primary_workspace(&self) -> Option<&SourceRoot> {
        self.roots.iter().find(|r| r.kind == RootKind::Workspace)
    }

    /// First root (in priority order) containing the identifier.
    pub fn find(&self, identifier: &str) -> Option<&SourceRoot> {
        self.roots.iter().find(|r| r.contains(identifier))
    }

    /// The root whose `src/` contains `dir`, if any.
    pub fn root_of(&self, dir: &Path) -> Option<&SourceRoot> {
        self.roots.iter().find(|r| dir.starts_with(r.src_dir()))
    }
}
