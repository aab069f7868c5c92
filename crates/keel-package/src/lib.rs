//! Keel package resolution
//!
//! Maps import identifiers to package directories across ordered source
//! roots, builds the acyclic dependency graph for a set of root packages,
//! and fetches packages that are absent from every local root.
//!
//! The pieces fit together as: [`roots::RootSet`] describes where packages
//! may live, [`resolve::ImportResolver`] turns an identifier into a loaded
//! [`graph::Package`], [`graph::GraphBuilder`] computes the transitive
//! closure and validates it, and [`fetch::FetchResolver`] retrieves missing
//! identifiers into a managed workspace root.

pub mod analyzer;
pub mod fetch;
pub mod graph;
pub mod resolve;
pub mod roots;

use std::path::PathBuf;
use thiserror::Error;

pub use analyzer::{DeclScanner, FileSummary, ImportDecl, SourceAnalyzer};
pub use fetch::{FetchError, FetchMode, FetchResolver, HttpFetcher, SourceFetcher};
pub use graph::{DependencyGraph, GraphBuilder, Package, PackageKind};
pub use resolve::{display_name, ImportResolver, PackageLocation};
pub use roots::{RootKind, RootSet, SourceRoot};

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Resolution and graph construction errors.
///
/// Every variant names the offending import identifier; cycles carry the
/// full path so diagnostics never require the user to infer it.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unresolved import '{identifier}' (searched {roots_searched} roots)")]
    UnresolvedImport {
        identifier: String,
        roots_searched: usize,
    },

    #[error("package directory {dir} declares multiple names: {names:?}")]
    InconsistentPackageName { dir: PathBuf, names: Vec<String> },

    #[error("package '{identifier}' imports itself")]
    SelfImport { identifier: String },

    #[error("cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error(
        "import name conflict in {file}: '{name}' is declared by both \
         '{first}' and '{second}' (add a per-file alias to one of them)"
    )]
    ImportNameConflict {
        file: PathBuf,
        name: String,
        first: String,
        second: String,
    },

    #[error("analyzer error in {file}: {message}")]
    Analyzer { file: PathBuf, message: String },

    #[error("no source files in package directory {dir}")]
    EmptyPackage { dir: PathBuf },

    #[error("fetch failed for '{identifier}': {source}")]
    Fetch {
        identifier: String,
        source: FetchError,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an analyzer error for a file
    pub fn analyzer(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Analyzer {
            file: file.into(),
            message: message.into(),
        }
    }
}
