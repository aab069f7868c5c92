//! Keel build orchestration
//!
//! Schedules compilation over the dependency graph in parallel levels,
//! caching artifacts by content so that only packages affected by a
//! change are rebuilt. The cache key of a package folds in the export
//! fingerprints of its direct dependencies: an interface change
//! propagates to every transitive dependent, an internal-only change
//! stops at the package itself.

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod orchestrator;
pub mod toolchain;

pub use cache::{BuildCache, CacheEntry, CacheStats};
pub use error::{BuildError, BuildResult};
pub use fingerprint::{content_fingerprint, CacheKey, Fingerprint};
pub use orchestrator::{BuildReport, BuildStats, NodeOutcome, Orchestrator};
pub use toolchain::{
    CompileUnit, CompiledArtifact, LinkInput, RefToolchain, SourceFile, Toolchain, ToolchainError,
};
