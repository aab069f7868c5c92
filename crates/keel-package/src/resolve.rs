//! Import resolution
//!
//! Turns an import identifier into a concrete package directory and loads
//! the directory into compilation units. Resolution walks vendor
//! directories from the requesting package's subtree first, then the
//! ordered root set; the authoritative package name always comes from the
//! source declarations, never from the identifier.

use crate::analyzer::{FileSummary, SourceAnalyzer};
use crate::graph::{Package, PackageKind};
use crate::roots::{RootKind, RootSet};
use crate::{ResolveError, ResolveResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Reserved declared name marking a command (executable) package.
pub const COMMAND_NAME: &str = "main";

const SOURCE_EXT: &str = "kl";
const TEST_SUFFIX: &str = "_test";

/// Where an identifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLocation {
    pub identifier: String,
    pub dir: PathBuf,
    pub root_kind: RootKind,
    /// True when a nested vendor directory shadowed the ordinary roots.
    pub vendored: bool,
}

/// The compilation units found in one package directory.
///
/// A directory holds exactly one primary unit, optionally widened by
/// in-package test files, and optionally an external-test unit declaring
/// `<name>_test` that shares the path but compiles separately.
#[derive(Debug, Clone)]
pub struct PackageUnits {
    pub package: Package,
    pub internal_test: Option<Package>,
    pub external_test: Option<Package>,
}

/// Resolves identifiers against a root set and loads package directories.
pub struct ImportResolver {
    roots: RootSet,
    analyzer: Arc<dyn SourceAnalyzer>,
}

impl ImportResolver {
    pub fn new(roots: RootSet, analyzer: Arc<dyn SourceAnalyzer>) -> Self {
        Self { roots, analyzer }
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// Resolve an identifier to a package directory.
    ///
    /// `requested_from` is the directory of the importing package; when
    /// present, `vendor/` directories on the path from it up to its root's
    /// `src/` are probed first, innermost match winning.
    pub fn resolve(
        &self,
        identifier: &str,
        requested_from: Option<&Path>,
    ) -> ResolveResult<PackageLocation> {
        if let Some(from) = requested_from {
            if let Some(dir) = self.probe_vendor(identifier, from) {
                let root_kind = self
                    .roots
                    .root_of(&dir)
                    .map(|r| r.kind)
                    .unwrap_or(RootKind::Workspace);
                return Ok(PackageLocation {
                    identifier: identifier.to_string(),
                    dir,
                    root_kind,
                    vendored: true,
                });
            }
        }

        match self.roots.find(identifier) {
            Some(root) => Ok(PackageLocation {
                identifier: identifier.to_string(),
                dir: root.package_dir(identifier),
                root_kind: root.kind,
                vendored: false,
            }),
            None => Err(ResolveError::UnresolvedImport {
                identifier: identifier.to_string(),
                roots_searched: self.roots.len(),
            }),
        }
    }

    /// Walk ancestors of `from` up to its containing root's `src/`,
    /// returning the innermost `vendor/<identifier>` directory.
    fn probe_vendor(&self, identifier: &str, from: &Path) -> Option<PathBuf> {
        let stop = self.roots.root_of(from).map(|r| r.src_dir());
        let mut dir = Some(from);
        while let Some(cur) = dir {
            let mut candidate = cur.join("vendor");
            for segment in identifier.split('/') {
                candidate.push(segment);
            }
            if candidate.is_dir() {
                return Some(candidate);
            }
            if Some(cur) == stop.as_deref() {
                break;
            }
            dir = cur.parent();
        }
        None
    }

    /// Load and validate the compilation units of a resolved directory.
    pub fn load(&self, location: &PackageLocation) -> ResolveResult<PackageUnits> {
        let files = list_source_files(&location.dir)?;
        if files.is_empty() {
            return Err(ResolveError::EmptyPackage {
                dir: location.dir.clone(),
            });
        }

        let mut summaries = Vec::with_capacity(files.len());
        for file in &files {
            summaries.push((file.clone(), self.analyzer.analyze(file)?));
        }

        partition_units(location, summaries)
    }

    /// Resolve and load in one step.
    pub fn resolve_and_load(
        &self,
        identifier: &str,
        requested_from: Option<&Path>,
    ) -> ResolveResult<PackageUnits> {
        let location = self.resolve(identifier, requested_from)?;
        self.load(&location)
    }
}

/// Split analyzed files into primary / internal-test / external-test units
/// and enforce the one-declared-name-per-unit invariant.
fn partition_units(
    location: &PackageLocation,
    summaries: Vec<(PathBuf, FileSummary)>,
) -> ResolveResult<PackageUnits> {
    // Group by declared name first; the grouping decides unit membership,
    // file naming conventions alone never do.
    let mut by_name: BTreeMap<String, Vec<(PathBuf, FileSummary)>> = BTreeMap::new();
    for (path, summary) in summaries {
        by_name
            .entry(summary.declared_name.clone())
            .or_default()
            .push((path, summary));
    }

    let primary_name = {
        let non_test: Vec<&String> = by_name
            .keys()
            .filter(|n| !n.ends_with(TEST_SUFFIX))
            .collect();
        match non_test.as_slice() {
            [one] => (*one).clone(),
            [] => {
                return Err(ResolveError::EmptyPackage {
                    dir: location.dir.clone(),
                })
            }
            _ => {
                return Err(ResolveError::InconsistentPackageName {
                    dir: location.dir.clone(),
                    names: by_name.keys().cloned().collect(),
                })
            }
        }
    };

    // The only test name a directory may add is `<primary>_test`.
    let external_name = format!("{}{}", primary_name, TEST_SUFFIX);
    if by_name
        .keys()
        .any(|n| n.ends_with(TEST_SUFFIX) && *n != external_name)
    {
        return Err(ResolveError::InconsistentPackageName {
            dir: location.dir.clone(),
            names: by_name.keys().cloned().collect(),
        });
    }

    let primary_files = by_name.remove(&primary_name).unwrap_or_default();
    let external_files = by_name.remove(&external_name).unwrap_or_default();

    let (main_files, test_files): (Vec<_>, Vec<_>) = primary_files
        .into_iter()
        .partition(|(path, _)| !is_test_file(path));

    if main_files.is_empty() {
        return Err(ResolveError::EmptyPackage {
            dir: location.dir.clone(),
        });
    }

    let kind = if primary_name == COMMAND_NAME {
        PackageKind::Command
    } else {
        PackageKind::Library
    };

    let package = Package::from_files(location, &primary_name, kind, main_files.clone());

    let internal_test = if test_files.is_empty() {
        None
    } else {
        let mut all = main_files;
        all.extend(test_files);
        Some(Package::from_files(
            location,
            &primary_name,
            PackageKind::InternalTest,
            all,
        ))
    };

    let external_test = if external_files.is_empty() {
        None
    } else {
        Some(Package::from_files(
            location,
            &external_name,
            PackageKind::ExternalTest,
            external_files,
        ))
    };

    Ok(PackageUnits {
        package,
        internal_test,
        external_test,
    })
}

/// Source files of one package directory, sorted for determinism.
/// Packages are a single directory; subdirectories are other packages.
fn list_source_files(dir: &Path) -> ResolveResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk error"));
                return Err(ResolveError::io(dir, io));
            }
        };
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().and_then(|s| s.to_str()) == Some(SOURCE_EXT)
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn is_test_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(TEST_SUFFIX))
}

/// Display name for diagnostics: last identifier segment with a trailing
/// `.vN` version suffix stripped. Never used for graph identity.
pub fn display_name(identifier: &str) -> &str {
    let last = identifier.rsplit('/').next().unwrap_or(identifier);
    if let Some((base, suffix)) = last.rsplit_once('.') {
        if let Some(digits) = suffix.strip_prefix('v') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && !base.is_empty()
            {
                return base;
            }
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::DeclScanner;
    use crate::roots::RootSet;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn write_pkg(root: &Path, identifier: &str, files: &[(&str, &str)]) {
        let dir = root.join("src").join(identifier);
        fs::create_dir_all(&dir).unwrap();
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
    }

    fn resolver(roots: RootSet) -> ImportResolver {
        ImportResolver::new(roots, Arc::new(DeclScanner::new()))
    }

    #[rstest]
    #[case("lib/strings", "strings")]
    #[case("strings", "strings")]
    #[case("gopkg/yaml.v2", "yaml")]
    #[case("gopkg/yaml.v12", "yaml")]
    #[case("net/http.client", "http.client")]
    #[case("pkg.v", "pkg.v")]
    fn display_names(#[case] identifier: &str, #[case] expected: &str) {
        assert_eq!(display_name(identifier), expected);
    }

    #[test]
    fn resolves_in_root_order() {
        let w = TempDir::new().unwrap();
        let dist = TempDir::new().unwrap();
        write_pkg(w.path(), "demo", &[("demo.kl", "package demo\n")]);
        write_pkg(dist.path(), "demo", &[("demo.kl", "package demo\n")]);

        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            dist.path().to_path_buf(),
        ));
        let loc = r.resolve("demo", None).unwrap();
        assert_eq!(loc.root_kind, RootKind::Workspace);
        assert!(!loc.vendored);
        assert!(loc.dir.starts_with(w.path()));
    }

    #[test]
    fn unresolved_import_names_identifier() {
        let w = TempDir::new().unwrap();
        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        let err = r.resolve("no/such/pkg", None).unwrap_err();
        match err {
            ResolveError::UnresolvedImport { identifier, .. } => {
                assert_eq!(identifier, "no/such/pkg")
            }
            other => panic!("expected UnresolvedImport, got {other:?}"),
        }
    }

    #[test]
    fn vendor_copy_shadows_workspace_copy() {
        let w = TempDir::new().unwrap();
        write_pkg(w.path(), "app", &[("app.kl", "package main\nimport \"dep\"\n")]);
        write_pkg(w.path(), "dep", &[("dep.kl", "package dep\n")]);
        // vendored copy nested under the requesting package
        let vendored = w.path().join("src/app/vendor/dep");
        fs::create_dir_all(&vendored).unwrap();
        fs::write(vendored.join("dep.kl"), "package dep\n").unwrap();

        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        let app_dir = w.path().join("src/app");
        let loc = r.resolve("dep", Some(&app_dir)).unwrap();
        assert!(loc.vendored);
        assert_eq!(loc.dir, vendored);

        // Without a requesting package the workspace copy is used.
        let loc = r.resolve("dep", None).unwrap();
        assert!(!loc.vendored);
    }

    #[test]
    fn vendor_probe_stops_at_the_root() {
        let w = TempDir::new().unwrap();
        write_pkg(w.path(), "app", &[("app.kl", "package main\n")]);
        // vendor directory outside src/ must not be found
        let outside = w.path().join("vendor/dep");
        fs::create_dir_all(&outside).unwrap();

        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        let app_dir = w.path().join("src/app");
        assert!(r.resolve("dep", Some(&app_dir)).is_err());
    }

    #[test]
    fn loads_primary_unit_and_kind() {
        let w = TempDir::new().unwrap();
        write_pkg(
            w.path(),
            "tool",
            &[("main.kl", "package main\nimport \"lib\"\npub fn Run()\n")],
        );
        write_pkg(w.path(), "lib", &[("lib.kl", "package lib\n")]);

        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        let units = r.resolve_and_load("tool", None).unwrap();
        assert_eq!(units.package.kind, PackageKind::Command);
        assert_eq!(units.package.name, "main");
        assert_eq!(units.package.identifier, "tool");
        assert!(units.internal_test.is_none());
        assert!(units.external_test.is_none());
    }

    #[test]
    fn disagreeing_names_are_rejected() {
        let w = TempDir::new().unwrap();
        write_pkg(
            w.path(),
            "bad",
            &[("a.kl", "package one\n"), ("b.kl", "package two\n")],
        );
        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        let err = r.resolve_and_load("bad", None).unwrap_err();
        match err {
            ResolveError::InconsistentPackageName { names, .. } => {
                assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
            }
            other => panic!("expected InconsistentPackageName, got {other:?}"),
        }
    }

    #[test]
    fn external_test_unit_shares_the_directory() {
        let w = TempDir::new().unwrap();
        write_pkg(
            w.path(),
            "mathutil",
            &[
                ("math.kl", "package mathutil\npub fn Abs(x)\n"),
                ("math_test.kl", "package mathutil\nfn check()\n"),
                ("blackbox_test.kl", "package mathutil_test\nimport \"mathutil\"\n"),
            ],
        );
        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        let units = r.resolve_and_load("mathutil", None).unwrap();

        assert_eq!(units.package.kind, PackageKind::Library);
        assert_eq!(units.package.files.len(), 1);

        let internal = units.internal_test.unwrap();
        assert_eq!(internal.kind, PackageKind::InternalTest);
        assert_eq!(internal.files.len(), 2);

        let external = units.external_test.unwrap();
        assert_eq!(external.kind, PackageKind::ExternalTest);
        assert_eq!(external.name, "mathutil_test");
        assert_eq!(external.imports, vec!["mathutil".to_string()]);
    }

    #[test]
    fn unrelated_test_name_is_inconsistent() {
        let w = TempDir::new().unwrap();
        write_pkg(
            w.path(),
            "pkg",
            &[
                ("a.kl", "package pkg\n"),
                ("b_test.kl", "package other_test\n"),
            ],
        );
        let r = resolver(RootSet::new(
            vec![w.path().to_path_buf()],
            w.path().join("dist"),
        ));
        assert!(matches!(
            r.resolve_and_load("pkg", None).unwrap_err(),
            ResolveError::InconsistentPackageName { .. }
        ));
    }
}
