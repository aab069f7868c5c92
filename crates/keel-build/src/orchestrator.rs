//! Parallel build scheduling over the dependency graph
//!
//! Packages are compiled level by level: a level holds packages whose
//! dependencies all live in earlier levels, so everything within one
//! level compiles concurrently. A failed package fails once; its
//! dependents are skipped with a pointer at the failure instead of
//! producing cascading errors. Command roots are linked after all
//! levels complete.

use crate::cache::{BuildCache, CacheEntry};
use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{content_fingerprint, CacheKey};
use crate::toolchain::{CompileUnit, LinkInput, SourceFile, Toolchain};
use keel_package::{DependencyGraph, Package, PackageKind};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-package result of one build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Compiled in this pass.
    Fresh,
    /// Served from the cache.
    Cached,
    /// Compilation failed.
    Failed { message: String },
    /// Not attempted because a dependency failed.
    Skipped { failed_dependency: String },
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fresh | Self::Cached)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub fresh: usize,
    pub cached: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Outcome per package identifier.
    pub outcomes: BTreeMap<String, NodeOutcome>,
    /// Linked executables per command-root identifier.
    pub executables: BTreeMap<String, PathBuf>,
    pub stats: BuildStats,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes.values().all(NodeOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            NodeOutcome::Failed { message } => Some((id.as_str(), message.as_str())),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            NodeOutcome::Skipped { failed_dependency } => {
                Some((id.as_str(), failed_dependency.as_str()))
            }
            _ => None,
        })
    }
}

pub struct Orchestrator {
    cache: Arc<BuildCache>,
    toolchain: Arc<dyn Toolchain>,
    jobs: Option<usize>,
}

enum NodeResult {
    Built { entry: CacheEntry, hit: bool },
    Failed(String),
    Skipped(String),
}

impl Orchestrator {
    pub fn new(cache: Arc<BuildCache>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            cache,
            toolchain,
            jobs: None,
        }
    }

    /// Cap compile parallelism; default is one worker per core.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Compile the whole graph and link its command roots into
    /// `bin_dir`. Per-package failures land in the report rather than
    /// aborting the pass; only infrastructure errors (thread pool,
    /// output directory) return `Err`.
    pub fn build(&self, graph: &DependencyGraph, bin_dir: &Path) -> BuildResult<BuildReport> {
        let levels = graph.parallel_levels()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs.unwrap_or(0))
            .build()
            .map_err(|e| BuildError::Cache(format!("thread pool: {e}")))?;

        let mut report = BuildReport::default();
        let mut completed: HashMap<String, CacheEntry> = HashMap::new();

        for level in levels {
            let results: Vec<(String, NodeResult)> = pool.install(|| {
                level
                    .par_iter()
                    .map(|id| {
                        let pkg = match graph.get(id) {
                            Some(pkg) => pkg,
                            None => {
                                return (
                                    id.clone(),
                                    NodeResult::Failed(format!("unknown package '{id}'")),
                                )
                            }
                        };
                        (id.clone(), self.build_one(pkg, &report.outcomes, &completed))
                    })
                    .collect()
            });

            for (id, result) in results {
                let outcome = match result {
                    NodeResult::Built { entry, hit } => {
                        completed.insert(id.clone(), entry);
                        if hit {
                            report.stats.cached += 1;
                            NodeOutcome::Cached
                        } else {
                            report.stats.fresh += 1;
                            NodeOutcome::Fresh
                        }
                    }
                    NodeResult::Failed(message) => {
                        report.stats.failed += 1;
                        NodeOutcome::Failed { message }
                    }
                    NodeResult::Skipped(failed_dependency) => {
                        report.stats.skipped += 1;
                        NodeOutcome::Skipped { failed_dependency }
                    }
                };
                report.outcomes.insert(id, outcome);
            }
        }

        self.link_commands(graph, bin_dir, &completed, &mut report)?;
        Ok(report)
    }

    fn build_one(
        &self,
        pkg: &Package,
        outcomes: &BTreeMap<String, NodeOutcome>,
        completed: &HashMap<String, CacheEntry>,
    ) -> NodeResult {
        // Dependency failure anywhere upstream skips this package.
        for dep in pkg.dependencies() {
            match outcomes.get(dep) {
                Some(o) if o.is_success() => {}
                Some(NodeOutcome::Failed { .. }) => return NodeResult::Skipped(dep.clone()),
                Some(NodeOutcome::Skipped { failed_dependency }) => {
                    return NodeResult::Skipped(failed_dependency.clone())
                }
                _ => {
                    return NodeResult::Failed(format!(
                        "dependency '{dep}' was not scheduled before '{}'",
                        pkg.identifier
                    ))
                }
            }
        }

        let sources = match read_sources(pkg) {
            Ok(sources) => sources,
            Err(e) => return NodeResult::Failed(e.to_string()),
        };

        let content = content_fingerprint(
            &sources
                .iter()
                .map(|s| (s.rel_path.clone(), s.bytes.clone()))
                .collect::<Vec<_>>(),
        );
        let dep_exports: Vec<(String, crate::fingerprint::Fingerprint)> = pkg
            .dependencies()
            .filter_map(|dep| completed.get(dep).map(|e| (dep.clone(), e.export.clone())))
            .collect();
        let key = CacheKey::compute(&pkg.identifier, &content, &dep_exports);

        let compute = || {
            let mut dep_artifacts = Vec::with_capacity(dep_exports.len());
            for (dep, _) in &dep_exports {
                let entry = completed
                    .get(dep)
                    .ok_or_else(|| BuildError::compile(&pkg.identifier, format!("missing dependency '{dep}'")))?;
                let bytes =
                    fs::read(&entry.artifact).map_err(|e| BuildError::io(&entry.artifact, e))?;
                dep_artifacts.push((dep.clone(), bytes));
            }
            let unit = CompileUnit {
                identifier: pkg.identifier.clone(),
                package_name: pkg.name.clone(),
                sources,
                dep_artifacts,
            };
            let artifact = self
                .toolchain
                .compile(&unit)
                .map_err(|e| BuildError::compile(&pkg.identifier, e))?;
            Ok((artifact.export, artifact.bytes))
        };

        match self.cache.lookup_or_compute(&key, compute) {
            Ok((entry, hit)) => NodeResult::Built { entry, hit },
            Err(e) => NodeResult::Failed(e.to_string()),
        }
    }

    fn link_commands(
        &self,
        graph: &DependencyGraph,
        bin_dir: &Path,
        completed: &HashMap<String, CacheEntry>,
        report: &mut BuildReport,
    ) -> BuildResult<()> {
        let commands: Vec<&Package> = graph
            .roots()
            .iter()
            .filter_map(|id| graph.get(id))
            .filter(|pkg| pkg.kind == PackageKind::Command)
            .collect();
        if commands.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(bin_dir).map_err(|e| BuildError::io(bin_dir, e))?;

        for pkg in commands {
            let succeeded = report
                .outcomes
                .get(&pkg.identifier)
                .is_some_and(NodeOutcome::is_success);
            if !succeeded {
                continue;
            }

            match self.link_one(graph, pkg, bin_dir, completed) {
                Ok(output) => {
                    report.executables.insert(pkg.identifier.clone(), output);
                }
                Err(e) => {
                    // it compiled but did not link; reclassify
                    match report.outcomes.get(&pkg.identifier) {
                        Some(NodeOutcome::Fresh) => report.stats.fresh -= 1,
                        Some(NodeOutcome::Cached) => report.stats.cached -= 1,
                        _ => {}
                    }
                    report.stats.failed += 1;
                    report.outcomes.insert(
                        pkg.identifier.clone(),
                        NodeOutcome::Failed {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn link_one(
        &self,
        graph: &DependencyGraph,
        pkg: &Package,
        bin_dir: &Path,
        completed: &HashMap<String, CacheEntry>,
    ) -> BuildResult<PathBuf> {
        let mut order = graph.transitive_deps(&pkg.identifier);
        order.push(pkg.identifier.clone());

        let mut artifacts = Vec::with_capacity(order.len());
        for id in &order {
            let entry = completed
                .get(id)
                .ok_or_else(|| BuildError::link(&pkg.identifier, format!("missing artifact for '{id}'")))?;
            let bytes =
                fs::read(&entry.artifact).map_err(|e| BuildError::io(&entry.artifact, e))?;
            artifacts.push((id.clone(), bytes));
        }

        let output = bin_dir.join(executable_name(&pkg.identifier));
        let bytes = self
            .toolchain
            .link(&LinkInput {
                identifier: pkg.identifier.clone(),
                artifacts,
                output: output.clone(),
            })
            .map_err(|e| BuildError::link(&pkg.identifier, e))?;
        fs::write(&output, bytes).map_err(|e| BuildError::io(&output, e))?;
        Ok(output)
    }
}

/// Executable name for a command root: last identifier segment, with a
/// trailing major-version suffix dropped.
fn executable_name(identifier: &str) -> &str {
    let display = keel_package::display_name(identifier);
    display.rsplit('/').next().unwrap_or(display)
}

fn read_sources(pkg: &Package) -> BuildResult<Vec<SourceFile>> {
    let mut sources = Vec::with_capacity(pkg.files.len());
    for file in &pkg.files {
        let rel_path = file
            .strip_prefix(&pkg.dir)
            .unwrap_or(file)
            .to_string_lossy()
            .into_owned();
        let bytes = fs::read(file).map_err(|e| BuildError::io(file, e))?;
        sources.push(SourceFile { rel_path, bytes });
    }
    Ok(sources)
}
