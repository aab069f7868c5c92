//! Dependency graph construction and validation
//!
//! Nodes are packages, a directed edge A -> B exists iff A's sources
//! import B. The graph is rebuilt fresh per build invocation, must be
//! acyclic, and yields both a deterministic topological order and
//! parallel scheduling levels.

use crate::analyzer::FileSummary;
use crate::fetch::{FetchMode, FetchResolver};
use crate::resolve::{ImportResolver, PackageLocation};
use crate::{ResolveError, ResolveResult};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

/// Closed set of package kinds; the orchestrator branches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Library,
    Command,
    InternalTest,
    ExternalTest,
}

/// One compilation unit: a directory-scoped set of source files with a
/// single declared name.
#[derive(Debug, Clone)]
pub struct Package {
    /// Import identifier (graph identity)
    pub identifier: String,
    /// Declared name from the sources ("main" for commands)
    pub name: String,
    pub kind: PackageKind,
    pub dir: PathBuf,
    pub vendored: bool,
    /// Source files, sorted
    pub files: Vec<PathBuf>,
    /// Analyzer output per file, in file order
    pub summaries: Vec<(PathBuf, FileSummary)>,
    /// Referenced direct dependencies, sorted and deduplicated
    pub imports: Vec<String>,
    /// Activation-only direct dependencies (side-effect inclusion),
    /// sorted and deduplicated, disjoint from `imports`
    pub activation_imports: Vec<String>,
}

impl Package {
    /// Assemble a unit from analyzed files.
    pub fn from_files(
        location: &PackageLocation,
        name: &str,
        kind: PackageKind,
        files: Vec<(PathBuf, FileSummary)>,
    ) -> Self {
        let mut referenced = BTreeSet::new();
        let mut activation = BTreeSet::new();
        for (_, summary) in &files {
            for import in &summary.imports {
                if import.activation_only {
                    activation.insert(import.identifier.clone());
                } else {
                    referenced.insert(import.identifier.clone());
                }
            }
        }
        // A reference anywhere in the package outranks activation-only use.
        activation.retain(|id| !referenced.contains(id));

        let mut paths: Vec<PathBuf> = files.iter().map(|(p, _)| p.clone()).collect();
        paths.sort();

        Self {
            identifier: location.identifier.clone(),
            name: name.to_string(),
            kind,
            dir: location.dir.clone(),
            vendored: location.vendored,
            files: paths,
            summaries: files,
            imports: referenced.into_iter().collect(),
            activation_imports: activation.into_iter().collect(),
        }
    }

    /// All direct dependencies: referenced then activation-only.
    pub fn dependencies(&self) -> impl Iterator<Item = &String> {
        self.imports.iter().chain(self.activation_imports.iter())
    }

    /// Exported declaration heads across all files, sorted.
    pub fn exported_decls(&self) -> Vec<String> {
        let mut decls: Vec<String> = self
            .summaries
            .iter()
            .flat_map(|(_, s)| s.exported_decls.iter().cloned())
            .collect();
        decls.sort();
        decls.dedup();
        decls
    }
}

/// The validated, acyclic package graph for one build invocation.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    packages: BTreeMap<String, Package>,
    roots: Vec<String>,
}

impl DependencyGraph {
    pub fn get(&self, identifier: &str) -> Option<&Package> {
        self.packages.get(identifier)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// The requested root identifiers, in request order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Topological order using Kahn's algorithm: dependencies before
    /// dependents, ties broken by identifier so the order is stable.
    pub fn topo_order(&self) -> ResolveResult<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .packages
            .values()
            .map(|p| (p.identifier.as_str(), p.dependencies().count()))
            .collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for pkg in self.packages.values() {
            for dep in pkg.dependencies() {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(pkg.identifier.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.packages.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(deps) = dependents.get(id) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if order.len() != self.packages.len() {
            return Err(ResolveError::CyclicDependency {
                path: self.find_cycle(),
            });
        }
        Ok(order)
    }

    /// Scheduling levels: every package in level N has all dependencies
    /// in levels < N. Packages within a level are independent and may
    /// compile concurrently.
    pub fn parallel_levels(&self) -> ResolveResult<Vec<Vec<String>>> {
        let mut levels = Vec::new();
        let mut done: HashSet<String> = HashSet::new();

        loop {
            let mut level: Vec<String> = self
                .packages
                .values()
                .filter(|p| !done.contains(&p.identifier))
                .filter(|p| p.dependencies().all(|d| done.contains(d)))
                .map(|p| p.identifier.clone())
                .collect();
            if level.is_empty() {
                break;
            }
            level.sort();
            done.extend(level.iter().cloned());
            levels.push(level);
        }

        if done.len() != self.packages.len() {
            return Err(ResolveError::CyclicDependency {
                path: self.find_cycle(),
            });
        }
        Ok(levels)
    }

    /// Transitive dependencies of `identifier` (excluding itself), in
    /// topological order. Used to assemble link inputs.
    pub fn transitive_deps(&self, identifier: &str) -> Vec<String> {
        let mut reachable = HashSet::new();
        let mut stack = vec![identifier];
        while let Some(id) = stack.pop() {
            if let Some(pkg) = self.packages.get(id) {
                for dep in pkg.dependencies() {
                    if reachable.insert(dep.as_str()) {
                        stack.push(dep);
                    }
                }
            }
        }
        match self.topo_order() {
            Ok(order) => order
                .into_iter()
                .filter(|id| reachable.contains(id.as_str()))
                .collect(),
            // Construction validated acyclicity; unreachable in practice.
            Err(_) => Vec::new(),
        }
    }

    /// Locate a cycle for diagnostics. The returned path starts and ends
    /// with the same identifier, e.g. `["a", "b", "a"]`.
    fn find_cycle(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        let mut path = Vec::new();
        for id in self.packages.keys() {
            if let Some(cycle) = self.dfs_cycle(id, &mut visited, &mut stack, &mut path) {
                return cycle;
            }
        }
        Vec::new()
    }

    fn dfs_cycle(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if stack.contains(id) {
            let start = path.iter().position(|p| p == id).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if visited.contains(id) {
            return None;
        }
        visited.insert(id.to_string());
        stack.insert(id.to_string());
        path.push(id.to_string());

        if let Some(pkg) = self.packages.get(id) {
            for dep in pkg.dependencies() {
                if let Some(cycle) = self.dfs_cycle(dep, visited, stack, path) {
                    return Some(cycle);
                }
            }
        }

        stack.remove(id);
        path.pop();
        None
    }
}

/// Computes the transitive closure for a set of root identifiers.
pub struct GraphBuilder {
    resolver: ImportResolver,
    fetcher: Option<(FetchResolver, FetchMode)>,
}

impl GraphBuilder {
    pub fn new(resolver: ImportResolver) -> Self {
        Self {
            resolver,
            fetcher: None,
        }
    }

    /// Enable remote fetching for identifiers absent from every root.
    pub fn with_fetcher(mut self, fetcher: FetchResolver, mode: FetchMode) -> Self {
        self.fetcher = Some((fetcher, mode));
        self
    }

    pub fn resolver(&self) -> &ImportResolver {
        &self.resolver
    }

    /// Build and validate the graph for the given roots.
    ///
    /// Resolution and graph errors abort before any compilation: the
    /// returned graph is complete, acyclic, and conflict-free.
    pub fn build(&self, roots: &[String]) -> ResolveResult<DependencyGraph> {
        let mut packages: BTreeMap<String, Package> = BTreeMap::new();
        let mut queue: VecDeque<(String, Option<PathBuf>)> = roots
            .iter()
            .map(|id| (id.clone(), None))
            .collect();

        while let Some((identifier, requested_from)) = queue.pop_front() {
            if packages.contains_key(&identifier) {
                continue;
            }
            let units = self.load(&identifier, requested_from.as_deref())?;
            let package = units.package;

            if package.dependencies().any(|d| *d == identifier) {
                return Err(ResolveError::SelfImport { identifier });
            }

            for dep in package.dependencies() {
                if !packages.contains_key(dep) {
                    queue.push_back((dep.clone(), Some(package.dir.clone())));
                }
            }
            packages.insert(identifier, package);
        }

        let graph = DependencyGraph {
            packages,
            roots: roots.to_vec(),
        };
        check_name_conflicts(&graph)?;
        graph.topo_order()?;
        Ok(graph)
    }

    fn load(
        &self,
        identifier: &str,
        requested_from: Option<&std::path::Path>,
    ) -> ResolveResult<crate::resolve::PackageUnits> {
        match self.resolver.resolve_and_load(identifier, requested_from) {
            Ok(units) => Ok(units),
            Err(ResolveError::UnresolvedImport { .. }) if self.fetcher.is_some() => {
                if let Some((fetcher, mode)) = &self.fetcher {
                    fetcher
                        .ensure(identifier, *mode)
                        .map_err(|source| ResolveError::Fetch {
                            identifier: identifier.to_string(),
                            source,
                        })?;
                }
                self.resolver.resolve_and_load(identifier, requested_from)
            }
            Err(err) => Err(err),
        }
    }
}

/// Per-file short-name conflict check.
///
/// Within one source file, every referenced import binds a name: its
/// alias if given, otherwise the imported package's declared name. Two
/// distinct identifiers binding the same name is a conflict; the alias
/// fixing it is scoped to that file alone.
fn check_name_conflicts(graph: &DependencyGraph) -> ResolveResult<()> {
    for pkg in graph.packages() {
        for (file, summary) in &pkg.summaries {
            let mut bound: HashMap<&str, &str> = HashMap::new();
            for import in &summary.imports {
                if import.activation_only {
                    continue;
                }
                let name = match &import.alias {
                    Some(alias) => alias.as_str(),
                    None => graph
                        .get(&import.identifier)
                        .map(|p| p.name.as_str())
                        .unwrap_or(&import.identifier),
                };
                if let Some(first) = bound.get(name) {
                    if *first != import.identifier.as_str() {
                        return Err(ResolveError::ImportNameConflict {
                            file: file.clone(),
                            name: name.to_string(),
                            first: first.to_string(),
                            second: import.identifier.clone(),
                        });
                    }
                } else {
                    bound.insert(name, &import.identifier);
                }
            }
        }
    }
    Ok(())
}
