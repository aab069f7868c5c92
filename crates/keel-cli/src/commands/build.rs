//! Build command - compile dependency closures with caching

use anyhow::{Context, Result};
use keel_build::{BuildCache, NodeOutcome, Orchestrator, RefToolchain};
use keel_config::Env;
use keel_package::{
    DeclScanner, FetchMode, FetchResolver, GraphBuilder, HttpFetcher, ImportResolver,
};
use std::sync::Arc;

/// Build command arguments
pub struct BuildArgs {
    /// Import identifiers to build
    pub identifiers: Vec<String>,
    /// Refetch remote dependencies
    pub update: bool,
    /// Number of parallel compile jobs
    pub jobs: Option<usize>,
    /// Per-package outcome output
    pub verbose: bool,
    /// JSON summary on stdout instead of the human report
    pub json: bool,
}

/// Run the build command. Returns false when any package failed or was
/// skipped.
pub fn run(args: BuildArgs) -> Result<bool> {
    let env = Env::from_env().context("Failed to resolve environment")?;
    let roots = env.root_set();

    let resolver = ImportResolver::new(roots.clone(), Arc::new(DeclScanner::new()));
    let mut builder = GraphBuilder::new(resolver);
    if let Some(primary) = roots.primary_workspace() {
        let mode = if args.update {
            FetchMode::Update
        } else {
            FetchMode::Reuse
        };
        builder = builder.with_fetcher(
            FetchResolver::new(Box::new(HttpFetcher::new()), primary.clone()),
            mode,
        );
    }

    let graph = match builder.build(&args.identifiers) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("keel build: {e}");
            return Ok(false);
        }
    };

    let cache = Arc::new(BuildCache::open(env.cache_dir()).context("Failed to open build cache")?);
    let mut orchestrator = Orchestrator::new(cache.clone(), Arc::new(RefToolchain::new()));
    if let Some(jobs) = args.jobs {
        orchestrator = orchestrator.with_jobs(jobs);
    }

    let report = orchestrator
        .build(&graph, &env.bin_dir())
        .context("Build failed")?;

    if args.json {
        let stats = &report.stats;
        let executables: serde_json::Map<String, serde_json::Value> = report
            .executables
            .iter()
            .map(|(id, path)| (id.clone(), path.display().to_string().into()))
            .collect();
        let failures: Vec<_> = report
            .failures()
            .map(|(id, message)| serde_json::json!({ "package": id, "message": message }))
            .collect();
        let skipped: Vec<_> = report
            .skipped()
            .map(|(id, cause)| serde_json::json!({ "package": id, "failed_dependency": cause }))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "success": report.succeeded(),
                "compiled": stats.fresh,
                "cached": stats.cached,
                "failed": stats.failed,
                "skipped": stats.skipped,
                "executables": executables,
                "failures": failures,
                "skipped_packages": skipped,
            })
        );
        return Ok(report.succeeded());
    }

    if args.verbose {
        for (identifier, outcome) in &report.outcomes {
            let label = match outcome {
                NodeOutcome::Fresh => "compiled",
                NodeOutcome::Cached => "cached",
                NodeOutcome::Failed { .. } => "FAILED",
                NodeOutcome::Skipped { .. } => "skipped",
            };
            println!("{label:>9}  {identifier}");
        }
        let stats = &report.stats;
        println!(
            "{} compiled, {} cached, {} failed, {} skipped",
            stats.fresh, stats.cached, stats.failed, stats.skipped
        );
    }

    for (identifier, path) in &report.executables {
        println!("{} -> {}", identifier, path.display());
    }

    // Root causes first, then everything skipped because of them.
    for (identifier, message) in report.failures() {
        eprintln!("{identifier}: {message}");
    }
    let skipped: Vec<_> = report.skipped().collect();
    if !skipped.is_empty() {
        eprintln!("skipped because a dependency failed:");
        for (identifier, cause) in skipped {
            eprintln!("  {identifier} (dependency '{cause}')");
        }
    }

    Ok(report.succeeded())
}
