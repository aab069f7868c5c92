//! List command - show resolved packages in dependency order

use anyhow::{Context, Result};
use keel_config::Env;
use keel_package::{DeclScanner, GraphBuilder, ImportResolver, PackageKind};
use std::sync::Arc;

/// Run the list command. Returns false when resolution failed.
pub fn run(identifiers: &[String]) -> Result<bool> {
    let env = Env::from_env().context("Failed to resolve environment")?;
    let resolver = ImportResolver::new(env.root_set(), Arc::new(DeclScanner::new()));
    let builder = GraphBuilder::new(resolver);

    let graph = match builder.build(identifiers) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("keel list: {e}");
            return Ok(false);
        }
    };

    for identifier in graph.topo_order().context("graph order")? {
        let pkg = graph.get(&identifier).context("package in order")?;
        let kind = match pkg.kind {
            PackageKind::Library => "library",
            PackageKind::Command => "command",
            PackageKind::InternalTest => "test",
            PackageKind::ExternalTest => "test",
        };
        let vendored = if pkg.vendored { " [vendored]" } else { "" };
        println!("{identifier} ({kind}){vendored}");
        println!("  dir:  {}", pkg.dir.display());
        let deps: Vec<&String> = pkg.dependencies().collect();
        if !deps.is_empty() {
            let rendered: Vec<&str> = deps.iter().map(|d| d.as_str()).collect();
            println!("  deps: {}", rendered.join(", "));
        }
    }
    Ok(true)
}
